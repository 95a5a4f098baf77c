use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque source-defined payload produced by extraction
///
/// The harvester never inspects record contents; it only stores them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = Value;

    /// Only JSON objects become records; anything else is handed back
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

/// One entry of a result page, before its full record is extracted
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Natural key read from the listing, used for duplicate detection
    pub natural_key: Option<String>,

    /// Whatever the listing carried for this entry
    pub payload: Value,
}

impl Candidate {
    pub fn new(natural_key: Option<String>, payload: Value) -> Self {
        Self {
            natural_key,
            payload,
        }
    }
}
