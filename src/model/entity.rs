use once_cell::sync::Lazy;
use regex::Regex;

static PARENTHESISED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(.*?\)").expect("parenthesis regex is hardcoded and valid"));

static AND_OTHERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"외\s*\d+명").expect("and-others regex is hardcoded and valid"));

/// A target organization collected for in a run
///
/// Entities are owned by the external entity source; the harvester only reads
/// them and marks them as checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// External identifier (e.g. business registration number)
    pub id: String,

    /// Registered name, possibly with parenthesised qualifiers
    pub display_name: String,

    /// Principal's name, if known
    pub secondary_name: Option<String>,
}

impl Entity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            secondary_name: None,
        }
    }

    pub fn with_secondary_name(mut self, name: impl Into<String>) -> Self {
        self.secondary_name = Some(name.into());
        self
    }

    /// Display name without parenthesised qualifiers such as "(주)" or "(Holdings)"
    pub fn clean_name(&self) -> String {
        PARENTHESISED.replace_all(&self.display_name, "").trim().to_string()
    }

    /// Secondary name without the trailing "외 N명" (and N others) marker
    pub fn clean_secondary_name(&self) -> Option<String> {
        self.secondary_name
            .as_deref()
            .map(|name| AND_OTHERS.replace_all(name, "").trim().to_string())
            .filter(|name| !name.is_empty())
    }
}
