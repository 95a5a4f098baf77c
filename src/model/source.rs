use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of data collected in one run
///
/// Every duplicate check, document write and audit row is scoped by one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Patent,
    UtilityModel,
    Design,
    Trademark,
    News,
    Trend,
    Project,
    OrgInfo,
    ResearchPaper,
}

impl SourceType {
    /// Every known source type, in CLI order
    pub const ALL: [SourceType; 9] = [
        Self::Patent,
        Self::UtilityModel,
        Self::Design,
        Self::Trademark,
        Self::News,
        Self::Trend,
        Self::Project,
        Self::OrgInfo,
        Self::ResearchPaper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patent => "patent",
            Self::UtilityModel => "utility-model",
            Self::Design => "design",
            Self::Trademark => "trademark",
            Self::News => "news",
            Self::Trend => "trend",
            Self::Project => "project",
            Self::OrgInfo => "org-info",
            Self::ResearchPaper => "research-paper",
        }
    }

    /// Record field holding the natural key used for duplicate detection
    ///
    /// Sources without a stable key are never deduplicated; every run
    /// re-collects their full result set.
    pub fn natural_key_field(&self) -> Option<&'static str> {
        match self {
            Self::Patent | Self::UtilityModel | Self::Design | Self::Trademark => {
                Some("application_number")
            }
            Self::Project => Some("project_number"),
            Self::ResearchPaper => Some("publication_number"),
            Self::News | Self::Trend | Self::OrgInfo => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownSource(s.to_string()))
    }
}
