//! Shared value types used by the canonical resource models

use serde::{Deserialize, Serialize};
use std::fmt;

/// Publication status of a canonical resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    #[default]
    Draft,
    Active,
    Retired,
    Unknown,
}

/// Binding strength of a coded element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStrength {
    Required,
    Extensible,
    Preferred,
    Example,
}

impl BindingStrength {
    /// Parse the FHIR code of a binding strength.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "required" => Some(Self::Required),
            "extensible" => Some(Self::Extensible),
            "preferred" => Some(Self::Preferred),
            "example" => Some(Self::Example),
            _ => None,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Extensible => "extensible",
            Self::Preferred => "preferred",
            Self::Example => "example",
        }
    }

    /// Whether a code outside the bound value set is still acceptable.
    pub fn tolerates_other_codes(&self) -> bool {
        !matches!(self, Self::Required)
    }
}

impl fmt::Display for BindingStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Split a canonical reference of the form `url|version`.
///
/// ```rust
/// use ferrum_models::split_canonical;
///
/// assert_eq!(split_canonical("http://x/vs|1.0"), ("http://x/vs", Some("1.0")));
/// assert_eq!(split_canonical("http://x/vs"), ("http://x/vs", None));
/// ```
pub fn split_canonical(canonical: &str) -> (&str, Option<&str>) {
    match canonical.split_once('|') {
        Some((url, version)) if !version.is_empty() => (url, Some(version)),
        Some((url, _)) => (url, None),
        None => (canonical, None),
    }
}
