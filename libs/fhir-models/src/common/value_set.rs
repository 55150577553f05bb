//! FHIR ValueSet model
//!
//! Version-agnostic model for ValueSets (terminology)

use super::complex::PublicationStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// FHIR ValueSet resource
///
/// A set of codes drawn from one or more code systems.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValueSet {
    /// Resource type - always "ValueSet"
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    /// Logical id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Canonical identifier
    pub url: String,

    /// Business version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Name (computer friendly)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Publication status
    #[serde(default)]
    pub status: PublicationStatus,

    /// Content logical definition (the "intension")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose: Option<ValueSetCompose>,

    /// Used when the value set is "expanded"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ValueSetExpansion>,

    /// Additional content
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_resource_type() -> String {
    "ValueSet".to_string()
}

/// Content logical definition of the value set (intension)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetCompose {
    /// Whether inactive codes are in the value set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactive: Option<bool>,

    /// Include one or more codes from a code system or other value set
    pub include: Vec<ValueSetInclude>,

    /// Explicitly exclude codes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<ValueSetInclude>>,
}

/// Include codes from a code system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetInclude {
    /// The system the codes come from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Specific version of the code system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Specific codes from the system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<Vec<ValueSetConcept>>,

    /// Select codes/concepts by their properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<ValueSetFilter>>,

    /// Select only contents included in specified value set(s)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set: Option<Vec<String>>,
}

/// A concept defined in the system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValueSetConcept {
    /// Code from the system
    pub code: String,

    /// Text to display for this code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Select codes by property
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValueSetFilter {
    /// Property name
    pub property: String,

    /// Filter operator (= | is-a | descendent-of | is-not-a | regex | in | not-in | generalizes | exists)
    pub op: String,

    /// Value of the filter
    pub value: String,
}

/// Expansion of the value set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetExpansion {
    /// Uniquely identifies this expansion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Time valueset expansion was generated
    #[serde(default)]
    pub timestamp: String,

    /// Total number of codes in the expansion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i32>,

    /// Codes in the value set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<Vec<ValueSetExpansionContains>>,
}

/// Codes in an expansion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetExpansionContains {
    /// System value for the code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// If user cannot select this entry
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub is_abstract: Option<bool>,

    /// If concept is inactive in the code system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactive: Option<bool>,

    /// Version in which this code/display is defined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Code - if blank, this is not a selectable code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// User display for the concept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// Codes contained under this entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<Vec<ValueSetExpansionContains>>,
}

impl ValueSet {
    /// Create a new ValueSet with minimal required fields
    pub fn new(url: impl Into<String>, status: PublicationStatus) -> Self {
        Self {
            resource_type: "ValueSet".to_string(),
            id: None,
            url: url.into(),
            version: None,
            name: None,
            status,
            compose: None,
            expansion: None,
            extensions: HashMap::new(),
        }
    }

    pub fn with_include(mut self, include: ValueSetInclude) -> Self {
        self.compose
            .get_or_insert_with(ValueSetCompose::default)
            .include
            .push(include);
        self
    }

    pub fn is_expanded(&self) -> bool {
        self.expansion
            .as_ref()
            .is_some_and(|e| e.contains.is_some())
    }

    /// If the compose is a single, unfiltered include of a whole code system,
    /// return that system and its optional version.
    pub fn single_system_include(&self) -> Option<(&str, Option<&str>)> {
        let compose = self.compose.as_ref()?;
        if compose.exclude.as_ref().is_some_and(|e| !e.is_empty()) {
            return None;
        }
        let [include] = compose.include.as_slice() else {
            return None;
        };
        if include.concept.is_some() || include.filter.is_some() || include.value_set.is_some() {
            return None;
        }
        Some((include.system.as_deref()?, include.version.as_deref()))
    }

    /// Flattened expansion entries, nested `contains` included.
    pub fn expansion_codes(&self) -> Vec<&ValueSetExpansionContains> {
        fn walk<'a>(
            entries: &'a [ValueSetExpansionContains],
            out: &mut Vec<&'a ValueSetExpansionContains>,
        ) {
            for entry in entries {
                out.push(entry);
                if let Some(children) = &entry.contains {
                    walk(children, out);
                }
            }
        }

        let mut out = Vec::new();
        if let Some(contains) = self.expansion.as_ref().and_then(|e| e.contains.as_ref()) {
            walk(contains, &mut out);
        }
        out
    }
}

impl ValueSetInclude {
    pub fn system(system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_concepts<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.concept = Some(
            codes
                .into_iter()
                .map(|code| ValueSetConcept {
                    code: code.into(),
                    display: None,
                })
                .collect(),
        );
        self
    }
}
