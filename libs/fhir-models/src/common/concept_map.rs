//! FHIR ConceptMap model
//!
//! Version-agnostic model for concept maps, covering both the R4
//! `equivalence` and the R5 `relationship` vocabularies.

use super::complex::PublicationStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// FHIR ConceptMap resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMap {
    /// Resource type - always "ConceptMap"
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

    /// Publication status
    #[serde(default)]
    pub status: PublicationStatus,

    /// Mappings grouped by source and target system
    #[serde(default)]
    pub group: Vec<ConceptMapGroup>,

    /// Additional content
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_resource_type() -> String {
    "ConceptMap".to_string()
}

/// Same source and target systems
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMapGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default)]
    pub element: Vec<ConceptMapElement>,
}

/// Mappings for a concept from the source set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConceptMapElement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    #[serde(default)]
    pub target: Vec<ConceptMapTarget>,
}

/// Concept in target system for element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConceptMapTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// R4 equivalence code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equivalence: Option<String>,

    /// R5 relationship code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
}

/// One match produced by translating a code
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptMapMatch<'a> {
    pub system: Option<&'a str>,
    pub target: &'a ConceptMapTarget,
}

impl ConceptMap {
    pub fn new(url: impl Into<String>, status: PublicationStatus) -> Self {
        Self {
            resource_type: "ConceptMap".to_string(),
            id: None,
            url: url.into(),
            version: None,
            status,
            group: Vec::new(),
            extensions: HashMap::new(),
        }
    }

    pub fn with_group(mut self, group: ConceptMapGroup) -> Self {
        self.group.push(group);
        self
    }

    /// All targets mapped from `code`, optionally restricted to a source system.
    pub fn translate(&self, system: Option<&str>, code: &str) -> Vec<ConceptMapMatch<'_>> {
        self.group
            .iter()
            .filter(|g| match (system, g.source.as_deref()) {
                (Some(wanted), Some(source)) => wanted == source,
                _ => true,
            })
            .flat_map(|g| {
                g.element
                    .iter()
                    .filter(move |e| e.code.as_deref() == Some(code))
                    .flat_map(move |e| {
                        e.target.iter().map(move |target| ConceptMapMatch {
                            system: g.target.as_deref(),
                            target,
                        })
                    })
            })
            .collect()
    }
}

impl ConceptMapTarget {
    /// The relationship code, whichever FHIR version supplied it.
    pub fn relationship_code(&self) -> &str {
        self.relationship
            .as_deref()
            .or(self.equivalence.as_deref())
            .unwrap_or("equivalent")
    }

    /// Whether this target denotes an actual mapping rather than a negative one.
    pub fn is_positive(&self) -> bool {
        !matches!(
            self.relationship_code(),
            "unmatched" | "disjoint" | "not-related-to"
        )
    }
}
