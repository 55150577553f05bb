//! FHIR CodeSystem model
//!
//! Version-agnostic model for CodeSystems (terminology)

use super::complex::PublicationStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// FHIR CodeSystem resource
///
/// Declares the existence of and describes a code system or code system supplement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeSystem {
    /// Resource type - always "CodeSystem"
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

    /// If code comparison is case sensitive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,

    /// Canonical reference to the value set with all codes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,

    /// Hierarchy meaning (grouped-by | is-a | part-of | classified-with)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy_meaning: Option<String>,

    /// Content type (not-present | example | fragment | complete | supplement)
    #[serde(default = "default_content")]
    pub content: CodeSystemContentMode,

    /// Concepts in the code system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<Vec<CodeSystemConcept>>,

    /// Additional content
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_resource_type() -> String {
    "CodeSystem".to_string()
}

fn default_content() -> CodeSystemContentMode {
    CodeSystemContentMode::Complete
}

/// Content mode for a code system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodeSystemContentMode {
    NotPresent,
    Example,
    Fragment,
    Complete,
    Supplement,
}

/// Concept in the code system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSystemConcept {
    /// Code that identifies the concept
    pub code: String,

    /// Text to display to the user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// Formal definition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    /// Property values for the concept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<Vec<CodeSystemConceptProperty>>,

    /// Child concepts (nested hierarchy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<Vec<CodeSystemConcept>>,
}

/// Property value for a concept
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSystemConceptProperty {
    /// Reference to property definition
    pub code: String,

    /// Value of the property
    #[serde(flatten)]
    pub value: Value,
}

impl CodeSystem {
    /// Create a new CodeSystem with minimal required fields
    pub fn new(
        url: impl Into<String>,
        status: PublicationStatus,
        content: CodeSystemContentMode,
    ) -> Self {
        Self {
            resource_type: "CodeSystem".to_string(),
            id: None,
            url: url.into(),
            version: None,
            name: None,
            status,
            case_sensitive: None,
            value_set: None,
            hierarchy_meaning: None,
            content,
            concept: None,
            extensions: HashMap::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_concepts(mut self, concepts: Vec<CodeSystemConcept>) -> Self {
        self.concept = Some(concepts);
        self
    }

    fn codes_match(&self, left: &str, right: &str) -> bool {
        if self.case_sensitive.unwrap_or(true) {
            left == right
        } else {
            left.eq_ignore_ascii_case(right)
        }
    }

    /// Find a concept anywhere in the hierarchy.
    pub fn find_concept(&self, code: &str) -> Option<&CodeSystemConcept> {
        self.ancestry(code).and_then(|path| path.last().copied())
    }

    /// Chain of concepts from a top-level concept down to `code`.
    pub fn ancestry(&self, code: &str) -> Option<Vec<&CodeSystemConcept>> {
        fn walk<'a>(
            cs: &CodeSystem,
            concepts: &'a [CodeSystemConcept],
            code: &str,
            path: &mut Vec<&'a CodeSystemConcept>,
        ) -> bool {
            for concept in concepts {
                path.push(concept);
                if cs.codes_match(&concept.code, code) {
                    return true;
                }
                if let Some(children) = &concept.concept {
                    if walk(cs, children, code, path) {
                        return true;
                    }
                }
                path.pop();
            }
            false
        }

        let mut path = Vec::new();
        let concepts = self.concept.as_deref().unwrap_or(&[]);
        walk(self, concepts, code, &mut path).then_some(path)
    }

    /// Whether `ancestor` subsumes `descendant` (reflexive).
    pub fn subsumes(&self, ancestor: &str, descendant: &str) -> Option<bool> {
        let path = self.ancestry(descendant)?;
        self.find_concept(ancestor)?;
        Some(path.iter().any(|c| self.codes_match(&c.code, ancestor)))
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive.unwrap_or(true)
    }
}

impl CodeSystemConcept {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display: None,
            definition: None,
            property: None,
            concept: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn with_children(mut self, children: Vec<CodeSystemConcept>) -> Self {
        self.concept = Some(children);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> CodeSystem {
        CodeSystem::new(
            "http://x/cs",
            PublicationStatus::Active,
            CodeSystemContentMode::Complete,
        )
        .with_concepts(vec![CodeSystemConcept::new("animal").with_children(vec![
            CodeSystemConcept::new("dog").with_display("Dog"),
            CodeSystemConcept::new("cat"),
        ])])
    }

    #[test]
    fn test_find_nested_concept() {
        let cs = hierarchy();
        assert_eq!(
            cs.find_concept("dog").and_then(|c| c.display.as_deref()),
            Some("Dog")
        );
        assert!(cs.find_concept("fish").is_none());
    }

    #[test]
    fn test_subsumption() {
        let cs = hierarchy();
        assert_eq!(cs.subsumes("animal", "dog"), Some(true));
        assert_eq!(cs.subsumes("dog", "animal"), Some(false));
        assert_eq!(cs.subsumes("dog", "dog"), Some(true));
        assert_eq!(cs.subsumes("dog", "cat"), Some(false));
        assert_eq!(cs.subsumes("fish", "cat"), None);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut cs = hierarchy();
        cs.case_sensitive = Some(false);
        assert!(cs.find_concept("DOG").is_some());
    }
}
