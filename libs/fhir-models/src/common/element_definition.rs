//! FHIR ElementDefinition model
//!
//! Only the parts of an ElementDefinition that carry runtime rules are kept:
//! the element path, its cardinality, invariants and terminology binding.
//! Everything else stays in the flattened `extensions` map.

use super::complex::BindingStrength;
use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// FHIR ElementDefinition - defines an element in a resource or data type structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinition {
    /// Unique id for inter-element referencing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Path of the element in the hierarchy (e.g., "Patient.name")
    pub path: String,

    /// Name for this particular element (in a slice)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice_name: Option<String>,

    /// Minimum cardinality
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,

    /// Maximum cardinality (can be "*")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,

    /// Condition that must evaluate to true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Vec<ElementDefinitionConstraint>>,

    /// ValueSet details if this is coded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<ElementDefinitionBinding>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

/// Invariant attached to an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionConstraint {
    /// Target of 'condition' reference
    pub key: String,

    /// Why this constraint is necessary or appropriate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,

    /// Severity (error | warning)
    pub severity: ConstraintSeverity,

    /// Human description of constraint
    pub human: String,

    /// FHIRPath expression of constraint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    /// Reference to original source of constraint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Severity of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintSeverity {
    Error,
    Warning,
}

/// ValueSet binding for a coded element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionBinding {
    /// Binding strength (required | extensible | preferred | example)
    pub strength: BindingStrength,

    /// Human explanation of the value set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Source of value set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,
}

/// Snapshot - a set of elements that define the structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Snapshot {
    pub element: Vec<ElementDefinition>,
}

/// Differential - a set of elements that define changes from the base
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Differential {
    pub element: Vec<ElementDefinition>,
}

impl Snapshot {
    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(Error::from)
    }
}

impl ElementDefinition {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: None,
            path: path.into(),
            slice_name: None,
            min: None,
            max: None,
            constraint: None,
            binding: None,
            extensions: HashMap::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: ElementDefinitionConstraint) -> Self {
        self.constraint.get_or_insert_with(Vec::new).push(constraint);
        self
    }

    pub fn with_binding(mut self, strength: BindingStrength, value_set: impl Into<String>) -> Self {
        self.binding = Some(ElementDefinitionBinding {
            strength,
            description: None,
            value_set: Some(value_set.into()),
        });
        self
    }

    /// Path segments below the root type (`Patient.name.given` -> `["name", "given"]`).
    pub fn relative_path(&self) -> Vec<&str> {
        self.path.split('.').skip(1).collect()
    }

    /// Whether this element is the root of its structure (no '.')
    pub fn is_root(&self) -> bool {
        !self.path.contains('.')
    }
}

impl ElementDefinitionConstraint {
    pub fn new(
        key: impl Into<String>,
        severity: ConstraintSeverity,
        human: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            requirements: None,
            severity,
            human: human.into(),
            expression: Some(expression.into()),
            source: None,
        }
    }
}
