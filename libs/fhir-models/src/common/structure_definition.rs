//! FHIR StructureDefinition model
//!
//! Version-agnostic model for profiles and base type definitions.

use super::complex::{BindingStrength, PublicationStatus};
use super::element_definition::{
    Differential, ElementDefinition, ElementDefinitionConstraint, Snapshot,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// FHIR StructureDefinition resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructureDefinition {
    /// Resource type - always "StructureDefinition"
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
    pub name: String,

    /// Publication status
    #[serde(default)]
    pub status: PublicationStatus,

    /// primitive-type | complex-type | resource | logical
    pub kind: StructureDefinitionKind,

    /// Whether the structure is abstract
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,

    /// Type defined or constrained by this structure
    #[serde(rename = "type")]
    pub type_: String,

    /// Definition that this type is constrained/specialized from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_definition: Option<String>,

    /// specialization | constraint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<TypeDerivationRule>,

    /// Snapshot view of the structure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,

    /// Differential view of the structure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub differential: Option<Differential>,

    /// Additional content
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_resource_type() -> String {
    "StructureDefinition".to_string()
}

/// Kind of structure being defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureDefinitionKind {
    PrimitiveType,
    ComplexType,
    Resource,
    Logical,
}

/// How a type relates to its base definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeDerivationRule {
    Specialization,
    Constraint,
}

impl StructureDefinition {
    /// Create a new StructureDefinition with minimal required fields
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        kind: StructureDefinitionKind,
        type_: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: "StructureDefinition".to_string(),
            id: None,
            url: url.into(),
            version: None,
            name: name.into(),
            status: PublicationStatus::Active,
            kind,
            is_abstract: false,
            type_: type_.into(),
            base_definition: None,
            derivation: None,
            snapshot: None,
            differential: None,
            extensions: HashMap::new(),
        }
    }

    pub fn with_snapshot(mut self, elements: Vec<ElementDefinition>) -> Self {
        self.snapshot = Some(Snapshot { element: elements });
        self
    }

    pub fn is_resource(&self) -> bool {
        self.kind == StructureDefinitionKind::Resource
    }

    pub fn is_profile(&self) -> bool {
        self.derivation == Some(TypeDerivationRule::Constraint)
    }

    /// Elements of the snapshot, falling back to the differential.
    pub fn elements(&self) -> &[ElementDefinition] {
        if let Some(snapshot) = &self.snapshot {
            return &snapshot.element;
        }
        self.differential
            .as_ref()
            .map(|d| d.element.as_slice())
            .unwrap_or(&[])
    }

    /// All invariants declared by this structure, paired with their element.
    pub fn constraints(
        &self,
    ) -> impl Iterator<Item = (&ElementDefinition, &ElementDefinitionConstraint)> {
        self.elements().iter().flat_map(|element| {
            element
                .constraint
                .iter()
                .flatten()
                .map(move |constraint| (element, constraint))
        })
    }

    /// Elements bound to a value set with a strength other than `example`.
    pub fn value_set_bindings(
        &self,
    ) -> impl Iterator<Item = (&ElementDefinition, BindingStrength, &str)> {
        self.elements().iter().filter_map(|element| {
            let binding = element.binding.as_ref()?;
            if binding.strength == BindingStrength::Example {
                return None;
            }
            Some((element, binding.strength, binding.value_set.as_deref()?))
        })
    }
}
