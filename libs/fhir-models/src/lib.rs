//! FHIR conformance and terminology models
//!
//! Strongly-typed Rust structures for the canonical resources a FHIRPath
//! evaluator consults at runtime: profiles (`StructureDefinition`), value sets,
//! code systems and concept maps.
//!
//! # Module Organization
//!
//! - `common`: Version-agnostic models that work across FHIR R4, R4B, and R5
//!
//! Only the fields the evaluator reads are modelled; everything else is kept in
//! the flattened `extensions` map so a round trip through JSON is lossless.
//!
//! # Example
//!
//! ```rust
//! use ferrum_models::common::{StructureDefinition, StructureDefinitionKind};
//! use serde_json::json;
//!
//! let sd_json = json!({
//!     "resourceType": "StructureDefinition",
//!     "url": "http://example.org/fhir/StructureDefinition/my-patient",
//!     "name": "MyPatient",
//!     "status": "active",
//!     "kind": "resource",
//!     "type": "Patient",
//!     "snapshot": {
//!         "element": [{
//!             "path": "Patient",
//!             "constraint": [{
//!                 "key": "my-1",
//!                 "severity": "error",
//!                 "human": "Must have a name",
//!                 "expression": "name.exists()"
//!             }]
//!         }]
//!     }
//! });
//!
//! let sd: StructureDefinition = serde_json::from_value(sd_json).unwrap();
//! assert_eq!(sd.kind, StructureDefinitionKind::Resource);
//! assert_eq!(sd.constraints().count(), 1);
//! ```

pub mod common;

// Re-export commonly used types
pub use common::*;
