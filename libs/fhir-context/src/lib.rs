//! FHIR Context for runtime conformance resource access
//!
//! Provides a trait-based interface for resolving canonical URLs to the
//! conformance and terminology resources a FHIRPath evaluation consults:
//! profiles for `conformsTo()`, value sets for `memberOf()`, code systems
//! and concept maps for the `%terminologies` functions.
//!
//! Absence is not an error: every lookup returns `Ok(None)` when the
//! canonical is unknown, and callers decide how to degrade.

pub mod context;
pub mod error;

pub use context::{FhirContext, InMemoryContext};
pub use error::{Error, Result};
