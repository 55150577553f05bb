//! FHIRPath evaluation core
//!
//! This crate evaluates FHIRPath expression trees over FHIR data:
//!
//! 1. **Types**: the `FHIR` and `System` type lattice with assignability
//! 2. **Nodes**: an immutable tree of resource, element and System value nodes
//!    built from a host's objects (or from JSON)
//! 3. **Context**: per-evaluation state (issues, constants, function cache)
//!    and the collaborators: canonical lookup, terminology, reference
//!    resolution and constraint validation
//! 4. **Functions**: a registry of named functions with declared arities
//! 5. **Evaluator**: walks an [`ast::Expr`] and dispatches calls
//!
//! ```text
//! host object / JSON -> FhirPathTree -> Node
//!                                        |
//!            Expr + EvaluationContext -> Evaluator -> Collection + Issues
//!                                        |
//!                                 FunctionRegistry -> TermService, FhirContext,
//!                                                     ReferenceResolver
//! ```
//!
//! There is no expression parser here; hosts build [`ast::Expr`] trees.

pub mod ast;
pub mod code_syntax;
pub mod collection;
pub mod constraint;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod issue;
pub mod model;
pub mod node;
pub mod resolver;
mod temporal_parse;
pub mod term;
pub mod tree;
pub mod types;
pub mod value;

// Re-export main types
pub use collection::Collection;
pub use constraint::{ConstraintValidator, ExpressionConstraintValidator};
pub use context::{CachedResult, EvalOptions, EvaluationContext};
pub use error::{Error, Result};
pub use evaluator::{EvaluationListener, Evaluator};
pub use functions::{BuiltinFunction, FhirPathFunction, FunctionRegistry};
pub use issue::{Issue, IssueSeverity, IssueType};
pub use model::{FhirObject, Object, ObjectRef};
pub use node::{Node, NodeBuilder, TypeInfo, TypeInfoElement};
pub use resolver::{InMemoryResolver, NoopResolver, ReferenceResolver};
pub use term::{InMemoryTermService, NoopTermService, TermService, TermServiceError};
pub use tree::FhirPathTree;
pub use types::{FhirPathType, TypeNamespace};
pub use value::{QuantityValue, SystemValue};
