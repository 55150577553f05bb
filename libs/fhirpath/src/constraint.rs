//! Profile constraint evaluation for `conformsTo()`
//!
//! Constraint expressions arrive as FHIRPath text, and parsing is a host
//! concern. A [`ConstraintValidator`] decides whether a node satisfies one
//! constraint. [`ExpressionConstraintValidator`] evaluates pre-built
//! expression trees registered by constraint key against the nodes the
//! constraint's element path selects.

use std::collections::HashMap;

use ferrum_models::{ElementDefinition, ElementDefinitionConstraint};

use crate::ast::Expr;
use crate::collection::Collection;
use crate::context::EvaluationContext;
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::node::Node;
use crate::types::{FhirPathType, TypeNamespace};

pub trait ConstraintValidator: Send + Sync {
    /// Whether `node` satisfies `constraint`, declared on `element` of the
    /// profile being checked. `node` is the node `conformsTo()` was called on.
    fn validate(
        &self,
        ctx: &mut EvaluationContext,
        node: &Node,
        element: &ElementDefinition,
        constraint: &ElementDefinitionConstraint,
    ) -> Result<bool>;
}

/// Evaluates registered expressions by constraint key.
///
/// Constraints without a registered expression are treated as satisfied. A
/// constraint holds when its expression yields `true` or nothing for every
/// focus node.
#[derive(Debug, Clone, Default)]
pub struct ExpressionConstraintValidator {
    evaluator: Evaluator,
    expressions: HashMap<String, Expr>,
}

impl ExpressionConstraintValidator {
    pub fn new(evaluator: Evaluator) -> Self {
        Self {
            evaluator,
            expressions: HashMap::new(),
        }
    }

    pub fn with_expression(mut self, key: &str, expr: Expr) -> Self {
        self.expressions.insert(key.to_string(), expr);
        self
    }
}

impl ConstraintValidator for ExpressionConstraintValidator {
    fn validate(
        &self,
        ctx: &mut EvaluationContext,
        node: &Node,
        element: &ElementDefinition,
        constraint: &ElementDefinitionConstraint,
    ) -> Result<bool> {
        let Some(expr) = self.expressions.get(&constraint.key) else {
            tracing::debug!(key = %constraint.key, "no expression registered for constraint");
            return Ok(true);
        };

        for focus in focus_nodes(node, element) {
            let result = self
                .evaluator
                .evaluate(ctx, expr, &Collection::singleton(focus))?;
            if result.as_boolean()? == Some(false) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Nodes under `node` at the element's path. Choice elements (`value[x]`)
/// match any typed suffix.
pub fn focus_nodes(node: &Node, element: &ElementDefinition) -> Vec<Node> {
    let mut focus = vec![node.clone()];
    for step in element.relative_path() {
        focus = focus
            .iter()
            .flat_map(|n| {
                n.children()
                    .iter()
                    .filter(|child| step_matches(step, child.name().unwrap_or_default()))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
    }
    focus
}

fn step_matches(step: &str, name: &str) -> bool {
    match step.strip_suffix("[x]") {
        Some(prefix) => name
            .strip_prefix(prefix)
            .is_some_and(is_choice_type_suffix),
        None => step == name,
    }
}

/// `Quantity`, `String`, `DateTime`, ... as used in choice element names.
pub(crate) fn is_choice_type_suffix(suffix: &str) -> bool {
    if !suffix.starts_with(|c: char| c.is_ascii_uppercase()) {
        return false;
    }
    if FhirPathType::from_namespace_name(TypeNamespace::Fhir, suffix).is_some() {
        return true;
    }
    let mut chars = suffix.chars();
    let lowered: String = chars
        .next()
        .map(|c| c.to_ascii_lowercase())
        .into_iter()
        .chain(chars)
        .collect();
    FhirPathType::from_namespace_name(TypeNamespace::Fhir, &lowered)
        .is_some_and(FhirPathType::is_primitive_type)
}
