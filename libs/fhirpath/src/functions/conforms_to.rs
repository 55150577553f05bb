//! `conformsTo(profile)`: check a resource or element against a profile.
//!
//! The profile's invariants run first, then every value set binding stronger
//! than `example` is checked with `memberOf`.
//!
//! Results are cached on the context per (input, profile). The cache entry is
//! marked in progress before any constraint runs, so a constraint that calls
//! `conformsTo` on the same node and profile sees the mark and gets `true`
//! instead of recursing. Mutually recursive profiles are only approximated by
//! this.

use ferrum_models::{ConstraintSeverity, StructureDefinition};

use crate::collection::Collection;
use crate::constraint::focus_nodes;
use crate::context::{CachedResult, EvaluationContext};
use crate::error::{Error, Result};
use crate::issue::{Issue, IssueType};
use crate::node::Node;
use crate::types::{FhirPathType, TypeNamespace};

use super::member_of::MemberOf;
use super::{empty, string_arg, FhirPathFunction};

const NAME: &str = "conformsTo";

#[derive(Debug, Default, Clone, Copy)]
pub struct ConformsTo;

impl FhirPathFunction for ConformsTo {
    fn name(&self) -> &str {
        NAME
    }

    fn min_arity(&self) -> usize {
        1
    }

    fn max_arity(&self) -> usize {
        1
    }

    fn apply(&self, ctx: &mut EvaluationContext, input: &Collection, args: &[Collection]) -> Result<Collection> {
        let Some(node) = input.singleton_item(NAME)? else {
            return empty();
        };
        if !node.is_structural() {
            return Err(Error::InvalidArgument(format!(
                "{}: must be called on a resource or element, found {}",
                NAME,
                node.type_()
            )));
        }
        let Some(profile_url) = string_arg(&args[0], NAME)? else {
            return empty();
        };

        match ctx.cached_function_result(NAME, input, args) {
            Some(CachedResult::InProgress) => {
                tracing::debug!(profile = %profile_url, "conformsTo re-entered while in progress");
                return Ok(Collection::boolean(true));
            }
            Some(CachedResult::Done(result)) => {
                tracing::debug!(profile = %profile_url, "conformsTo answered from cache");
                return Ok(result);
            }
            None => {}
        }

        let profile = match ctx.fhir_context().get_structure_definition(&profile_url) {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                ctx.add_issue(
                    Issue::warning(
                        IssueType::NotSupported,
                        format!("Profile '{}' is not supported", profile_url),
                    )
                    .with_expression(node.path()),
                );
                return Ok(Collection::boolean(true));
            }
            Err(err) => {
                tracing::warn!(profile = %profile_url, error = %err, "profile lookup failed");
                ctx.add_issue(
                    Issue::warning(
                        IssueType::NotSupported,
                        format!("Profile '{}' could not be loaded: {}", profile_url, err),
                    )
                    .with_expression(node.path()),
                );
                return Ok(Collection::boolean(true));
            }
        };

        if !is_applicable(&profile, node) {
            ctx.add_issue(
                Issue::error(
                    IssueType::Structure,
                    format!(
                        "Profile '{}' constrains {} and cannot apply to {}",
                        profile_url,
                        profile.type_,
                        node.type_name()
                    ),
                )
                .with_expression(node.path()),
            );
            ctx.cache_function_result(NAME, input, args, Collection::boolean(false));
            return Ok(Collection::boolean(false));
        }

        ctx.mark_in_progress(NAME, input, args);
        let validator = ctx.constraint_validator();

        for (element, constraint) in profile.constraints() {
            let outcome = ctx.with_constraint(constraint.clone(), |ctx| {
                validator.validate(ctx, node, element, constraint)
            });
            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    let description = format!(
                        "Profile '{}' constraint '{}' failed: {}",
                        profile_url, constraint.key, constraint.human
                    );
                    match constraint.severity {
                        ConstraintSeverity::Error => {
                            ctx.add_issue(
                                Issue::error(IssueType::Invariant, description).with_expression(node.path()),
                            );
                            ctx.cache_function_result(NAME, input, args, Collection::boolean(false));
                            return Ok(Collection::boolean(false));
                        }
                        ConstraintSeverity::Warning => ctx.add_issue(
                            Issue::warning(IssueType::Invariant, description).with_expression(node.path()),
                        ),
                    }
                }
                Err(err) => {
                    ctx.evict_function_result(NAME, input, args);
                    return Err(err);
                }
            }
        }

        for (element, strength, value_set) in profile.value_set_bindings() {
            let binding = [
                Collection::singleton(Node::string(value_set)),
                Collection::singleton(Node::string(strength.as_code())),
            ];
            for focus in focus_nodes(node, element) {
                let member = MemberOf
                    .apply(ctx, &Collection::singleton(focus.clone()), &binding)
                    .and_then(|result| result.as_boolean());
                match member {
                    Ok(Some(false)) => {
                        ctx.add_issue(
                            Issue::error(
                                IssueType::CodeInvalid,
                                format!(
                                    "Profile '{}' binding on {} failed: value is not in ValueSet '{}' ({})",
                                    profile_url, element.path, value_set, strength
                                ),
                            )
                            .with_expression(focus.path()),
                        );
                        ctx.cache_function_result(NAME, input, args, Collection::boolean(false));
                        return Ok(Collection::boolean(false));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        ctx.evict_function_result(NAME, input, args);
                        return Err(err);
                    }
                }
            }
        }

        ctx.cache_function_result(NAME, input, args, Collection::boolean(true));
        Ok(Collection::boolean(true))
    }
}

/// Whether the profile's kind and type admit the node.
fn is_applicable(profile: &StructureDefinition, node: &Node) -> bool {
    if profile.is_resource() != node.is_resource() {
        return false;
    }
    match FhirPathType::from_namespace_name(TypeNamespace::Fhir, &profile.type_) {
        Some(type_) => type_.is_assignable_from(Some(node.type_())),
        None => node.type_name() == profile.type_,
    }
}
