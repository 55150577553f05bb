//! `memberOf(valueSet [, strength])`

use ferrum_models::{BindingStrength, ValueSet};

use crate::code_syntax::SyntaxValueSet;
use crate::collection::Collection;
use crate::context::EvaluationContext;
use crate::error::{Error, Result};
use crate::issue::{Issue, IssueType};
use crate::node::Node;
use crate::term::{CodedValue, Coding, TermParams, TermResult, ValidationOutcome};
use crate::types::FhirPathType;

use super::terminology::coded_value;
use super::{empty, string_arg, FhirPathFunction};

const NAME: &str = "memberOf";
const DATA_ABSENT_REASON: &str = "http://hl7.org/fhir/StructureDefinition/data-absent-reason";

/// Whether a coded value belongs to a value set.
///
/// A value set whose compose includes a single whole code system is checked
/// against that code system directly. A failed check under an `extensible`
/// or `preferred` binding is reported as an INFORMATION issue and answers
/// `true`. The `all-languages` and `ucum-units` value sets are decided by
/// code syntax. An element holding nothing but a data-absent-reason
/// extension is a member whenever a binding strength is given.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemberOf;

impl FhirPathFunction for MemberOf {
    fn name(&self) -> &str {
        NAME
    }

    fn min_arity(&self) -> usize {
        1
    }

    fn max_arity(&self) -> usize {
        2
    }

    fn apply(&self, ctx: &mut EvaluationContext, input: &Collection, args: &[Collection]) -> Result<Collection> {
        let Some(node) = input.singleton_item(NAME)? else {
            return empty();
        };
        let Some(url) = string_arg(&args[0], NAME)? else {
            return empty();
        };
        let strength = match args.get(1).map(|arg| string_arg(arg, NAME)).transpose()?.flatten() {
            Some(code) => Some(BindingStrength::from_code(&code).ok_or_else(|| {
                Error::InvalidArgument(format!("{}: unknown binding strength '{}'", NAME, code))
            })?),
            None => None,
        };
        if has_only_data_absent_reason(node) {
            return Ok(Collection::boolean(strength.is_some()));
        }
        let Some(coded) = coded_value(node) else {
            return empty();
        };

        let outcome = match SyntaxValueSet::from_url(&url) {
            Some(syntax) => syntax.validate(&coded),
            None => {
                let value_set = match ctx.fhir_context().get_value_set(&url) {
                    Ok(Some(value_set)) => value_set,
                    Ok(None) => {
                        ctx.add_issue(
                            Issue::warning(IssueType::NotSupported, format!("ValueSet '{}' is not supported", url))
                                .with_expression(node.path()),
                        );
                        return Ok(Collection::boolean(true));
                    }
                    Err(err) => {
                        tracing::warn!(value_set = %url, error = %err, "value set lookup failed");
                        ctx.add_issue(
                            Issue::warning(
                                IssueType::NotSupported,
                                format!("ValueSet '{}' could not be loaded: {}", url, err),
                            )
                            .with_expression(node.path()),
                        );
                        return Ok(Collection::boolean(true));
                    }
                };
                match validate(ctx, &value_set, &coded) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        tracing::warn!(value_set = %url, error = %err, "terminology call failed");
                        ctx.add_issue(
                            Issue::warning(
                                IssueType::NotSupported,
                                format!("Membership in ValueSet '{}' could not be checked: {}", url, err),
                            )
                            .with_expression(node.path()),
                        );
                        return empty();
                    }
                }
            }
        };

        if outcome.result {
            return Ok(Collection::boolean(true));
        }
        match strength {
            Some(strength) if strength.tolerates_other_codes() => {
                let reason = outcome
                    .message
                    .unwrap_or_else(|| format!("Code is not a member of ValueSet '{}'", url));
                ctx.add_issue(
                    Issue::information(
                        IssueType::CodeInvalid,
                        format!("{} (binding strength '{}')", reason, strength.as_code()),
                    )
                    .with_expression(node.path()),
                );
                Ok(Collection::boolean(true))
            }
            _ => Ok(Collection::boolean(false)),
        }
    }
}

fn validate(ctx: &EvaluationContext, value_set: &ValueSet, coded: &CodedValue) -> TermResult<ValidationOutcome> {
    let service = ctx.term_service();
    let params = TermParams::default();
    if let Some((system, version)) = value_set.single_system_include() {
        let canonical = match version {
            Some(version) => format!("{}|{}", system, version),
            None => system.to_string(),
        };
        if let Ok(Some(code_system)) = ctx.fhir_context().get_code_system(&canonical) {
            tracing::trace!(value_set = %value_set.url, code_system = %canonical, "memberOf via code system");
            return service.validate_code_cs(&code_system, &with_system(coded, system), &params);
        }
    }
    service.validate_code_vs(value_set, coded, &params)
}

/// A primitive without a value, a Coding or Quantity without system and code,
/// or a CodeableConcept with such a coding, that carries a data-absent-reason
/// extension.
fn has_only_data_absent_reason(node: &Node) -> bool {
    let type_ = node.type_();
    if type_ == FhirPathType::CodeableConcept {
        return node.children_named("coding").any(has_only_data_absent_reason);
    }
    let absent = node
        .children_named("extension")
        .any(|e| e.child_string("url").as_deref() == Some(DATA_ABSENT_REASON));
    if !absent {
        return false;
    }
    if type_ == FhirPathType::Coding || type_.is_quantity_type() {
        return node.child("system").is_none() && node.child("code").is_none();
    }
    type_.is_primitive_type() && !node.has_value()
}

/// A bare code checked against a single code system belongs to that system.
fn with_system(coded: &CodedValue, system: &str) -> CodedValue {
    match coded {
        CodedValue::Code(code) => CodedValue::Coding(Coding {
            system: Some(system.to_string()),
            code: code.clone(),
            ..Default::default()
        }),
        other => other.clone(),
    }
}
