//! Terminology functions on `%terminologies`
//!
//! `%terminologies.expand(vs)`, `lookup(coding)`, `validateVS(vs, coded)`,
//! `validateCS(cs, coded)`, `subsumes(a, b)`, `subsumedBy(a, b)` and
//! `translate(cm, coded)`, each with an optional trailing parameter string
//! (`count=10&displayLanguage=en`). `subsumes` and `subsumedBy` also work
//! directly on a coded input: `coding.subsumes(other)`.
//!
//! Terminology resources are passed as a canonical URL string or as a
//! resource node carrying a `url`. Arguments of the wrong shape produce an
//! empty result. Service failures become WARNING issues.

use std::sync::Arc;

use ferrum_models::{CodeSystem, ConceptMap, ValueSet};
use serde_json::Value;

use crate::collection::Collection;
use crate::context::EvaluationContext;
use crate::error::Result;
use crate::issue::{Issue, IssueType};
use crate::model::Object;
use crate::node::Node;
use crate::term::{Coding, CodedValue, SubsumptionOutcome, TermParams, TermServiceError};
use crate::tree::FhirPathTree;
use crate::types::FhirPathType;

use super::{boolean, empty, single};

pub fn expand(ctx: &mut EvaluationContext, input: &Collection, args: &[Collection]) -> Result<Collection> {
    if !on_term_service(input) {
        return empty();
    }
    let Some(value_set) = value_set_arg(ctx, &args[0])? else {
        return empty();
    };
    let params = params_arg(args.get(1));
    let service = ctx.term_service();
    match service.expand(&value_set, &params) {
        Ok(expanded) => match serde_json::to_value(&expanded) {
            Ok(json) => resource_result(&json),
            Err(err) => {
                tracing::warn!(value_set = %value_set.url, error = %err, "expansion could not be serialized");
                empty()
            }
        },
        Err(err) => term_failure(ctx, "expand", err),
    }
}

pub fn lookup(ctx: &mut EvaluationContext, input: &Collection, args: &[Collection]) -> Result<Collection> {
    if !on_term_service(input) {
        return empty();
    }
    let Some(CodedValue::Coding(coding)) = coded_arg(&args[0]) else {
        return empty();
    };
    let params = params_arg(args.get(1));
    match ctx.term_service().lookup(&coding, &params) {
        Ok(Some(outcome)) => resource_result(&outcome.to_parameters()),
        Ok(None) => empty(),
        Err(err) => term_failure(ctx, "lookup", err),
    }
}

pub fn validate_vs(ctx: &mut EvaluationContext, input: &Collection, args: &[Collection]) -> Result<Collection> {
    if !on_term_service(input) {
        return empty();
    }
    let Some(value_set) = value_set_arg(ctx, &args[0])? else {
        return empty();
    };
    let Some(coded) = coded_arg(&args[1]) else {
        return empty();
    };
    let params = params_arg(args.get(2));
    match ctx.term_service().validate_code_vs(&value_set, &coded, &params) {
        Ok(outcome) => resource_result(&outcome.to_parameters()),
        Err(err) => term_failure(ctx, "validateVS", err),
    }
}

pub fn validate_cs(ctx: &mut EvaluationContext, input: &Collection, args: &[Collection]) -> Result<Collection> {
    if !on_term_service(input) {
        return empty();
    }
    let Some(code_system) = code_system_arg(ctx, &args[0])? else {
        return empty();
    };
    let Some(coded) = coded_arg(&args[1]) else {
        return empty();
    };
    let params = params_arg(args.get(2));
    match ctx.term_service().validate_code_cs(&code_system, &coded, &params) {
        Ok(outcome) => resource_result(&outcome.to_parameters()),
        Err(err) => term_failure(ctx, "validateCS", err),
    }
}

pub fn subsumes(ctx: &mut EvaluationContext, input: &Collection, args: &[Collection]) -> Result<Collection> {
    subsumption(ctx, input, args, "subsumes", false)
}

pub fn subsumed_by(ctx: &mut EvaluationContext, input: &Collection, args: &[Collection]) -> Result<Collection> {
    subsumption(ctx, input, args, "subsumedBy", true)
}

/// `%terminologies.subsumes(a, b)` answers with the outcome code;
/// `a.subsumes(b)` answers with a boolean. `subsumedBy` asks the service
/// with the codings swapped.
fn subsumption(
    ctx: &mut EvaluationContext,
    input: &Collection,
    args: &[Collection],
    name: &str,
    reversed: bool,
) -> Result<Collection> {
    let bare = !on_term_service(input);
    let (a, b) = if bare {
        if args.len() != 1 {
            return empty();
        }
        (coding_of(input), coding_of(&args[0]))
    } else {
        if args.len() < 2 {
            return empty();
        }
        (coding_of(&args[0]), coding_of(&args[1]))
    };
    let (Some(a), Some(b)) = (a, b) else {
        return empty();
    };
    let (a, b) = if reversed { (b, a) } else { (a, b) };

    match ctx.term_service().subsumes(&a, &b) {
        Ok(Some(outcome)) if bare => boolean(matches!(
            outcome,
            SubsumptionOutcome::Equivalent | SubsumptionOutcome::Subsumes
        )),
        Ok(Some(outcome)) => single(Node::string(outcome.as_code())),
        Ok(None) => empty(),
        Err(err) => term_failure(ctx, name, err),
    }
}

pub fn translate(ctx: &mut EvaluationContext, input: &Collection, args: &[Collection]) -> Result<Collection> {
    if !on_term_service(input) {
        return empty();
    }
    let Some(concept_map) = concept_map_arg(ctx, &args[0])? else {
        return empty();
    };
    let Some(coded) = coded_arg(&args[1]) else {
        return empty();
    };
    let params = params_arg(args.get(2));
    match ctx.term_service().translate(&concept_map, &coded, &params) {
        Ok(outcome) => resource_result(&outcome.to_parameters()),
        Err(err) => term_failure(ctx, "translate", err),
    }
}

/// The coded content of a node: a `code`/string, a `Coding`, a
/// `CodeableConcept` or a `Quantity` (its system and code).
pub(crate) fn coded_value(node: &Node) -> Option<CodedValue> {
    let type_ = node.type_();
    if type_ == FhirPathType::Coding {
        return coding_from_element(node).map(CodedValue::Coding);
    }
    if type_ == FhirPathType::CodeableConcept {
        let codings: Vec<Coding> = node
            .children_named("coding")
            .filter_map(coding_from_element)
            .collect();
        return (!codings.is_empty()).then_some(CodedValue::Concept(codings));
    }
    if type_.is_quantity_type() {
        if node.is_element() {
            let code = node.child_string("code").or_else(|| node.child_string("unit"))?;
            return Some(CodedValue::Coding(Coding {
                system: node.child_string("system"),
                code,
                ..Default::default()
            }));
        }
        let quantity = node.system_value()?.as_quantity()?.clone();
        let code = quantity.code.or(quantity.unit)?;
        return Some(CodedValue::Coding(Coding {
            system: quantity.system.map(|s| s.to_string()),
            code: code.to_string(),
            ..Default::default()
        }));
    }
    if type_.is_string_like() {
        let value = node.system_value()?;
        return value.as_str().map(|code| CodedValue::Code(code.to_string()));
    }
    None
}

fn coding_from_element(node: &Node) -> Option<Coding> {
    Some(Coding {
        system: node.child_string("system"),
        version: node.child_string("version"),
        code: node.child_string("code")?,
        display: node.child_string("display"),
    })
}

fn coding_of(collection: &Collection) -> Option<Coding> {
    match coded_singleton(collection)? {
        CodedValue::Coding(coding) => Some(coding),
        CodedValue::Concept(codings) if codings.len() == 1 => codings.into_iter().next(),
        _ => None,
    }
}

fn coded_arg(arg: &Collection) -> Option<CodedValue> {
    coded_singleton(arg)
}

fn coded_singleton(collection: &Collection) -> Option<CodedValue> {
    match collection.as_slice() {
        [node] => coded_value(node),
        _ => None,
    }
}

fn on_term_service(input: &Collection) -> bool {
    matches!(input.as_slice(), [node] if node.is_term_service())
}

/// A canonical URL given as a string, or the `url` (and `version`) of a
/// resource node.
fn canonical_arg(arg: &Collection) -> Option<String> {
    let [node] = arg.as_slice() else {
        return None;
    };
    if node.is_resource() {
        let url = node.child_string("url")?;
        return Some(match node.child_string("version") {
            Some(version) => format!("{}|{}", url, version),
            None => url,
        });
    }
    if node.type_().is_string_like() {
        return node.system_value()?.as_str().map(str::to_string);
    }
    None
}

fn params_arg(arg: Option<&Collection>) -> TermParams {
    arg.and_then(|params| match params.as_slice() {
        [node] => node.system_value(),
        _ => None,
    })
    .and_then(|value| value.as_str().map(TermParams::parse))
    .unwrap_or_default()
}

fn value_set_arg(ctx: &mut EvaluationContext, arg: &Collection) -> Result<Option<Arc<ValueSet>>> {
    let Some(url) = canonical_arg(arg) else {
        return Ok(None);
    };
    let found = ctx.fhir_context().get_value_set(&url);
    Ok(resource_lookup(ctx, "ValueSet", &url, found))
}

fn code_system_arg(ctx: &mut EvaluationContext, arg: &Collection) -> Result<Option<Arc<CodeSystem>>> {
    let Some(url) = canonical_arg(arg) else {
        return Ok(None);
    };
    let found = ctx.fhir_context().get_code_system(&url);
    Ok(resource_lookup(ctx, "CodeSystem", &url, found))
}

fn concept_map_arg(ctx: &mut EvaluationContext, arg: &Collection) -> Result<Option<Arc<ConceptMap>>> {
    let Some(url) = canonical_arg(arg) else {
        return Ok(None);
    };
    let found = ctx.fhir_context().get_concept_map(&url);
    Ok(resource_lookup(ctx, "ConceptMap", &url, found))
}

fn resource_lookup<T>(
    ctx: &mut EvaluationContext,
    kind: &str,
    url: &str,
    found: ferrum_context::Result<Option<Arc<T>>>,
) -> Option<Arc<T>> {
    match found {
        Ok(Some(resource)) => Some(resource),
        Ok(None) => {
            ctx.add_issue(Issue::warning(
                IssueType::NotFound,
                format!("{} '{}' is not available", kind, url),
            ));
            None
        }
        Err(err) => {
            tracing::warn!(kind, url, error = %err, "terminology resource lookup failed");
            ctx.add_issue(Issue::warning(
                IssueType::NotFound,
                format!("{} '{}' could not be loaded: {}", kind, url, err),
            ));
            None
        }
    }
}

fn term_failure(ctx: &mut EvaluationContext, operation: &str, err: TermServiceError) -> Result<Collection> {
    tracing::warn!(operation, error = %err, "terminology call failed");
    ctx.add_issue(Issue::warning(
        IssueType::NotSupported,
        format!("Terminology operation '{}' failed: {}", operation, err),
    ));
    empty()
}

/// A `Parameters` or `ValueSet` result as a resource node.
fn resource_result(json: &Value) -> Result<Collection> {
    match Object::from_json(json) {
        Some(object) => single(FhirPathTree::from_object(object.into_ref()).get_root().clone()),
        None => empty(),
    }
}
