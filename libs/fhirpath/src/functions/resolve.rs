//! `resolve()`: follow references to the resources they point at.
//!
//! For every `Reference` element (or uri/string value) in the input, in order:
//!
//! 1. `#` and `#id` resolve inside the nearest enclosing resource: `#` is that
//!    resource, `#id` one of its `contained` resources.
//! 2. Inside a Bundle, the reference is made absolute against the enclosing
//!    entry's `fullUrl` and looked up among the bundle's entries.
//! 3. Literal references (`[base/]Type/id[/_history/v]`) go to the context's
//!    [`ReferenceResolver`](crate::resolver::ReferenceResolver) when relative
//!    resolution is enabled and the base is absent or the service's own.
//!
//! Anything still unresolved becomes a resource placeholder typed from the
//! reference's `type` or URL, so `resolve() is Patient` keeps working.

use crate::collection::Collection;
use crate::context::EvaluationContext;
use crate::error::Result;
use crate::issue::{Issue, IssueType};
use crate::node::Node;
use crate::resolver::parse_reference;
use crate::tree::FhirPathTree;
use crate::types::{FhirPathType, TypeNamespace};

use super::FhirPathFunction;

#[derive(Debug, Default, Clone, Copy)]
pub struct Resolve;

impl FhirPathFunction for Resolve {
    fn name(&self) -> &str {
        "resolve"
    }

    fn min_arity(&self) -> usize {
        0
    }

    fn max_arity(&self) -> usize {
        0
    }

    fn apply(&self, ctx: &mut EvaluationContext, input: &Collection, _args: &[Collection]) -> Result<Collection> {
        let mut resolved = Collection::with_capacity(input.len());
        for node in input {
            let Some(reference) = reference_of(node) else {
                continue;
            };
            let target = match local_target(ctx, node, &reference) {
                Some(target) => target,
                None => match remote_target(ctx, &reference)? {
                    Some(target) => target,
                    None => placeholder(ctx, node, &reference),
                },
            };
            resolved.push(target);
        }
        Ok(resolved)
    }
}

/// The reference string of a Reference element or a uri-like value.
fn reference_of(node: &Node) -> Option<String> {
    if node.type_() == FhirPathType::Reference {
        return node.child_string("reference");
    }
    if node.type_().is_string_like() {
        return node.system_value()?.as_str().map(str::to_string);
    }
    None
}

/// Ancestors of `node`, nearest first. Nodes outside the context's tree have
/// none.
fn ancestors(ctx: &EvaluationContext, node: &Node) -> Vec<Node> {
    ctx.tree()
        .map(|tree| tree.ancestors(node).cloned().collect())
        .unwrap_or_default()
}

fn local_target(ctx: &mut EvaluationContext, node: &Node, reference: &str) -> Option<Node> {
    let ancestors = ancestors(ctx, node);

    if let Some(fragment) = reference.strip_prefix('#') {
        let container = ancestors
            .iter()
            .find(|n| n.is_resource() && n.name() != Some("contained"))
            .cloned()
            .or_else(|| ctx.root_resource())?;
        if fragment.is_empty() {
            return Some(container);
        }
        return container
            .children_named("contained")
            .find(|c| c.child_string("id").as_deref() == Some(fragment))
            .cloned();
    }

    let root = ctx.root_resource()?;
    if root.type_() != FhirPathType::Bundle {
        return None;
    }
    let full_url = ancestors.iter().find_map(|n| n.child_string("fullUrl"));
    let candidate = absolute_reference(reference, full_url.as_deref());
    tracing::debug!(reference, candidate = %candidate, "looking up bundle entry");
    ctx.bundle_entry(&candidate)
}

/// Make a relative reference absolute against an entry's `fullUrl`
/// (`http://x/fhir/Patient/1` + `Observation/2` → `http://x/fhir/Observation/2`).
fn absolute_reference(reference: &str, full_url: Option<&str>) -> String {
    if is_absolute(reference) {
        return reference.to_string();
    }
    let base = full_url
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .and_then(parse_reference)
        .and_then(|parsed| parsed.base_url);
    match base {
        Some(base) => format!("{}/{}", base, reference),
        None => reference.to_string(),
    }
}

fn is_absolute(reference: &str) -> bool {
    reference.starts_with("urn:") || reference.contains("://")
}

fn remote_target(ctx: &EvaluationContext, reference: &str) -> Result<Option<Node>> {
    if !ctx.options().resolve_relative_references {
        return Ok(None);
    }
    let Some(parsed) = parse_reference(reference) else {
        return Ok(None);
    };
    let own_base = ctx
        .options()
        .service_base_url
        .as_deref()
        .map(|b| b.trim_end_matches('/'));
    if parsed.base_url.is_some() && parsed.base_url != own_base {
        return Ok(None);
    }
    let resolved = ctx
        .resolver()
        .resolve(parsed.resource_type, parsed.id, parsed.version)?;
    Ok(resolved.map(|object| FhirPathTree::from_object(object).get_root().clone()))
}

fn placeholder(ctx: &mut EvaluationContext, node: &Node, reference: &str) -> Node {
    let declared = node
        .child_string("type")
        .or_else(|| parse_reference(reference).map(|r| r.resource_type.to_string()));
    let type_ = declared
        .as_deref()
        .and_then(|t| FhirPathType::from_namespace_name(TypeNamespace::Fhir, t))
        .filter(|t| t.is_resource_type());

    match type_ {
        Some(type_) => Node::resource_placeholder(type_),
        None => {
            ctx.add_issue(
                Issue::information(
                    IssueType::Informational,
                    format!("Unable to determine the type of the resource referenced by '{}'", reference),
                )
                .with_expression(node.path()),
            );
            Node::resource_placeholder(FhirPathType::UnknownResourceType)
        }
    }
}
