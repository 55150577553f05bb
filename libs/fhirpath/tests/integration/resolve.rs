//! `resolve()` over contained resources, bundles and the reference resolver

use std::sync::Arc;

use ferrum_fhirpath::ast::Expr;
use ferrum_fhirpath::{
    EvalOptions, FhirPathType, InMemoryResolver, IssueSeverity, Node, Object,
};
use serde_json::json;

use crate::test_support::*;

fn resolve(path: &str) -> Expr {
    Expr::path(path).call("resolve", vec![])
}

#[test]
fn test_contained_fragment() {
    let mut ctx = context(&patient_json());
    let result = eval(&mut ctx, &resolve("managingOrganization"));

    assert_eq!(result.len(), 1);
    let organization = result.first().unwrap();
    assert_eq!(organization.type_name(), "Organization");
    assert_eq!(organization.child_string("name").as_deref(), Some("Clinic"));
}

#[test]
fn test_bare_fragment_is_the_container() {
    let patient = json!({
        "resourceType": "Patient",
        "id": "p2",
        "contained": [{
            "resourceType": "Organization",
            "id": "org",
            "partOf": { "reference": "#" }
        }]
    });
    let mut ctx = context(&patient);
    let result = eval(&mut ctx, &resolve("contained.partOf"));

    assert_eq!(result.len(), 1);
    assert_eq!(result.first().unwrap().type_(), FhirPathType::Patient);
    assert_eq!(result.first().unwrap().child_string("id").as_deref(), Some("p2"));
}

#[test]
fn test_unknown_fragment_yields_placeholder() {
    let patient = json!({
        "resourceType": "Patient",
        "managingOrganization": { "reference": "#missing", "type": "Organization" }
    });
    let mut ctx = context(&patient);
    let result = eval(&mut ctx, &resolve("managingOrganization"));

    assert_eq!(result.len(), 1);
    assert_eq!(result.first().unwrap().type_(), FhirPathType::Organization);
    assert!(result.first().unwrap().children().is_empty());
}

#[test]
fn test_bundle_entry_by_full_url() {
    let mut ctx = context(&bundle_json());
    let result = eval(&mut ctx, &resolve("entry.resource.subject"));

    assert_eq!(result.len(), 1);
    let patient = result.first().unwrap();
    assert_eq!(patient.type_(), FhirPathType::Patient);
    assert_eq!(patient.child_string("id").as_deref(), Some("p1"));
    assert!(!ctx.has_issues());
}

#[test]
fn test_resolver_only_when_enabled() {
    let resolver = InMemoryResolver::new().with_resource(
        Object::resource("Patient")
            .with_string("id", "p1")
            .with_string("gender", "male")
            .into_ref(),
    );

    let mut disabled = context(&observation_json()).with_resolver(Arc::new(resolver.clone()));
    let placeholder = eval(&mut disabled, &resolve("subject"));
    assert_eq!(placeholder.first().unwrap().type_(), FhirPathType::Patient);
    assert!(placeholder.first().unwrap().children().is_empty());

    let mut enabled = context(&observation_json())
        .with_options(EvalOptions {
            resolve_relative_references: true,
            ..Default::default()
        })
        .with_resolver(Arc::new(resolver));
    let resolved = eval(&mut enabled, &resolve("subject"));
    assert_eq!(resolved.first().unwrap().child_string("gender").as_deref(), Some("male"));
}

#[test]
fn test_foreign_base_is_not_sent_to_resolver() {
    let observation = json!({
        "resourceType": "Observation",
        "subject": { "reference": "http://elsewhere.org/fhir/Patient/p1" }
    });
    let resolver = InMemoryResolver::new()
        .with_resource(Object::resource("Patient").with_string("id", "p1").into_ref());
    let mut ctx = context(&observation)
        .with_options(EvalOptions {
            resolve_relative_references: true,
            service_base_url: Some("http://example.org/fhir/".into()),
            ..Default::default()
        })
        .with_resolver(Arc::new(resolver));

    let result = eval(&mut ctx, &resolve("subject"));
    assert_eq!(result.first().unwrap().type_(), FhirPathType::Patient);
    assert!(result.first().unwrap().children().is_empty());
}

#[test]
fn test_untyped_reference_records_information() {
    let observation = json!({
        "resourceType": "Observation",
        "subject": { "reference": "urn:uuid:6f0c6c34-3a43-4d2c-a5b8-1d1b5d3c3b61" }
    });
    let mut ctx = context(&observation);
    let result = eval(&mut ctx, &resolve("subject"));

    assert_eq!(result.first().map(Node::type_), Some(FhirPathType::UnknownResourceType));
    assert_eq!(ctx.issues().len(), 1);
    assert_eq!(ctx.issues()[0].severity, IssueSeverity::Information);
}

#[test]
fn test_resolved_type_checks() {
    let mut ctx = context(&observation_json());
    let expr = resolve("subject").is_type("Patient");
    assert_eq!(boolean(&eval(&mut ctx, &expr)), Some(true));
}
