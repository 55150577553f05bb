//! `%terminologies` functions against the in-memory terminology service

use std::sync::Arc;

use ferrum_context::InMemoryContext;
use ferrum_fhirpath::ast::Expr;
use ferrum_fhirpath::{Collection, EvaluationContext, InMemoryTermService, IssueSeverity, Node};
use serde_json::json;

use crate::test_support::*;

const CS: &str = "http://example.org/fhir/CodeSystem/body-sites";
const VS: &str = "http://example.org/fhir/ValueSet/body-sites";
const CM: &str = "http://example.org/fhir/ConceptMap/sites-to-snomed";

fn term_context(resource: &serde_json::Value) -> EvaluationContext {
    let fhir = Arc::new(
        InMemoryContext::new()
            .with_resource(json!({
                "resourceType": "CodeSystem",
                "url": CS,
                "name": "BodySites",
                "version": "1.0.0",
                "status": "active",
                "content": "complete",
                "concept": [{
                    "code": "arm",
                    "display": "Arm",
                    "definition": "Upper limb",
                    "concept": [{ "code": "hand", "display": "Hand" }]
                }, {
                    "code": "leg",
                    "display": "Leg"
                }]
            }))
            .and_then(|c| {
                c.with_resource(json!({
                    "resourceType": "ValueSet",
                    "url": VS,
                    "status": "active",
                    "compose": { "include": [{ "system": CS, "concept": [{ "code": "arm" }, { "code": "leg" }] }] }
                }))
            })
            .and_then(|c| {
                c.with_resource(json!({
                    "resourceType": "ConceptMap",
                    "url": CM,
                    "status": "active",
                    "group": [{
                        "source": CS,
                        "target": "http://snomed.info/sct",
                        "element": [{
                            "code": "arm",
                            "target": [{ "code": "53120007", "display": "Upper limb", "relationship": "equivalent" }]
                        }]
                    }]
                }))
            })
            .expect("fixtures have urls"),
    );
    context(resource)
        .with_term_service(Arc::new(InMemoryTermService::new(fhir.clone())))
        .with_fhir_context(fhir)
}

fn site(code: &str) -> serde_json::Value {
    json!({
        "resourceType": "Observation",
        "status": "final",
        "bodySite": { "coding": [{ "system": CS, "code": code }] }
    })
}

fn terminologies(name: &str, args: Vec<Expr>) -> Expr {
    Expr::constant("terminologies").call(name, args)
}

fn parameter<'a>(parameters: &'a Node, name: &str) -> Option<&'a Node> {
    parameters
        .children_named("parameter")
        .find(|p| p.child_string("name").as_deref() == Some(name))
}

#[test]
fn test_expand() {
    let mut ctx = term_context(&site("arm"));
    let result = eval(&mut ctx, &terminologies("expand", vec![Expr::string(VS)]));

    let value_set = result.first().expect("an expansion");
    assert_eq!(value_set.type_name(), "ValueSet");
    let expansion = value_set.child("expansion").expect("expansion element");
    let codes: Vec<String> = expansion
        .children_named("contains")
        .filter_map(|c| c.child_string("code"))
        .collect();
    assert_eq!(codes, vec!["arm", "leg"]);
}

#[test]
fn test_expand_with_count_parameter() {
    let mut ctx = term_context(&site("arm"));
    let expr = terminologies("expand", vec![Expr::string(VS), Expr::string("count=1")]);
    let result = eval(&mut ctx, &expr);
    let expansion = result.first().and_then(|vs| vs.child("expansion")).unwrap();
    assert_eq!(expansion.children_named("contains").count(), 1);
}

#[test]
fn test_lookup() {
    let mut ctx = term_context(&site("hand"));
    let expr = terminologies("lookup", vec![Expr::path("bodySite.coding")]);
    let result = eval(&mut ctx, &expr);

    let parameters = result.first().expect("lookup parameters");
    let display = parameter(parameters, "display").and_then(|p| p.child_string("valueString"));
    assert_eq!(display.as_deref(), Some("Hand"));
}

#[test]
fn test_validate_vs_and_cs() {
    let mut ctx = term_context(&site("hand"));

    let expr = terminologies("validateVS", vec![Expr::string(VS), Expr::path("bodySite")]);
    let result = eval(&mut ctx, &expr);
    let verdict = parameter(result.first().unwrap(), "result").and_then(|p| p.child("valueBoolean").cloned());
    assert_eq!(verdict.and_then(|v| v.system_value()).and_then(|v| v.as_boolean()), Some(false));

    let expr = terminologies("validateCS", vec![Expr::string(CS), Expr::path("bodySite")]);
    let result = eval(&mut ctx, &expr);
    let verdict = parameter(result.first().unwrap(), "result").and_then(|p| p.child("valueBoolean").cloned());
    assert_eq!(verdict.and_then(|v| v.system_value()).and_then(|v| v.as_boolean()), Some(true));
}

#[test]
fn test_subsumption() {
    let observation = json!({
        "resourceType": "Observation",
        "bodySite": {
            "coding": [{ "system": CS, "code": "arm" }, { "system": CS, "code": "hand" }]
        }
    });
    let mut ctx = term_context(&observation);
    let arm = Expr::path("bodySite.coding").index(Expr::integer(0));
    let hand = Expr::path("bodySite.coding").index(Expr::integer(1));

    let outcome = eval(&mut ctx, &terminologies("subsumes", vec![arm.clone(), hand.clone()]));
    assert_eq!(strings(&outcome), vec!["subsumes"]);

    let outcome = eval(&mut ctx, &terminologies("subsumedBy", vec![arm, hand.clone()]));
    assert_eq!(strings(&outcome), vec!["subsumed-by"]);

    let arm_in_resource = Expr::constant("resource")
        .dot("bodySite")
        .dot("coding")
        .index(Expr::integer(0));
    let bare = eval(&mut ctx, &hand.call("subsumedBy", vec![arm_in_resource]));
    assert_eq!(boolean(&bare), Some(true));
}

#[test]
fn test_translate() {
    let mut ctx = term_context(&site("arm"));
    let expr = terminologies("translate", vec![Expr::string(CM), Expr::path("bodySite.coding")]);
    let result = eval(&mut ctx, &expr);

    let parameters = result.first().expect("translation parameters");
    let matched = parameter(parameters, "match").expect("a match");
    let concept = matched
        .children_named("part")
        .find(|p| p.child_string("name").as_deref() == Some("concept"))
        .and_then(|p| p.child("valueCoding"))
        .and_then(|c| c.child_string("code"));
    assert_eq!(concept.as_deref(), Some("53120007"));
}

#[test]
fn test_wrong_receiver_or_shapes_are_empty() {
    let mut ctx = term_context(&site("arm"));

    let on_string = Expr::string("x").call("expand", vec![Expr::string(VS)]);
    assert!(eval(&mut ctx, &on_string).is_empty());

    let bad_coding = terminologies("lookup", vec![Expr::integer(5)]);
    assert!(eval(&mut ctx, &bad_coding).is_empty());
    assert!(!ctx.has_issues());
}

#[test]
fn test_unknown_value_set_is_reported() {
    let mut ctx = term_context(&site("arm"));
    let expr = terminologies("expand", vec![Expr::string("http://example.org/fhir/ValueSet/none")]);
    assert_eq!(eval(&mut ctx, &expr), Collection::empty());
    assert_eq!(ctx.issues().len(), 1);
    assert_eq!(ctx.issues()[0].severity, IssueSeverity::Warning);
}
