//! `memberOf()` through the in-memory terminology service and scripted ones

use std::sync::Arc;

use ferrum_context::InMemoryContext;
use ferrum_fhirpath::ast::Expr;
use ferrum_fhirpath::term::{CodedValue, ValidationOutcome};
use ferrum_fhirpath::{EvaluationContext, InMemoryTermService, IssueSeverity, IssueType};
use serde_json::json;

use crate::test_support::*;

const GENDER_VS: &str = "http://hl7.org/fhir/ValueSet/administrative-gender";
const WEIGHT_VS: &str = "http://example.org/fhir/ValueSet/weights";

fn terminology() -> Arc<InMemoryContext> {
    Arc::new(
        InMemoryContext::new()
            .with_resource(json!({
                "resourceType": "CodeSystem",
                "url": "http://hl7.org/fhir/administrative-gender",
                "status": "active",
                "content": "complete",
                "concept": [
                    { "code": "male" }, { "code": "female" }, { "code": "other" }, { "code": "unknown" }
                ]
            }))
            .and_then(|c| {
                c.with_resource(json!({
                    "resourceType": "ValueSet",
                    "url": GENDER_VS,
                    "status": "active",
                    "compose": { "include": [{ "system": "http://hl7.org/fhir/administrative-gender" }] }
                }))
            })
            .and_then(|c| {
                c.with_resource(json!({
                    "resourceType": "ValueSet",
                    "url": WEIGHT_VS,
                    "status": "active",
                    "compose": {
                        "include": [{
                            "system": "http://loinc.org",
                            "concept": [{ "code": "29463-7", "display": "Body weight" }]
                        }]
                    }
                }))
            })
            .expect("terminology fixtures have urls"),
    )
}

fn with_terminology(ctx: EvaluationContext) -> EvaluationContext {
    let fhir = terminology();
    ctx.with_term_service(Arc::new(InMemoryTermService::new(fhir.clone())))
        .with_fhir_context(fhir)
}

fn member_of(path: &str, url: &str, strength: Option<&str>) -> Expr {
    let mut args = vec![Expr::string(url)];
    if let Some(strength) = strength {
        args.push(Expr::string(strength));
    }
    Expr::path(path).call("memberOf", args)
}

#[test]
fn test_code_in_whole_code_system() {
    let mut ctx = with_terminology(context(&patient_json()));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("gender", GENDER_VS, None))), Some(true));
    assert!(!ctx.has_issues());
}

#[test]
fn test_codeable_concept_in_enumerated_value_set() {
    let mut ctx = with_terminology(context(&observation_json()));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("code", WEIGHT_VS, None))), Some(true));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("code.coding", WEIGHT_VS, None))), Some(true));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("code", GENDER_VS, None))), Some(false));
}

#[test]
fn test_required_binding_failure() {
    let patient = json!({ "resourceType": "Patient", "gender": "robot" });
    let mut ctx = with_terminology(context(&patient));

    let result = eval(&mut ctx, &member_of("gender", GENDER_VS, Some("required")));
    assert_eq!(boolean(&result), Some(false));
    assert!(!ctx.has_issues());
}

#[test]
fn test_extensible_binding_failure_is_information() {
    let patient = json!({ "resourceType": "Patient", "gender": "robot" });
    let mut ctx = with_terminology(context(&patient));

    let result = eval(&mut ctx, &member_of("gender", GENDER_VS, Some("extensible")));
    assert_eq!(boolean(&result), Some(true));
    assert_eq!(ctx.issues().len(), 1);
    assert_eq!(ctx.issues()[0].severity, IssueSeverity::Information);
    assert_eq!(ctx.issues()[0].code, IssueType::CodeInvalid);
    assert_eq!(ctx.issues()[0].expression.as_deref(), Some("Patient.gender"));
}

#[test]
fn test_service_failure_is_a_warning() {
    let fhir = terminology();
    let mut ctx = context(&observation_json())
        .with_term_service(Arc::new(ScriptedTermService::failing("offline")))
        .with_fhir_context(fhir);

    let result = eval(&mut ctx, &member_of("code", WEIGHT_VS, None));
    assert!(result.is_empty());
    assert_eq!(ctx.issues().len(), 1);
    assert_eq!(ctx.issues()[0].severity, IssueSeverity::Warning);
}

#[test]
fn test_coded_shapes_reach_the_service() {
    let service = Arc::new(ScriptedTermService::answering(ValidationOutcome::valid(None)));
    let mut ctx = context(&observation_json())
        .with_term_service(service.clone())
        .with_fhir_context(terminology());

    eval(&mut ctx, &member_of("code", WEIGHT_VS, None));
    eval(&mut ctx, &member_of("code.coding", WEIGHT_VS, None));
    eval(&mut ctx, &member_of("value", WEIGHT_VS, None));

    let seen = service.seen();
    assert_eq!(seen.len(), 3);
    assert!(matches!(&seen[0], CodedValue::Concept(codings) if codings.len() == 1));
    assert!(matches!(&seen[1], CodedValue::Coding(c) if c.code == "29463-7"));
    assert!(matches!(&seen[2], CodedValue::Coding(c) if c.code == "kg"));
}

fn data_absent() -> serde_json::Value {
    json!([{
        "url": "http://hl7.org/fhir/StructureDefinition/data-absent-reason",
        "valueCode": "unknown"
    }])
}

#[test]
fn test_data_absent_gender_under_binding() {
    let patient = json!({ "resourceType": "Patient", "_gender": { "extension": data_absent() } });
    let mut ctx = with_terminology(context(&patient));

    let required = eval(&mut ctx, &member_of("gender", GENDER_VS, Some("required")));
    assert_eq!(boolean(&required), Some(true));
    let extensible = eval(&mut ctx, &member_of("gender", GENDER_VS, Some("extensible")));
    assert_eq!(boolean(&extensible), Some(true));
    let unbound = eval(&mut ctx, &member_of("gender", GENDER_VS, None));
    assert_eq!(boolean(&unbound), Some(false));
    assert!(!ctx.has_issues());
}

#[test]
fn test_data_absent_next_to_a_value_is_checked() {
    let patient = json!({
        "resourceType": "Patient",
        "gender": "robot",
        "_gender": { "extension": data_absent() }
    });
    let mut ctx = with_terminology(context(&patient));

    let result = eval(&mut ctx, &member_of("gender", GENDER_VS, Some("required")));
    assert_eq!(boolean(&result), Some(false));
}

#[test]
fn test_data_absent_coding_and_quantity() {
    let observation = json!({
        "resourceType": "Observation",
        "status": "final",
        "code": { "coding": [{ "extension": data_absent() }] },
        "valueQuantity": { "extension": data_absent() }
    });
    let mut ctx = with_terminology(context(&observation));

    assert_eq!(boolean(&eval(&mut ctx, &member_of("code", WEIGHT_VS, Some("required")))), Some(true));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("code.coding", WEIGHT_VS, Some("required")))), Some(true));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("value", WEIGHT_VS, Some("required")))), Some(true));

    let coded = json!({
        "resourceType": "Observation",
        "status": "final",
        "code": { "coding": [{ "system": "http://loinc.org", "code": "8302-2", "extension": data_absent() }] }
    });
    let mut ctx = with_terminology(context(&coded));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("code", WEIGHT_VS, Some("required")))), Some(false));
}

#[test]
fn test_all_languages_by_syntax() {
    const LANGUAGES: &str = "http://hl7.org/fhir/ValueSet/all-languages";
    let mut ctx = context(&json!({ "resourceType": "Patient", "language": "en-US" }));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("language", LANGUAGES, None))), Some(true));

    let mut ctx = context(&json!({ "resourceType": "Patient", "language": "invalidLanguageCode" }));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("language", LANGUAGES, None))), Some(false));

    let observation = |system: &str| {
        json!({
            "resourceType": "Observation",
            "status": "final",
            "valueCodeableConcept": { "coding": [{ "system": system, "code": "en-US" }] }
        })
    };
    let mut ctx = context(&observation("urn:ietf:bcp:47"));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("value", LANGUAGES, None))), Some(true));
    let mut ctx = context(&observation("urn:invalid"));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("value", LANGUAGES, None))), Some(false));
    assert!(!ctx.has_issues());
}

#[test]
fn test_ucum_units_by_syntax() {
    const UNITS: &str = "http://hl7.org/fhir/ValueSet/ucum-units";
    let observation = |system: &str, code: &str| {
        json!({
            "resourceType": "Observation",
            "status": "final",
            "valueQuantity": { "value": 12, "unit": code, "system": system, "code": code }
        })
    };
    let ucum = "http://unitsofmeasure.org";

    let mut ctx = context(&observation(ucum, "U/L"));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("value", UNITS, None))), Some(true));
    let mut ctx = context(&observation(ucum, "invalid ucum code"));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("value", UNITS, None))), Some(false));
    let mut ctx = context(&observation("invalid", "U/L"));
    assert_eq!(boolean(&eval(&mut ctx, &member_of("value", UNITS, Some("required")))), Some(false));
    assert!(!ctx.has_issues());
}
