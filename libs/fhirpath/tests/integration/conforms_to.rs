//! `conformsTo()` against profiles held by the canonical context

use std::sync::Arc;

use ferrum_fhirpath::ast::Expr;
use ferrum_fhirpath::{
    Collection, Error, Evaluator, ExpressionConstraintValidator, FhirPathFunction, IssueSeverity,
    IssueType, Node,
};
use ferrum_fhirpath::functions::ConformsTo;
use serde_json::json;

use crate::test_support::*;

fn conforms_to(url: &str) -> Expr {
    Expr::This.call("conformsTo", vec![Expr::string(url)])
}

fn expression_validator() -> ExpressionConstraintValidator {
    ExpressionConstraintValidator::default()
        .with_expression("np-1", Expr::path("name.family").call("exists", vec![]))
        .with_expression("np-2", Expr::member("birthDate").call("exists", vec![]))
        .with_expression("np-3", Expr::member("use").call("exists", vec![]))
}

#[test]
fn test_conforming_patient() {
    let profile = named_patient_profile();
    let mut ctx = context(&patient_json())
        .with_fhir_context(fhir_context_with(&profile))
        .with_constraint_validator(Arc::new(expression_validator()));

    assert_eq!(boolean(&eval(&mut ctx, &conforms_to(PROFILE_URL))), Some(true));
    assert!(!ctx.has_issues());
}

#[test]
fn test_failed_error_constraint() {
    let profile = named_patient_profile();
    let patient = json!({
        "resourceType": "Patient",
        "birthDate": "1980-01-01",
        "name": [{ "use": "official", "given": ["Ann"] }]
    });
    let mut ctx = context(&patient)
        .with_fhir_context(fhir_context_with(&profile))
        .with_constraint_validator(Arc::new(expression_validator()));

    assert_eq!(boolean(&eval(&mut ctx, &conforms_to(PROFILE_URL))), Some(false));
    assert_eq!(ctx.issues().len(), 1);
    let issue = &ctx.issues()[0];
    assert_eq!(issue.severity, IssueSeverity::Error);
    assert_eq!(issue.code, IssueType::Invariant);
    assert!(issue.description.contains("np-1"));
}

#[test]
fn test_failed_warning_constraint_still_conforms() {
    let profile = named_patient_profile();
    let patient = json!({
        "resourceType": "Patient",
        "name": [{ "use": "official", "family": "Doe" }]
    });
    let mut ctx = context(&patient)
        .with_fhir_context(fhir_context_with(&profile))
        .with_constraint_validator(Arc::new(expression_validator()));

    assert_eq!(boolean(&eval(&mut ctx, &conforms_to(PROFILE_URL))), Some(true));
    assert_eq!(ctx.issues().len(), 1);
    assert_eq!(ctx.issues()[0].severity, IssueSeverity::Warning);
}

#[test]
fn test_constraints_are_checked_once_per_input() {
    let profile = named_patient_profile();
    let validator = Arc::new(CountingValidator::default());
    let mut ctx = context(&patient_json())
        .with_fhir_context(fhir_context_with(&profile))
        .with_constraint_validator(validator.clone());

    let expr = conforms_to(PROFILE_URL).and(conforms_to(PROFILE_URL));
    assert_eq!(boolean(&eval(&mut ctx, &expr)), Some(true));
    assert_eq!(validator.calls(), profile.constraints().count());

    ctx.reset();
    eval(&mut ctx, &conforms_to(PROFILE_URL));
    assert_eq!(validator.calls(), 2 * profile.constraints().count());
}

#[test]
fn test_cached_failure_is_reused() {
    let profile = named_patient_profile();
    let validator = Arc::new(CountingValidator::failing(&["np-1"]));
    let mut ctx = context(&patient_json())
        .with_fhir_context(fhir_context_with(&profile))
        .with_constraint_validator(validator.clone());

    assert_eq!(boolean(&eval(&mut ctx, &conforms_to(PROFILE_URL))), Some(false));
    let calls = validator.calls();
    assert_eq!(boolean(&eval(&mut ctx, &conforms_to(PROFILE_URL))), Some(false));
    assert_eq!(validator.calls(), calls);
    assert_eq!(ctx.issues().len(), 1);
}

#[test]
fn test_self_referencing_constraint_terminates() {
    let profile = named_patient_profile();
    let validator = ExpressionConstraintValidator::default()
        .with_expression("np-1", conforms_to(PROFILE_URL));
    let mut ctx = context(&patient_json())
        .with_fhir_context(fhir_context_with(&profile))
        .with_constraint_validator(Arc::new(validator));

    assert_eq!(boolean(&eval(&mut ctx, &conforms_to(PROFILE_URL))), Some(true));
}

#[test]
fn test_unknown_profile_is_not_supported() {
    let mut ctx = context(&patient_json());
    let expr = conforms_to("http://example.org/fhir/StructureDefinition/unknown");

    assert_eq!(boolean(&eval(&mut ctx, &expr)), Some(true));
    assert_eq!(ctx.issues().len(), 1);
    assert_eq!(ctx.issues()[0].severity, IssueSeverity::Warning);
    assert_eq!(ctx.issues()[0].code, IssueType::NotSupported);
}

#[test]
fn test_profile_for_another_type() {
    let profile = named_patient_profile();
    let mut ctx = context(&observation_json()).with_fhir_context(fhir_context_with(&profile));

    assert_eq!(boolean(&eval(&mut ctx, &conforms_to(PROFILE_URL))), Some(false));
    assert_eq!(ctx.issues()[0].code, IssueType::Structure);
}

#[test]
fn test_requires_structural_input() {
    let mut ctx = context(&patient_json());
    let result = ConformsTo.apply(
        &mut ctx,
        &Collection::singleton(Node::string("not a resource")),
        &[Collection::singleton(Node::string(PROFILE_URL))],
    );
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    let expr = Expr::path("name").call("conformsTo", vec![Expr::string(PROFILE_URL)]);
    assert!(Evaluator::default().evaluate_root(&mut ctx, &expr).is_err());
}

const GENDER_PROFILE_URL: &str = "http://example.org/fhir/StructureDefinition/gendered-patient";
const GENDER_VS: &str = "http://hl7.org/fhir/ValueSet/administrative-gender";

fn gendered_context(patient: &serde_json::Value) -> ferrum_fhirpath::EvaluationContext {
    use ferrum_models::{BindingStrength, ElementDefinition, StructureDefinition, StructureDefinitionKind};

    let profile = StructureDefinition::new(
        GENDER_PROFILE_URL,
        "GenderedPatient",
        StructureDefinitionKind::Resource,
        "Patient",
    )
    .with_snapshot(vec![
        ElementDefinition::new("Patient"),
        ElementDefinition::new("Patient.gender").with_binding(BindingStrength::Required, GENDER_VS),
        ElementDefinition::new("Patient.maritalStatus")
            .with_binding(BindingStrength::Example, "http://example.org/fhir/ValueSet/unknown"),
    ]);
    let mut fhir = ferrum_context::InMemoryContext::new()
        .with_resource(json!({
            "resourceType": "CodeSystem",
            "url": "http://hl7.org/fhir/administrative-gender",
            "status": "active",
            "content": "complete",
            "concept": [{ "code": "male" }, { "code": "female" }, { "code": "other" }, { "code": "unknown" }]
        }))
        .and_then(|c| {
            c.with_resource(json!({
                "resourceType": "ValueSet",
                "url": GENDER_VS,
                "status": "active",
                "compose": { "include": [{ "system": "http://hl7.org/fhir/administrative-gender" }] }
            }))
        })
        .expect("terminology fixtures have urls");
    fhir.add_structure_definition(&profile).expect("profile has a url");
    let fhir = Arc::new(fhir);
    context(patient)
        .with_term_service(Arc::new(ferrum_fhirpath::InMemoryTermService::new(fhir.clone())))
        .with_fhir_context(fhir)
}

#[test]
fn test_required_binding_is_checked() {
    let mut ctx = gendered_context(&json!({ "resourceType": "Patient", "gender": "female" }));
    assert_eq!(boolean(&eval(&mut ctx, &conforms_to(GENDER_PROFILE_URL))), Some(true));
    assert!(!ctx.has_issues());

    let mut ctx = gendered_context(&json!({
        "resourceType": "Patient",
        "gender": "robot",
        "maritalStatus": { "coding": [{ "system": "http://example.org", "code": "x" }] }
    }));
    assert_eq!(boolean(&eval(&mut ctx, &conforms_to(GENDER_PROFILE_URL))), Some(false));
    assert_eq!(ctx.issues().len(), 1);
    let issue = &ctx.issues()[0];
    assert_eq!(issue.severity, IssueSeverity::Error);
    assert_eq!(issue.code, IssueType::CodeInvalid);
    assert_eq!(issue.expression.as_deref(), Some("Patient.gender"));
    assert!(issue.description.contains(GENDER_VS));
}

#[test]
fn test_data_absent_gender_satisfies_binding() {
    let patient = json!({
        "resourceType": "Patient",
        "_gender": {
            "extension": [{
                "url": "http://hl7.org/fhir/StructureDefinition/data-absent-reason",
                "valueCode": "asked-declined"
            }]
        }
    });
    let mut ctx = gendered_context(&patient);
    assert_eq!(boolean(&eval(&mut ctx, &conforms_to(GENDER_PROFILE_URL))), Some(true));
    assert!(!ctx.has_issues());
}
