use ferrum_fhirpath::ast::Expr;
use ferrum_fhirpath::{Collection, EvalOptions, Error, Evaluator, Node};

use crate::test_support::*;

#[test]
fn resolves_resource_constants() {
    let mut ctx = context(&patient_json());

    for name in ["resource", "rootResource", "context"] {
        let result = eval(&mut ctx, &Expr::constant(name));
        assert_eq!(result.len(), 1, "%{}", name);
        assert!(result.first().unwrap().ptr_eq(ctx.root().unwrap()));
    }

    let ids = eval(&mut ctx, &Expr::constant("resource").dot("id"));
    assert_eq!(strings(&ids), vec!["p1"]);
}

#[test]
fn resolves_well_known_urls() {
    let mut ctx = context(&patient_json());
    let cases = [
        ("ucum", "http://unitsofmeasure.org"),
        ("loinc", "http://loinc.org"),
        ("sct", "http://snomed.info/sct"),
        ("ext-patient-birthPlace", "http://hl7.org/fhir/StructureDefinition/patient-birthPlace"),
        ("vs-administrative-gender", "http://hl7.org/fhir/ValueSet/administrative-gender"),
    ];
    for (name, url) in cases {
        assert_eq!(strings(&eval(&mut ctx, &Expr::constant(name))), vec![url], "%{}", name);
    }
}

#[test]
fn terminologies_is_the_service_sentinel() {
    let mut ctx = context(&patient_json());
    let result = eval(&mut ctx, &Expr::constant("terminologies"));
    assert_eq!(result.len(), 1);
    assert!(result.first().unwrap().is_term_service());
}

#[test]
fn extension_constant_feeds_extension() {
    let mut ctx = context(&patient_json());
    let expr = Expr::This
        .call("extension", vec![Expr::constant("ext-patient-birthPlace")])
        .dot("value");
    assert_eq!(strings(&eval(&mut ctx, &expr)), vec!["Springfield"]);
}

#[test]
fn host_constants_override_defaults() {
    let mut ctx = context(&patient_json());
    ctx.set_external_constant("ucum", Collection::singleton(Node::string("urn:local-units")));
    ctx.set_external_constant("threshold", Collection::singleton(Node::integer(3)));

    assert_eq!(strings(&eval(&mut ctx, &Expr::constant("ucum"))), vec!["urn:local-units"]);
    let expr = Expr::path("name.given").call("count", vec![]).equals(Expr::constant("threshold"));
    assert_eq!(boolean(&eval(&mut ctx, &expr)), Some(true));

    ctx.unset_external_constant("ucum");
    assert_eq!(strings(&eval(&mut ctx, &Expr::constant("ucum"))), vec!["http://unitsofmeasure.org"]);
}

#[test]
fn unknown_constants_depend_on_strictness() {
    let mut lenient = context(&patient_json());
    assert!(eval(&mut lenient, &Expr::constant("nope")).is_empty());

    let mut strict = context(&patient_json()).with_options(EvalOptions {
        strict: true,
        ..Default::default()
    });
    let err = Evaluator::default()
        .evaluate_root(&mut strict, &Expr::constant("nope"))
        .unwrap_err();
    assert!(matches!(err, Error::VariableNotFound(_)));
}
