//! Built-in functions evaluated over real resources

use ferrum_fhirpath::ast::Expr;
use ferrum_fhirpath::{Error, Evaluator};

use crate::test_support::*;

const BIRTH_PLACE: &str = "http://hl7.org/fhir/StructureDefinition/patient-birthPlace";

fn given() -> Expr {
    Expr::path("name.given")
}

#[test]
fn test_string_functions() {
    let mut ctx = context(&patient_json());
    let family = Expr::path("name.family");

    assert_eq!(strings(&eval(&mut ctx, &family.clone().call("upper", vec![]))), vec!["CHALMERS"]);
    assert_eq!(
        strings(&eval(&mut ctx, &family.clone().call("substring", vec![Expr::integer(1), Expr::integer(3)]))),
        vec!["hal"]
    );
    assert_eq!(
        boolean(&eval(&mut ctx, &family.clone().call("startsWith", vec![Expr::string("Cha")]))),
        Some(true)
    );
    assert_eq!(
        boolean(&eval(&mut ctx, &family.call("matches", vec![Expr::string("^C[a-z]+s$")]))),
        Some(true)
    );
    assert_eq!(
        strings(&eval(&mut ctx, &given().call("join", vec![Expr::string(", ")]))),
        vec!["Peter, James, Jim"]
    );
}

#[test]
fn test_string_function_on_many_items_fails() {
    let mut ctx = context(&patient_json());
    let expr = given().call("upper", vec![]);
    let err = Evaluator::default().evaluate_root(&mut ctx, &expr).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_subsetting() {
    let mut ctx = context(&patient_json());

    assert_eq!(strings(&eval(&mut ctx, &given().call("tail", vec![]))), vec!["James", "Jim"]);
    assert_eq!(strings(&eval(&mut ctx, &given().call("skip", vec![Expr::integer(2)]))), vec!["Jim"]);
    assert_eq!(strings(&eval(&mut ctx, &given().call("take", vec![Expr::integer(1)]))), vec!["Peter"]);
    assert_eq!(strings(&eval(&mut ctx, &given().call("last", vec![]))), vec!["Jim"]);
    assert!(eval(&mut ctx, &given().call("skip", vec![Expr::integer(10)])).is_empty());
}

#[test]
fn test_unordered_results_reject_ordered_functions() {
    let mut ctx = context(&patient_json());
    let expr = Expr::This.call("children", vec![]).call("first", vec![]);
    let err = Evaluator::default().evaluate_root(&mut ctx, &expr).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_existence() {
    let mut ctx = context(&patient_json());

    assert_eq!(boolean(&eval(&mut ctx, &given().call("isDistinct", vec![]))), Some(true));
    let doubled = given().call("combine", vec![Expr::string("Jim")]);
    assert_eq!(boolean(&eval(&mut ctx, &doubled.clone().call("isDistinct", vec![]))), Some(false));
    assert_eq!(strings(&eval(&mut ctx, &doubled.call("distinct", vec![]))), vec!["Peter", "James", "Jim"]);

    let official = Expr::path("name")
        .call("select", vec![Expr::member("use").equals(Expr::string("official"))])
        .call("anyTrue", vec![]);
    assert_eq!(boolean(&eval(&mut ctx, &official)), Some(true));
}

#[test]
fn test_all_true_rejects_non_booleans() {
    let mut ctx = context(&patient_json());
    let expr = given().call("allTrue", vec![]);
    let err = Evaluator::default().evaluate_root(&mut ctx, &expr).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_union_keeps_first_seen_order() {
    let mut ctx = context(&patient_json());
    let expr = Expr::string("Jim")
        .union(given())
        .union(Expr::string("Ann"));
    assert_eq!(
        strings(&eval(&mut ctx, &expr)),
        vec!["Jim", "Peter", "James", "Ann"]
    );

    let function = given().call("union", vec![Expr::string("Peter")]);
    assert_eq!(strings(&eval(&mut ctx, &function)), vec!["Peter", "James", "Jim"]);
}

#[test]
fn test_extension_by_url() {
    let mut ctx = context(&patient_json());
    let expr = Expr::This
        .call("extension", vec![Expr::string(BIRTH_PLACE)])
        .dot("value");
    assert_eq!(strings(&eval(&mut ctx, &expr)), vec!["Springfield"]);

    let none = Expr::This.call("extension", vec![Expr::string("http://example.org/none")]);
    assert!(eval(&mut ctx, &none).is_empty());
}

#[test]
fn test_type_reflection() {
    let mut ctx = context(&patient_json());

    let resource = Expr::This.call("type", vec![]);
    assert_eq!(strings(&eval(&mut ctx, &resource.clone().dot("namespace"))), vec!["FHIR"]);
    assert_eq!(strings(&eval(&mut ctx, &resource.dot("name"))), vec!["Patient"]);

    let literal = Expr::integer(1).call("type", vec![]);
    assert_eq!(strings(&eval(&mut ctx, &literal.clone().dot("namespace"))), vec!["System"]);
    assert_eq!(strings(&eval(&mut ctx, &literal.dot("name"))), vec!["Integer"]);
}

#[test]
fn test_primitive_values() {
    let mut ctx = context(&patient_json());
    assert_eq!(boolean(&eval(&mut ctx, &Expr::path("birthDate").call("hasValue", vec![]))), Some(true));
    assert_eq!(boolean(&eval(&mut ctx, &Expr::path("name").call("hasValue", vec![]))), Some(false));

    let year = Expr::path("birthDate").call("toString", vec![]).call("substring", vec![Expr::integer(0), Expr::integer(4)]);
    assert_eq!(strings(&eval(&mut ctx, &year)), vec!["1974"]);
}

#[test]
fn test_descendants_reach_nested_values() {
    let mut ctx = context(&patient_json());
    let expr = Expr::This
        .call("descendants", vec![])
        .call("ofType", vec![Expr::member("HumanName")])
        .call("count", vec![]);
    let count = eval(&mut ctx, &expr);
    assert_eq!(count.first().and_then(|n| n.system_value()).and_then(|v| v.as_integer()), Some(2));
}
