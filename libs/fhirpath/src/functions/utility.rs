//! Utility functions: the clock and reflection.
//!
//! `trace()` needs its projection unevaluated and lives in the evaluator.

use std::collections::HashSet;

use chrono::{Local, Timelike, Utc};

use crate::collection::Collection;
use crate::error::Result;
use crate::node::{Node, TypeInfo, TypeInfoElement};
use crate::types::FhirPathType;
use crate::value::{DatePrecision, DateTimePrecision, SystemValue, TimePrecision};

pub fn now() -> Result<Collection> {
    let local = Local::now();
    let offset = local.offset().local_minus_utc();
    Ok(Collection::from_value(SystemValue::datetime(
        local.with_timezone(&Utc),
        DateTimePrecision::Millisecond,
        Some(offset),
    )))
}

pub fn today() -> Result<Collection> {
    Ok(Collection::from_value(SystemValue::date(
        Local::now().date_naive(),
        DatePrecision::Day,
    )))
}

pub fn time_of_day() -> Result<Collection> {
    let time = Local::now().time();
    let millis = time.with_nanosecond(time.nanosecond() / 1_000_000 * 1_000_000).unwrap_or(time);
    Ok(Collection::from_value(SystemValue::time(millis, TimePrecision::Millisecond)))
}

pub fn type_function(input: &Collection) -> Result<Collection> {
    Ok(input.iter().map(|node| Node::type_info(type_info_of(node))).collect())
}

/// Reflective descriptor of a node: simple for System values, a tuple for
/// anonymous backbone elements, a class for everything else.
pub fn type_info_of(node: &Node) -> TypeInfo {
    if node.is_system_value() {
        return TypeInfo::simple(node.type_());
    }
    if node.type_() == FhirPathType::BackboneElement {
        let mut seen = HashSet::new();
        let elements = node
            .children()
            .iter()
            .filter_map(|child| {
                let name = child.name()?;
                seen.insert(name.to_string()).then(|| TypeInfoElement {
                    name: name.to_string(),
                    type_: child.type_().qualified_name(),
                    is_one_based: false,
                })
            })
            .collect();
        return TypeInfo::Tuple { elements };
    }
    TypeInfo::class(node.type_())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::FhirPathTree;
    use serde_json::json;

    #[test]
    fn test_type_descriptors() {
        let simple = type_info_of(&Node::integer(1));
        assert!(matches!(&simple, TypeInfo::Simple { name, .. } if name == "Integer"));

        let tree = FhirPathTree::from_json(&json!({
            "resourceType": "Patient",
            "contact": [{ "gender": "male" }]
        }))
        .unwrap();
        let root = tree.get_root();
        assert!(matches!(type_info_of(root), TypeInfo::Class { name, .. } if name == "Patient"));

        let contact = root.child("contact").unwrap();
        let TypeInfo::Tuple { elements } = type_info_of(contact) else {
            panic!("expected a tuple descriptor");
        };
        assert_eq!(elements[0].name, "gender");
        assert_eq!(elements[0].type_, "FHIR.code");
    }

    #[test]
    fn test_clock_precisions() {
        let now = now().unwrap();
        assert!(matches!(
            now.first().and_then(Node::system_value),
            Some(SystemValue::DateTime { precision: DateTimePrecision::Millisecond, .. })
        ));
        assert!(matches!(
            today().unwrap().first().and_then(Node::system_value),
            Some(SystemValue::Date { precision: DatePrecision::Day, .. })
        ));
    }
}
