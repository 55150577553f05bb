//! Conversion functions.
//!
//! Each `toX()` yields empty when the single input item cannot be converted;
//! the matching `convertsToX()` reports whether it could. Both yield empty
//! for empty input.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::collection::Collection;
use crate::error::Result;
use crate::temporal_parse::{parse_date_value, parse_datetime_value, parse_time_value};
use crate::value::{QuantityValue, SystemValue};

use super::{boolean, empty, string_arg, value_input};

fn convert(
    input: &Collection,
    function: &str,
    conversion: impl FnOnce(&SystemValue) -> Option<SystemValue>,
) -> Result<Collection> {
    Ok(value_input(input, function)?
        .as_ref()
        .and_then(conversion)
        .map(Collection::from_value)
        .unwrap_or_default())
}

fn converts(
    input: &Collection,
    function: &str,
    conversion: impl FnOnce(&SystemValue) -> Option<SystemValue>,
) -> Result<Collection> {
    let Some(node) = input.singleton_item(function)? else {
        return empty();
    };
    boolean(node.system_value().as_ref().and_then(conversion).is_some())
}

fn as_boolean(value: &SystemValue) -> Option<SystemValue> {
    let b = match value {
        SystemValue::Boolean(b) => *b,
        SystemValue::Integer(1) => true,
        SystemValue::Integer(0) => false,
        SystemValue::Decimal(d) if *d == Decimal::ONE => true,
        SystemValue::Decimal(d) if d.is_zero() => false,
        SystemValue::String(s) => match s.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "1.0" => true,
            "false" | "f" | "no" | "n" | "0" | "0.0" => false,
            _ => return None,
        },
        _ => return None,
    };
    Some(SystemValue::boolean(b))
}

fn as_integer(value: &SystemValue) -> Option<SystemValue> {
    match value {
        SystemValue::Integer(_) => Some(value.clone()),
        SystemValue::Boolean(b) => Some(SystemValue::integer(i64::from(*b))),
        SystemValue::String(s) => {
            let trimmed = s.strip_prefix('+').unwrap_or(s);
            if trimmed.is_empty() || !trimmed.trim_start_matches('-').chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            s.parse::<i64>().ok().map(SystemValue::integer)
        }
        _ => None,
    }
}

fn as_decimal(value: &SystemValue) -> Option<SystemValue> {
    match value {
        SystemValue::Integer(_) | SystemValue::Decimal(_) => value.as_decimal().map(SystemValue::decimal),
        SystemValue::Boolean(b) => Some(SystemValue::decimal(if *b { Decimal::ONE } else { Decimal::ZERO })),
        SystemValue::String(s) => {
            if s.contains(|c: char| c == 'e' || c == 'E') {
                return None;
            }
            Decimal::from_str(s).ok().map(SystemValue::decimal)
        }
        _ => None,
    }
}

fn as_string(value: &SystemValue) -> Option<SystemValue> {
    Some(SystemValue::string(value.to_fhirpath_string()))
}

fn as_date(value: &SystemValue) -> Option<SystemValue> {
    match value {
        SystemValue::Date { .. } => Some(value.clone()),
        SystemValue::DateTime { .. } => {
            let rendered = value.to_fhirpath_string();
            parse_date_value(rendered.split('T').next().unwrap_or_default())
        }
        SystemValue::String(s) => parse_date_value(s),
        _ => None,
    }
}

fn as_datetime(value: &SystemValue) -> Option<SystemValue> {
    match value {
        SystemValue::DateTime { .. } => Some(value.clone()),
        SystemValue::Date { .. } => parse_datetime_value(&value.to_fhirpath_string()),
        SystemValue::String(s) => parse_datetime_value(s),
        _ => None,
    }
}

fn as_time(value: &SystemValue) -> Option<SystemValue> {
    match value {
        SystemValue::Time { .. } => Some(value.clone()),
        SystemValue::String(s) => parse_time_value(s),
        _ => None,
    }
}

fn quantity_pattern() -> &'static Regex {
    static QUANTITY: OnceLock<Regex> = OnceLock::new();
    QUANTITY.get_or_init(|| {
        Regex::new(r"^\s*(?P<value>[+-]?\d+(?:\.\d+)?)\s*(?:'(?P<unit>[^']+)'|(?P<word>[a-zA-Z]+))?\s*$")
            .expect("quantity pattern must compile")
    })
}

const CALENDAR_WORDS: &[&str] = &[
    "year", "years", "month", "months", "week", "weeks", "day", "days", "hour", "hours",
    "minute", "minutes", "second", "seconds", "millisecond", "milliseconds",
];

fn as_quantity(value: &SystemValue) -> Option<SystemValue> {
    let quantity = match value {
        SystemValue::Quantity(_) => return Some(value.clone()),
        SystemValue::Integer(_) | SystemValue::Decimal(_) => QuantityValue::ucum(value.as_decimal()?, "1"),
        SystemValue::Boolean(b) => {
            QuantityValue::ucum(if *b { Decimal::ONE } else { Decimal::ZERO }, "1")
        }
        SystemValue::String(s) => {
            let captures = quantity_pattern().captures(s)?;
            let magnitude = Decimal::from_str(captures.name("value")?.as_str()).ok()?;
            match (captures.name("unit"), captures.name("word")) {
                (Some(unit), _) => QuantityValue::ucum(magnitude, unit.as_str()),
                (None, Some(word)) if CALENDAR_WORDS.contains(&word.as_str()) => {
                    QuantityValue::with_unit(magnitude, Some(word.as_str()))
                }
                (None, Some(_)) => return None,
                (None, None) => QuantityValue::ucum(magnitude, "1"),
            }
        }
        _ => return None,
    };
    Some(SystemValue::quantity(quantity))
}

/// Quantity in the requested unit. Only identical units convert; there is no
/// unit arithmetic.
fn in_unit(value: Option<SystemValue>, unit: Option<&str>) -> Option<SystemValue> {
    let quantity = value?;
    let Some(unit) = unit else {
        return Some(quantity);
    };
    let q = quantity.as_quantity()?;
    let current = q.code.as_deref().or(q.unit.as_deref());
    (current == Some(unit)).then(|| quantity.clone())
}

pub fn to_boolean(input: &Collection) -> Result<Collection> {
    convert(input, "toBoolean", as_boolean)
}

pub fn converts_to_boolean(input: &Collection) -> Result<Collection> {
    converts(input, "convertsToBoolean", as_boolean)
}

pub fn to_integer(input: &Collection) -> Result<Collection> {
    convert(input, "toInteger", as_integer)
}

pub fn converts_to_integer(input: &Collection) -> Result<Collection> {
    converts(input, "convertsToInteger", as_integer)
}

pub fn to_decimal(input: &Collection) -> Result<Collection> {
    convert(input, "toDecimal", as_decimal)
}

pub fn converts_to_decimal(input: &Collection) -> Result<Collection> {
    converts(input, "convertsToDecimal", as_decimal)
}

pub fn to_string(input: &Collection) -> Result<Collection> {
    convert(input, "toString", as_string)
}

pub fn converts_to_string(input: &Collection) -> Result<Collection> {
    converts(input, "convertsToString", as_string)
}

pub fn to_date(input: &Collection) -> Result<Collection> {
    convert(input, "toDate", as_date)
}

pub fn converts_to_date(input: &Collection) -> Result<Collection> {
    converts(input, "convertsToDate", as_date)
}

pub fn to_datetime(input: &Collection) -> Result<Collection> {
    convert(input, "toDateTime", as_datetime)
}

pub fn converts_to_datetime(input: &Collection) -> Result<Collection> {
    converts(input, "convertsToDateTime", as_datetime)
}

pub fn to_time(input: &Collection) -> Result<Collection> {
    convert(input, "toTime", as_time)
}

pub fn converts_to_time(input: &Collection) -> Result<Collection> {
    converts(input, "convertsToTime", as_time)
}

pub fn to_quantity(input: &Collection, unit: Option<&Collection>) -> Result<Collection> {
    let unit = match unit {
        Some(arg) => string_arg(arg, "toQuantity")?,
        None => None,
    };
    convert(input, "toQuantity", |v| in_unit(as_quantity(v), unit.as_deref()))
}

pub fn converts_to_quantity(input: &Collection, unit: Option<&Collection>) -> Result<Collection> {
    let unit = match unit {
        Some(arg) => string_arg(arg, "convertsToQuantity")?,
        None => None,
    };
    converts(input, "convertsToQuantity", |v| in_unit(as_quantity(v), unit.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn s(value: &str) -> Collection {
        Collection::singleton(Node::string(value))
    }

    #[test]
    fn test_to_integer() {
        assert_eq!(to_integer(&s("42")).unwrap(), Collection::singleton(Node::integer(42)));
        assert_eq!(to_integer(&s("-7")).unwrap(), Collection::singleton(Node::integer(-7)));
        assert!(to_integer(&s("4.2")).unwrap().is_empty());
        assert_eq!(converts_to_integer(&s("x")).unwrap(), Collection::boolean(false));
        assert!(converts_to_integer(&Collection::empty()).unwrap().is_empty());
    }

    #[test]
    fn test_to_boolean() {
        assert_eq!(to_boolean(&s("yes")).unwrap(), Collection::boolean(true));
        assert_eq!(to_boolean(&Collection::singleton(Node::integer(0))).unwrap(), Collection::boolean(false));
        assert!(to_boolean(&Collection::singleton(Node::integer(2))).unwrap().is_empty());
    }

    #[test]
    fn test_to_quantity() {
        let q = to_quantity(&s("5.5 'mg'"), None).unwrap();
        let value = q.first().and_then(Node::system_value).unwrap();
        assert_eq!(value.to_fhirpath_string(), "5.5 'mg'");

        assert_eq!(to_quantity(&s("2 days"), None).unwrap().len(), 1);
        assert!(to_quantity(&s("2 parsecs"), None).unwrap().is_empty());
        assert!(to_quantity(&s("5 'mg'"), Some(&s("g"))).unwrap().is_empty());
        assert_eq!(converts_to_quantity(&s("5 'mg'"), Some(&s("mg"))).unwrap(), Collection::boolean(true));
    }

    #[test]
    fn test_temporal_conversions() {
        let dt = to_datetime(&s("2020-03-04T10:20:30Z")).unwrap();
        assert_eq!(dt.len(), 1);
        let date = to_date(&dt).unwrap();
        assert_eq!(date.first().and_then(Node::system_value).unwrap().to_fhirpath_string(), "2020-03-04");
        assert_eq!(converts_to_time(&s("10:20")).unwrap(), Collection::boolean(true));
        assert_eq!(converts_to_date(&s("2020-13")).unwrap(), Collection::boolean(false));
    }

    #[test]
    fn test_to_string() {
        assert_eq!(to_string(&Collection::singleton(Node::integer(3))).unwrap(), s("3"));
        assert_eq!(to_string(&Collection::boolean(true)).unwrap(), s("true"));
    }
}
