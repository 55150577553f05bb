//! Math functions.
//!
//! Transcendental functions go through `f64` and back, so results carry
//! floating-point precision. Results that cannot be represented are empty.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::value::SystemValue;

use super::{empty, integer_arg, value_input};

fn numeric(value: &SystemValue, function: &str) -> Result<Decimal> {
    value.as_decimal().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "{}: expected a number, found {}",
            function,
            value.type_()
        ))
    })
}

fn result(value: SystemValue) -> Result<Collection> {
    Ok(Collection::from_value(value))
}

/// `f64` result back to a decimal; non-finite values are empty.
fn from_f64(value: f64) -> Result<Collection> {
    if !value.is_finite() {
        return empty();
    }
    match Decimal::from_str(&value.to_string()).or_else(|_| Decimal::try_from(value)) {
        Ok(d) => result(SystemValue::decimal(d)),
        Err(_) => empty(),
    }
}

fn unary_f64(input: &Collection, function: &str, f: impl FnOnce(f64) -> f64) -> Result<Collection> {
    let Some(value) = value_input(input, function)? else {
        return empty();
    };
    let Some(x) = numeric(&value, function)?.to_f64() else {
        return empty();
    };
    from_f64(f(x))
}

pub fn abs(input: &Collection) -> Result<Collection> {
    let Some(value) = value_input(input, "abs")? else {
        return empty();
    };
    match value {
        SystemValue::Integer(i) => match i.checked_abs() {
            Some(abs) => result(SystemValue::integer(abs)),
            None => empty(),
        },
        SystemValue::Decimal(d) => result(SystemValue::decimal(d.abs())),
        SystemValue::Quantity(mut q) => {
            q.value = q.value.abs();
            result(SystemValue::quantity(q))
        }
        other => Err(Error::InvalidArgument(format!(
            "abs: expected a number, found {}",
            other.type_()
        ))),
    }
}

/// Shared body of ceiling/floor/truncate: integers pass through, decimals
/// become integers.
fn to_whole(input: &Collection, function: &str, f: impl FnOnce(Decimal) -> Decimal) -> Result<Collection> {
    let Some(value) = value_input(input, function)? else {
        return empty();
    };
    if let SystemValue::Integer(_) = value {
        return result(value);
    }
    match f(numeric(&value, function)?).to_i64() {
        Some(i) => result(SystemValue::integer(i)),
        None => empty(),
    }
}

pub fn ceiling(input: &Collection) -> Result<Collection> {
    to_whole(input, "ceiling", |d| d.ceil())
}

pub fn floor(input: &Collection) -> Result<Collection> {
    to_whole(input, "floor", |d| d.floor())
}

pub fn truncate(input: &Collection) -> Result<Collection> {
    to_whole(input, "truncate", |d| d.trunc())
}

pub fn round(input: &Collection, precision: Option<&Collection>) -> Result<Collection> {
    let Some(value) = value_input(input, "round")? else {
        return empty();
    };
    let d = numeric(&value, "round")?;
    let precision = match precision {
        Some(arg) => match integer_arg(arg, "round")? {
            Some(p) => u32::try_from(p)
                .map_err(|_| Error::InvalidArgument("round: precision must be non-negative".into()))?,
            None => return empty(),
        },
        None => 0,
    };
    result(SystemValue::decimal(
        d.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero),
    ))
}

pub fn exp(input: &Collection) -> Result<Collection> {
    unary_f64(input, "exp", f64::exp)
}

pub fn ln(input: &Collection) -> Result<Collection> {
    unary_f64(input, "ln", f64::ln)
}

pub fn sqrt(input: &Collection) -> Result<Collection> {
    unary_f64(input, "sqrt", f64::sqrt)
}

pub fn log(input: &Collection, base: &Collection) -> Result<Collection> {
    let Some(base) = value_input(base, "log")? else {
        return empty();
    };
    let Some(base) = numeric(&base, "log")?.to_f64() else {
        return empty();
    };
    unary_f64(input, "log", |x| x.ln() / base.ln())
}

/// Integer to a non-negative integer power stays an integer.
pub fn power(input: &Collection, exponent: &Collection) -> Result<Collection> {
    let (Some(value), Some(exponent)) = (value_input(input, "power")?, value_input(exponent, "power")?) else {
        return empty();
    };
    let base = numeric(&value, "power")?;
    let exp = numeric(&exponent, "power")?;

    if let (SystemValue::Integer(b), SystemValue::Integer(e)) = (&value, &exponent) {
        if let Ok(e) = u32::try_from(*e) {
            return match b.checked_pow(e) {
                Some(p) => result(SystemValue::integer(p)),
                None => empty(),
            };
        }
    }
    match (base.to_f64(), exp.to_f64()) {
        (Some(b), Some(e)) => from_f64(b.powf(e)),
        _ => empty(),
    }
}
