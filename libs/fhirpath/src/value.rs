//! System values: the terminal scalars of FHIRPath
//!
//! Integers promote to decimals exactly (`Decimal::from(i64)`, no floating
//! point). Division always yields a decimal. Quantities are comparable only
//! when they share system and code, or when their unit strings are equal.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime,
    Timelike, Utc,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Error, Result};
use crate::types::FhirPathType;

pub const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DateTimePrecision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimePrecision {
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl From<DatePrecision> for DateTimePrecision {
    fn from(precision: DatePrecision) -> Self {
        match precision {
            DatePrecision::Year => DateTimePrecision::Year,
            DatePrecision::Month => DateTimePrecision::Month,
            DatePrecision::Day => DateTimePrecision::Day,
        }
    }
}

/// A quantity: decimal magnitude with optional unit, system and code.
#[derive(Debug, Clone)]
pub struct QuantityValue {
    pub value: Decimal,
    pub unit: Option<Arc<str>>,
    pub system: Option<Arc<str>>,
    pub code: Option<Arc<str>>,
}

impl QuantityValue {
    /// A UCUM quantity whose unit doubles as its code.
    pub fn ucum(value: Decimal, unit: &str) -> Self {
        Self {
            value,
            unit: Some(unit.into()),
            system: Some(UCUM_SYSTEM.into()),
            code: Some(unit.into()),
        }
    }

    /// A quantity with a free-text unit.
    pub fn with_unit(value: Decimal, unit: Option<&str>) -> Self {
        Self {
            value,
            unit: unit.map(Into::into),
            system: None,
            code: None,
        }
    }

    pub fn is_comparable_to(&self, other: &QuantityValue) -> bool {
        let coded = self.system.is_some()
            && self.code.is_some()
            && self.system == other.system
            && self.code == other.code;
        coded || (self.unit.is_some() && self.unit == other.unit)
            || (self.unit.is_none() && self.code.is_none() && other.unit.is_none() && other.code.is_none())
    }

    fn unit_key(&self) -> Option<&str> {
        self.code.as_deref().or(self.unit.as_deref())
    }

    fn with_value(&self, value: Decimal) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }
}

impl fmt::Display for QuantityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit.as_deref().or(self.code.as_deref()) {
            Some(unit) => write!(f, "{} '{}'", self.value.normalize(), unit),
            None => write!(f, "{}", self.value.normalize()),
        }
    }
}

/// A FHIRPath System value.
#[derive(Debug, Clone)]
pub enum SystemValue {
    Boolean(bool),
    String(Arc<str>),
    Integer(i64),
    Decimal(Decimal),
    Date {
        value: NaiveDate,
        precision: DatePrecision,
    },
    DateTime {
        value: DateTime<Utc>,
        precision: DateTimePrecision,
        offset: Option<i32>,
    },
    Time {
        value: NaiveTime,
        precision: TimePrecision,
    },
    Quantity(QuantityValue),
}

/// Calendar units accepted in temporal arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CalendarUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

static CALENDAR_UNITS: phf::Map<&'static str, CalendarUnit> = phf::phf_map! {
    "year" => CalendarUnit::Year,
    "years" => CalendarUnit::Year,
    "a" => CalendarUnit::Year,
    "month" => CalendarUnit::Month,
    "months" => CalendarUnit::Month,
    "mo" => CalendarUnit::Month,
    "week" => CalendarUnit::Week,
    "weeks" => CalendarUnit::Week,
    "wk" => CalendarUnit::Week,
    "day" => CalendarUnit::Day,
    "days" => CalendarUnit::Day,
    "d" => CalendarUnit::Day,
    "hour" => CalendarUnit::Hour,
    "hours" => CalendarUnit::Hour,
    "h" => CalendarUnit::Hour,
    "minute" => CalendarUnit::Minute,
    "minutes" => CalendarUnit::Minute,
    "min" => CalendarUnit::Minute,
    "second" => CalendarUnit::Second,
    "seconds" => CalendarUnit::Second,
    "s" => CalendarUnit::Second,
    "millisecond" => CalendarUnit::Millisecond,
    "milliseconds" => CalendarUnit::Millisecond,
    "ms" => CalendarUnit::Millisecond,
};

impl SystemValue {
    pub fn boolean(value: bool) -> Self {
        SystemValue::Boolean(value)
    }

    pub fn string(value: impl Into<Arc<str>>) -> Self {
        SystemValue::String(value.into())
    }

    pub fn integer(value: i64) -> Self {
        SystemValue::Integer(value)
    }

    pub fn decimal(value: Decimal) -> Self {
        SystemValue::Decimal(value)
    }

    pub fn date(value: NaiveDate, precision: DatePrecision) -> Self {
        SystemValue::Date { value, precision }
    }

    pub fn datetime(value: DateTime<Utc>, precision: DateTimePrecision, offset: Option<i32>) -> Self {
        SystemValue::DateTime {
            value,
            precision,
            offset,
        }
    }

    pub fn time(value: NaiveTime, precision: TimePrecision) -> Self {
        SystemValue::Time { value, precision }
    }

    pub fn quantity(quantity: QuantityValue) -> Self {
        SystemValue::Quantity(quantity)
    }

    /// The System type of this value.
    pub fn type_(&self) -> FhirPathType {
        match self {
            SystemValue::Boolean(_) => FhirPathType::SystemBoolean,
            SystemValue::String(_) => FhirPathType::SystemString,
            SystemValue::Integer(_) => FhirPathType::SystemInteger,
            SystemValue::Decimal(_) => FhirPathType::SystemDecimal,
            SystemValue::Date { .. } => FhirPathType::SystemDate,
            SystemValue::DateTime { .. } => FhirPathType::SystemDateTime,
            SystemValue::Time { .. } => FhirPathType::SystemTime,
            SystemValue::Quantity(_) => FhirPathType::SystemQuantity,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            SystemValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SystemValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SystemValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, promoting integers.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SystemValue::Integer(i) => Some(Decimal::from(*i)),
            SystemValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<&QuantityValue> {
        match self {
            SystemValue::Quantity(q) => Some(q),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SystemValue::Integer(_) | SystemValue::Decimal(_))
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            SystemValue::Date { .. } | SystemValue::DateTime { .. } | SystemValue::Time { .. }
        )
    }

    // Arithmetic

    /// `+` on numbers, strings, quantities and temporal ± quantity.
    ///
    /// `Ok(None)` means the result is empty (overflow, incompatible units).
    pub fn add(&self, other: &SystemValue) -> Result<Option<SystemValue>> {
        use SystemValue::*;
        Ok(match (self, other) {
            (Integer(a), Integer(b)) => a.checked_add(*b).map(Integer),
            (String(a), String(b)) => Some(String(format!("{}{}", a, b).into())),
            (Quantity(a), Quantity(b)) => {
                if !a.is_comparable_to(b) {
                    return Ok(None);
                }
                a.value.checked_add(b.value).map(|v| Quantity(a.with_value(v)))
            }
            (Date { .. } | DateTime { .. } | Time { .. }, Quantity(q)) => self.add_duration(q, 1),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                numeric_op(a, b, |x, y| x.checked_add(y))
            }
            _ => return Err(incompatible("+", self, other)),
        })
    }

    pub fn subtract(&self, other: &SystemValue) -> Result<Option<SystemValue>> {
        use SystemValue::*;
        Ok(match (self, other) {
            (Integer(a), Integer(b)) => a.checked_sub(*b).map(Integer),
            (Quantity(a), Quantity(b)) => {
                if !a.is_comparable_to(b) {
                    return Ok(None);
                }
                a.value.checked_sub(b.value).map(|v| Quantity(a.with_value(v)))
            }
            (Date { .. } | DateTime { .. } | Time { .. }, Quantity(q)) => self.add_duration(q, -1),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                numeric_op(a, b, |x, y| x.checked_sub(y))
            }
            _ => return Err(incompatible("-", self, other)),
        })
    }

    pub fn multiply(&self, other: &SystemValue) -> Result<Option<SystemValue>> {
        use SystemValue::*;
        Ok(match (self, other) {
            (Integer(a), Integer(b)) => a.checked_mul(*b).map(Integer),
            (Quantity(q), n) | (n, Quantity(q)) if n.is_numeric() => n
                .as_decimal()
                .and_then(|n| q.value.checked_mul(n))
                .map(|v| Quantity(q.with_value(v))),
            (Quantity(_), Quantity(_)) => None,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                numeric_op(a, b, |x, y| x.checked_mul(y))
            }
            _ => return Err(incompatible("*", self, other)),
        })
    }

    /// `/` always produces a decimal; division by zero is empty.
    pub fn divide(&self, other: &SystemValue) -> Result<Option<SystemValue>> {
        use SystemValue::*;
        Ok(match (self, other) {
            (Quantity(q), n) if n.is_numeric() => n
                .as_decimal()
                .and_then(|n| q.value.checked_div(n))
                .map(|v| Quantity(q.with_value(v))),
            (Quantity(a), Quantity(b)) => {
                if !a.is_comparable_to(b) {
                    return Ok(None);
                }
                a.value.checked_div(b.value).map(|v| {
                    Quantity(QuantityValue::ucum(v.normalize(), "1"))
                })
            }
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) else {
                    return Ok(None);
                };
                x.checked_div(y).map(|d| SystemValue::Decimal(d.normalize()))
            }
            _ => return Err(incompatible("/", self, other)),
        })
    }

    /// Truncated division; integer result.
    pub fn div(&self, other: &SystemValue) -> Result<Option<SystemValue>> {
        use SystemValue::*;
        Ok(match (self, other) {
            (Integer(_), Integer(0)) => None,
            (Integer(a), Integer(b)) => a.checked_div(*b).map(Integer),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) else {
                    return Ok(None);
                };
                x.checked_div(y)
                    .and_then(|d| d.trunc().to_i64())
                    .map(Integer)
            }
            _ => return Err(incompatible("div", self, other)),
        })
    }

    pub fn modulo(&self, other: &SystemValue) -> Result<Option<SystemValue>> {
        use SystemValue::*;
        Ok(match (self, other) {
            (Integer(_), Integer(0)) => None,
            (Integer(a), Integer(b)) => a.checked_rem(*b).map(Integer),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                numeric_op(a, b, |x, y| x.checked_rem(y))
            }
            _ => return Err(incompatible("mod", self, other)),
        })
    }

    /// Unary minus; `None` for non-numeric values.
    pub fn negate(&self) -> Option<SystemValue> {
        match self {
            SystemValue::Integer(i) => i.checked_neg().map(SystemValue::Integer),
            SystemValue::Decimal(d) => Some(SystemValue::Decimal(-*d)),
            SystemValue::Quantity(q) => Some(SystemValue::Quantity(q.with_value(-q.value))),
            _ => None,
        }
    }

    fn add_duration(&self, quantity: &QuantityValue, sign: i64) -> Option<SystemValue> {
        let unit = CALENDAR_UNITS.get(quantity.unit_key()?)?;
        let amount = quantity.value * Decimal::from(sign);

        match self {
            SystemValue::Date { value, precision } => {
                let whole = amount.trunc().to_i64()?;
                let shifted = match unit {
                    CalendarUnit::Year => shift_months(*value, whole.checked_mul(12)?)?,
                    CalendarUnit::Month => shift_months(*value, whole)?,
                    CalendarUnit::Week => value.checked_add_signed(Duration::try_weeks(whole)?)?,
                    CalendarUnit::Day => value.checked_add_signed(Duration::try_days(whole)?)?,
                    CalendarUnit::Hour => {
                        value.checked_add_signed(Duration::try_days(whole / 24)?)?
                    }
                    CalendarUnit::Minute | CalendarUnit::Second | CalendarUnit::Millisecond => {
                        *value
                    }
                };
                Some(SystemValue::date(shifted, *precision))
            }
            SystemValue::DateTime {
                value,
                precision,
                offset,
            } => {
                let shifted = match unit {
                    CalendarUnit::Year | CalendarUnit::Month => {
                        let months = amount.trunc().to_i64()?;
                        let months = if *unit == CalendarUnit::Year {
                            months.checked_mul(12)?
                        } else {
                            months
                        };
                        let naive = value.naive_utc();
                        let date = shift_months(naive.date(), months)?;
                        DateTime::<Utc>::from_naive_utc_and_offset(
                            NaiveDateTime::new(date, naive.time()),
                            Utc,
                        )
                    }
                    _ => value.checked_add_signed(duration_of(*unit, amount)?)?,
                };
                Some(SystemValue::datetime(shifted, *precision, *offset))
            }
            SystemValue::Time { value, precision } => match unit {
                CalendarUnit::Year | CalendarUnit::Month | CalendarUnit::Week | CalendarUnit::Day => {
                    None
                }
                _ => {
                    let (shifted, _) = value.overflowing_add_signed(duration_of(*unit, amount)?);
                    Some(SystemValue::time(shifted, *precision))
                }
            },
            _ => None,
        }
    }

    // Comparison

    pub fn is_comparable_to(&self, other: &SystemValue) -> bool {
        use SystemValue::*;
        match (self, other) {
            (a, b) if a.is_numeric() && b.is_numeric() => true,
            (Boolean(_), Boolean(_)) | (String(_), String(_)) => true,
            (Date { .. } | DateTime { .. }, Date { .. } | DateTime { .. }) => true,
            (Time { .. }, Time { .. }) => true,
            (Quantity(a), Quantity(b)) => a.is_comparable_to(b),
            _ => false,
        }
    }

    /// Ordering of two comparable values.
    ///
    /// `Ok(None)` when temporal precisions differ and the order cannot be
    /// decided at the common precision. Fails when the values are not
    /// comparable at all.
    pub fn compare_to(&self, other: &SystemValue) -> Result<Option<Ordering>> {
        use SystemValue::*;
        if !self.is_comparable_to(other) {
            return Err(Error::InvalidArgument(format!(
                "{} is not comparable to {}",
                self.type_(),
                other.type_()
            )));
        }
        Ok(match (self, other) {
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Quantity(a), Quantity(b)) => Some(a.value.cmp(&b.value)),
            (Time { value: a, precision: pa }, Time { value: b, precision: pb }) => {
                compare_components(&time_components(a), &time_components(b), *pa as usize, *pb as usize)
            }
            (a, b) if a.is_numeric() => a.as_decimal().zip(b.as_decimal()).map(|(x, y)| x.cmp(&y)),
            (a, b) => match (datetime_components(a), datetime_components(b)) {
                (Some((ca, pa)), Some((cb, pb))) => compare_components(&ca, &cb, pa as usize, pb as usize),
                _ => None,
            },
        })
    }

    /// FHIRPath `=`: `None` when undecidable because of precision.
    pub fn equals(&self, other: &SystemValue) -> Option<bool> {
        if !self.is_comparable_to(other) {
            return Some(false);
        }
        self.compare_to(other)
            .ok()
            .flatten()
            .map(|o| o == Ordering::Equal)
    }

    /// FHIRPath `~`: case- and whitespace-insensitive strings, decimals at the
    /// lesser precision, undecidable temporal comparisons are `false`.
    pub fn equivalent(&self, other: &SystemValue) -> bool {
        match (self, other) {
            (SystemValue::String(a), SystemValue::String(b)) => {
                normalize_whitespace(a).to_lowercase() == normalize_whitespace(b).to_lowercase()
            }
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) else {
                    return false;
                };
                let scale = x.scale().min(y.scale());
                round_to(x, scale) == round_to(y, scale)
            }
            _ => self.equals(other).unwrap_or(false),
        }
    }

    /// Render as FHIRPath `toString()` would.
    pub fn to_fhirpath_string(&self) -> String {
        match self {
            SystemValue::Boolean(b) => b.to_string(),
            SystemValue::String(s) => s.to_string(),
            SystemValue::Integer(i) => i.to_string(),
            SystemValue::Decimal(d) => d.to_string(),
            SystemValue::Date { value, precision } => format_date(*value, *precision),
            SystemValue::DateTime {
                value,
                precision,
                offset,
            } => format_datetime(value, *precision, *offset),
            SystemValue::Time { value, precision } => format_time(*value, *precision),
            SystemValue::Quantity(q) => q.to_string(),
        }
    }
}

fn incompatible(op: &str, left: &SystemValue, right: &SystemValue) -> Error {
    Error::InvalidArgument(format!(
        "Operator '{}' cannot be applied to {} and {}",
        op,
        left.type_(),
        right.type_()
    ))
}

fn numeric_op(
    left: &SystemValue,
    right: &SystemValue,
    op: impl FnOnce(Decimal, Decimal) -> Option<Decimal>,
) -> Option<SystemValue> {
    let (x, y) = (left.as_decimal()?, right.as_decimal()?);
    op(x, y).map(SystemValue::Decimal)
}

fn shift_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

fn duration_of(unit: CalendarUnit, amount: Decimal) -> Option<Duration> {
    let millis_per_unit: i64 = match unit {
        CalendarUnit::Week => 7 * 24 * 3_600_000,
        CalendarUnit::Day => 24 * 3_600_000,
        CalendarUnit::Hour => 3_600_000,
        CalendarUnit::Minute => 60_000,
        CalendarUnit::Second => 1_000,
        CalendarUnit::Millisecond => 1,
        CalendarUnit::Year | CalendarUnit::Month => return None,
    };
    let millis = amount.checked_mul(Decimal::from(millis_per_unit))?.trunc();
    Duration::try_milliseconds(millis.to_i64()?)
}

fn time_components(t: &NaiveTime) -> [u32; 4] {
    [t.hour(), t.minute(), t.second(), t.nanosecond() / 1_000_000]
}

fn datetime_components(value: &SystemValue) -> Option<([u32; 7], DateTimePrecision)> {
    match value {
        SystemValue::Date { value, precision } => Some((
            [value.year() as u32, value.month(), value.day(), 0, 0, 0, 0],
            (*precision).into(),
        )),
        SystemValue::DateTime {
            value, precision, ..
        } => Some((
            [
                value.year() as u32,
                value.month(),
                value.day(),
                value.hour(),
                value.minute(),
                value.second(),
                value.timestamp_subsec_millis(),
            ],
            *precision,
        )),
        _ => None,
    }
}

/// Compare component-wise up to the lesser precision (an index into the
/// component arrays); differing precisions with equal prefixes are undecidable.
fn compare_components(a: &[u32], b: &[u32], pa: usize, pb: usize) -> Option<Ordering> {
    let common = pa.min(pb);
    for i in 0..=common {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    if pa == pb {
        Some(Ordering::Equal)
    } else {
        None
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn round_to(d: Decimal, scale: u32) -> Decimal {
    d.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

fn format_date(d: NaiveDate, precision: DatePrecision) -> String {
    match precision {
        DatePrecision::Year => d.format("%Y").to_string(),
        DatePrecision::Month => d.format("%Y-%m").to_string(),
        DatePrecision::Day => d.format("%Y-%m-%d").to_string(),
    }
}

fn format_time(t: NaiveTime, precision: TimePrecision) -> String {
    match precision {
        TimePrecision::Hour => t.format("%H").to_string(),
        TimePrecision::Minute => t.format("%H:%M").to_string(),
        TimePrecision::Second => t.format("%H:%M:%S").to_string(),
        TimePrecision::Millisecond => format!(
            "{}.{:03}",
            t.format("%H:%M:%S"),
            t.nanosecond() / 1_000_000
        ),
    }
}

/// Format a timezone suffix for a fixed offset (seconds east of UTC).
fn format_timezone_suffix(offset_secs: i32) -> String {
    if offset_secs == 0 {
        return "Z".to_string();
    }
    let sign = if offset_secs < 0 { '-' } else { '+' };
    let abs = offset_secs.abs();
    format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

fn format_datetime(dt: &DateTime<Utc>, precision: DateTimePrecision, offset: Option<i32>) -> String {
    let local = offset
        .and_then(FixedOffset::east_opt)
        .map(|o| dt.with_timezone(&o).naive_local())
        .unwrap_or_else(|| dt.naive_utc());
    let body = match precision {
        DateTimePrecision::Year => return local.format("%Y").to_string(),
        DateTimePrecision::Month => return local.format("%Y-%m").to_string(),
        DateTimePrecision::Day => return local.format("%Y-%m-%d").to_string(),
        DateTimePrecision::Hour => local.format("%Y-%m-%dT%H").to_string(),
        DateTimePrecision::Minute => local.format("%Y-%m-%dT%H:%M").to_string(),
        DateTimePrecision::Second => local.format("%Y-%m-%dT%H:%M:%S").to_string(),
        DateTimePrecision::Millisecond => format!(
            "{}.{:03}",
            local.format("%Y-%m-%dT%H:%M:%S"),
            local.and_utc().timestamp_subsec_millis()
        ),
    };
    match offset {
        Some(secs) => format!("{}{}", body, format_timezone_suffix(secs)),
        None => body,
    }
}

impl PartialEq for SystemValue {
    fn eq(&self, other: &Self) -> bool {
        use SystemValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => a == b,
            (String(a), String(b)) => a == b,
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_decimal() == b.as_decimal(),
            (Date { value: a, precision: pa }, Date { value: b, precision: pb }) => {
                a == b && pa == pb
            }
            (
                DateTime { value: a, precision: pa, .. },
                DateTime { value: b, precision: pb, .. },
            ) => a == b && pa == pb,
            (Time { value: a, precision: pa }, Time { value: b, precision: pb }) => {
                a == b && pa == pb
            }
            (Quantity(a), Quantity(b)) => a.value == b.value && a.unit_key() == b.unit_key(),
            _ => false,
        }
    }
}

impl Eq for SystemValue {}

impl Hash for SystemValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            SystemValue::Boolean(b) => b.hash(state),
            SystemValue::String(s) => s.hash(state),
            SystemValue::Integer(_) | SystemValue::Decimal(_) => {
                self.as_decimal().map(|d| d.normalize()).hash(state)
            }
            SystemValue::Date { value, precision } => (value, precision).hash(state),
            SystemValue::DateTime {
                value, precision, ..
            } => (value, precision).hash(state),
            SystemValue::Time { value, precision } => (value, precision).hash(state),
            SystemValue::Quantity(q) => (q.value.normalize(), q.unit_key()).hash(state),
        }
    }
}

impl fmt::Display for SystemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_fhirpath_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_integer_decimal_promotion() {
        let sum = SystemValue::integer(3)
            .add(&SystemValue::decimal(dec("0.5")))
            .unwrap()
            .unwrap();
        assert_eq!(sum, SystemValue::decimal(dec("3.5")));
        assert_eq!(sum.type_(), FhirPathType::SystemDecimal);
    }

    #[test]
    fn test_division_always_promotes() {
        let q = SystemValue::integer(7)
            .divide(&SystemValue::integer(2))
            .unwrap()
            .unwrap();
        assert!(matches!(q, SystemValue::Decimal(_)));
        assert_eq!(q, SystemValue::decimal(dec("3.5")));

        let d = SystemValue::integer(7)
            .div(&SystemValue::integer(2))
            .unwrap()
            .unwrap();
        assert!(matches!(d, SystemValue::Integer(3)));
    }

    #[test]
    fn test_divide_by_zero_is_empty() {
        let one = SystemValue::integer(1);
        let zero = SystemValue::integer(0);
        assert_eq!(one.divide(&zero).unwrap(), None);
        assert_eq!(one.div(&zero).unwrap(), None);
        assert_eq!(one.modulo(&zero).unwrap(), None);
    }

    #[test]
    fn test_incompatible_operands_fail() {
        let err = SystemValue::boolean(true)
            .add(&SystemValue::integer(1))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_quantity_comparability() {
        let mg = SystemValue::quantity(QuantityValue::ucum(dec("5"), "mg"));
        let mg2 = SystemValue::quantity(QuantityValue::with_unit(dec("7"), Some("mg")));
        let kg = SystemValue::quantity(QuantityValue::ucum(dec("5"), "kg"));

        assert!(mg.is_comparable_to(&mg2));
        assert_eq!(mg.compare_to(&mg2).unwrap(), Some(Ordering::Less));
        assert!(!mg.is_comparable_to(&kg));
        assert!(mg.compare_to(&kg).is_err());
        assert_eq!(mg.add(&kg).unwrap(), None);
    }

    #[test]
    fn test_temporal_precision_comparison() {
        let year = SystemValue::date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), DatePrecision::Year);
        let day = SystemValue::date(NaiveDate::from_ymd_opt(2020, 3, 4).unwrap(), DatePrecision::Day);
        let later = SystemValue::date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), DatePrecision::Day);

        assert_eq!(year.compare_to(&day).unwrap(), None);
        assert_eq!(year.equals(&day), None);
        assert_eq!(day.compare_to(&later).unwrap(), Some(Ordering::Less));
        assert!(!year.equivalent(&day));
    }

    #[test]
    fn test_date_plus_calendar_quantity() {
        let date = SystemValue::date(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(), DatePrecision::Day);
        let month = SystemValue::quantity(QuantityValue::with_unit(dec("1"), Some("month")));
        let shifted = date.add(&month).unwrap().unwrap();
        assert_eq!(shifted.to_fhirpath_string(), "2020-02-29");

        let weeks = SystemValue::quantity(QuantityValue::ucum(dec("2"), "wk"));
        let back = date.subtract(&weeks).unwrap().unwrap();
        assert_eq!(back.to_fhirpath_string(), "2020-01-17");
    }

    #[test]
    fn test_string_equivalence() {
        let a = SystemValue::string("Hello   World");
        let b = SystemValue::string("hello world");
        assert!(a.equivalent(&b));
        assert_eq!(a.equals(&b), Some(false));
    }

    #[test]
    fn test_numeric_equality_and_hash_agree() {
        use std::collections::hash_map::DefaultHasher;
        let hash = |v: &SystemValue| {
            let mut h = DefaultHasher::new();
            v.hash(&mut h);
            h.finish()
        };
        let i = SystemValue::integer(1);
        let d = SystemValue::decimal(dec("1.0"));
        assert_eq!(i, d);
        assert_eq!(hash(&i), hash(&d));
    }
}
