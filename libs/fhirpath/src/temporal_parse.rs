//! Lexical parsing of dates, dateTimes and times into [`SystemValue`]s.
//!
//! Accepts both FHIR JSON forms (`2020-01-02T10:00:00Z`) and FHIRPath literal
//! forms (`@2020-01-02T10:00`, `@T10:00`). Precision is taken from the number
//! of components present.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::value::{DatePrecision, DateTimePrecision, SystemValue, TimePrecision};

pub fn parse_date_value(input: &str) -> Option<SystemValue> {
    let s = input.trim().trim_start_matches('@');

    let (date, precision) = match s.len() {
        4 => (
            NaiveDate::parse_from_str(&format!("{}-01-01", s), "%Y-%m-%d").ok()?,
            DatePrecision::Year,
        ),
        7 => (
            NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok()?,
            DatePrecision::Month,
        ),
        10 => (
            NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?,
            DatePrecision::Day,
        ),
        _ => return None,
    };
    Some(SystemValue::date(date, precision))
}

pub fn parse_time_value(input: &str) -> Option<SystemValue> {
    let s = input.trim().trim_start_matches('@').trim_start_matches('T');
    if s.is_empty() {
        return None;
    }
    let (time, precision) = parse_clock(s)?;
    Some(SystemValue::time(time, precision))
}

/// Parse a dateTime. Date-only input yields a dateTime at date precision.
pub fn parse_datetime_value(input: &str) -> Option<SystemValue> {
    let raw = input.trim().trim_start_matches('@');
    if raw.is_empty() {
        return None;
    }

    let Some((date_part, rest)) = raw.split_once('T') else {
        let SystemValue::Date { value, precision } = parse_date_value(raw)? else {
            return None;
        };
        let midnight = NaiveDateTime::new(value, NaiveTime::MIN);
        return Some(SystemValue::datetime(
            chrono::DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc),
            precision.into(),
            None,
        ));
    };

    let SystemValue::Date { value: date, .. } = parse_date_value(date_part)? else {
        return None;
    };

    let (time_part, offset) = parse_timezone(rest)?;
    let (time, precision) = if time_part.is_empty() {
        (NaiveTime::MIN, DateTimePrecision::Day)
    } else {
        let (time, precision) = parse_clock(time_part)?;
        (time, precision.into())
    };

    let local = NaiveDateTime::new(date, time);
    let utc = match offset {
        Some(secs) => FixedOffset::east_opt(secs)?
            .from_local_datetime(&local)
            .single()?
            .with_timezone(&Utc),
        None => chrono::DateTime::<Utc>::from_naive_utc_and_offset(local, Utc),
    };

    Some(SystemValue::datetime(utc, precision, offset))
}

impl From<TimePrecision> for DateTimePrecision {
    fn from(precision: TimePrecision) -> Self {
        match precision {
            TimePrecision::Hour => DateTimePrecision::Hour,
            TimePrecision::Minute => DateTimePrecision::Minute,
            TimePrecision::Second => DateTimePrecision::Second,
            TimePrecision::Millisecond => DateTimePrecision::Millisecond,
        }
    }
}

fn parse_timezone(rest: &str) -> Option<(&str, Option<i32>)> {
    if let Some(stripped) = rest.strip_suffix('Z') {
        return Some((stripped, Some(0)));
    }

    if let Some(pos) = rest.rfind(['+', '-']) {
        let (time, tz) = rest.split_at(pos);
        let sign = if tz.starts_with('-') { -1 } else { 1 };
        let (hours, minutes) = match tz.len() {
            6 if tz.as_bytes().get(3) == Some(&b':') => (&tz[1..3], &tz[4..6]),
            5 => (&tz[1..3], &tz[3..5]),
            _ => return None,
        };
        let hours: i32 = hours.parse().ok()?;
        let minutes: i32 = minutes.parse().ok()?;
        return Some((time, Some(sign * (hours * 3600 + minutes * 60))));
    }

    Some((rest, None))
}

fn parse_clock(s: &str) -> Option<(NaiveTime, TimePrecision)> {
    let (main, frac) = match s.split_once('.') {
        Some((main, frac)) => (main, Some(frac)),
        None => (s, None),
    };

    let parts: Vec<&str> = main.split(':').collect();
    if parts.iter().any(|p| p.len() != 2) {
        return None;
    }
    let (hour, minute, second, precision) = match parts.as_slice() {
        [hh] => (*hh, "0", "0", TimePrecision::Hour),
        [hh, mm] => (*hh, *mm, "0", TimePrecision::Minute),
        [hh, mm, ss] if frac.is_some() => (*hh, *mm, *ss, TimePrecision::Millisecond),
        [hh, mm, ss] => (*hh, *mm, *ss, TimePrecision::Second),
        _ => return None,
    };

    let millis: u32 = match frac {
        Some(frac) if !frac.is_empty() && frac.chars().all(|c| c.is_ascii_digit()) => {
            let digits: String = frac.chars().take(3).collect();
            format!("{:0<3}", digits).parse().ok()?
        }
        Some(_) => return None,
        None => 0,
    };

    let time = NaiveTime::from_hms_milli_opt(
        hour.parse().ok()?,
        minute.parse().ok()?,
        second.parse().ok()?,
        millis,
    )?;
    Some((time, precision))
}
