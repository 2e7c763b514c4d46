//! Coercions between value types. Text is parsed with the context's date
//! parser, so date conversions honour its style and timezone.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::context::EvaluationContext;
use crate::dates::{format_iso_datetime, localize, Mode, Temporal};
use crate::errors::{EvaluationError, Result};
use crate::utils::format_decimal;
use crate::value::Value;

fn cant_convert(value: &Value, target: &str) -> EvaluationError {
    EvaluationError::argument_type(format!("Can't convert '{value}' to {target}"))
}

pub fn to_boolean(value: &Value, _ctx: &EvaluationContext) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(!n.is_zero()),
        Value::Text(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::Text(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        Value::Date(_) | Value::Time(_) | Value::DateTime(_) => Ok(true),
        other => Err(cant_convert(other, "a boolean")),
    }
}

/// Integers round half away from zero.
pub fn to_integer(value: &Value, _ctx: &EvaluationContext) -> Result<i64> {
    match value {
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Number(n) => n
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or_else(|| cant_convert(value, "an integer")),
        Value::Text(s) => s.trim().parse::<i64>().map_err(|_| cant_convert(value, "an integer")),
        other => Err(cant_convert(other, "an integer")),
    }
}

pub fn to_decimal(value: &Value, _ctx: &EvaluationContext) -> Result<Decimal> {
    match value {
        Value::Bool(b) => Ok(if *b { Decimal::ONE } else { Decimal::ZERO }),
        Value::Number(n) => Ok(*n),
        Value::Text(s) => {
            let trimmed = s.trim();
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|_| cant_convert(value, "a decimal"))
        }
        other => Err(cant_convert(other, "a decimal")),
    }
}

/// Renders a value for display. Dates use the context's format and
/// datetimes are shown in the context's timezone.
pub fn to_string(value: &Value, ctx: &EvaluationContext) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => format_decimal(n),
        Value::Text(s) => s.clone(),
        Value::Date(d) => d.format(ctx.date_format(false)).to_string(),
        Value::Time(t) => t.format("%H:%M").to_string(),
        Value::DateTime(dt) => format_iso_datetime(&in_context_zone(dt, ctx)),
        other => other.to_string(),
    })
}

fn in_context_zone(value: &DateTime<FixedOffset>, ctx: &EvaluationContext) -> DateTime<FixedOffset> {
    value.with_timezone(&ctx.timezone).fixed_offset()
}

fn parse_text(text: &str, ctx: &EvaluationContext) -> Option<Temporal> {
    ctx.date_parser().parse(text, Mode::Auto).ok()
}

/// A datetime's time of day is discarded.
pub fn to_date(value: &Value, ctx: &EvaluationContext) -> Result<NaiveDate> {
    match value {
        Value::Date(d) => Ok(*d),
        Value::DateTime(dt) => Ok(dt.date_naive()),
        Value::Text(s) => match parse_text(s, ctx) {
            Some(Temporal::Date(d)) => Ok(d),
            Some(Temporal::DateTime(dt)) => Ok(dt.date_naive()),
            _ => Err(cant_convert(value, "a date")),
        },
        other => Err(cant_convert(other, "a date")),
    }
}

/// Dates become midnight in the context's timezone.
pub fn to_datetime(value: &Value, ctx: &EvaluationContext) -> Result<DateTime<FixedOffset>> {
    let from_date = |d: NaiveDate| localize(ctx.timezone, d.and_time(NaiveTime::MIN));
    let converted = match value {
        Value::Date(d) => from_date(*d),
        Value::DateTime(dt) => Some(in_context_zone(dt, ctx)),
        Value::Text(s) => match parse_text(s, ctx) {
            Some(Temporal::Date(d)) => from_date(d),
            Some(Temporal::DateTime(dt)) => Some(in_context_zone(&dt, ctx)),
            _ => None,
        },
        _ => None,
    };
    converted.ok_or_else(|| cant_convert(value, "a datetime"))
}

/// Keeps whichever of date or datetime the value already is.
pub fn to_date_or_datetime(value: &Value, ctx: &EvaluationContext) -> Result<Value> {
    match value {
        Value::Date(_) => Ok(value.clone()),
        Value::DateTime(dt) => Ok(Value::DateTime(in_context_zone(dt, ctx))),
        Value::Text(s) => match parse_text(s, ctx) {
            Some(Temporal::Date(d)) => Ok(Value::Date(d)),
            Some(Temporal::DateTime(dt)) => Ok(Value::DateTime(dt)),
            _ => Err(cant_convert(value, "a date or datetime")),
        },
        other => Err(cant_convert(other, "a date or datetime")),
    }
}

pub fn to_time(value: &Value, ctx: &EvaluationContext) -> Result<NaiveTime> {
    match value {
        Value::Time(t) => Ok(*t),
        Value::DateTime(dt) => Ok(in_context_zone(dt, ctx).time()),
        Value::Text(s) => ctx.date_parser().time(s).map_err(|_| cant_convert(value, "a time")),
        other => Err(cant_convert(other, "a time")),
    }
}

/// The literal form of a value, e.g. `x` becomes `"x"`.
pub fn to_repr(value: &Value, ctx: &EvaluationContext) -> Result<String> {
    let text = to_string(value, ctx)?;
    Ok(match value {
        Value::Text(_) | Value::Date(_) | Value::Time(_) | Value::DateTime(_) => {
            format!("\"{}\"", text.replace('"', "\"\""))
        }
        _ => text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::DateStyle;
    use crate::value::VariableMap;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(VariableMap::new(), chrono_tz::Africa::Kigali, DateStyle::DayFirst)
            .with_now(Utc.with_ymd_and_hms(2015, 8, 12, 9, 0, 0).unwrap())
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn kigali(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(7200).unwrap().with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn booleans() {
        let ctx = ctx();
        assert!(to_boolean(&Value::Bool(true), &ctx).unwrap());
        assert!(to_boolean(&Value::from(1), &ctx).unwrap());
        assert!(!to_boolean(&Value::Number(dec("0.0")), &ctx).unwrap());
        assert!(to_boolean(&Value::from("TRUE"), &ctx).unwrap());
        assert!(!to_boolean(&Value::from("faLSe"), &ctx).unwrap());
        assert!(to_boolean(&Value::Date(NaiveDate::from_ymd_opt(2015, 1, 1).unwrap()), &ctx).unwrap());
        assert!(to_boolean(&Value::from("x"), &ctx).is_err());
    }

    #[test]
    fn integers_round_half_up() {
        let ctx = ctx();
        assert_eq!(to_integer(&Value::Bool(true), &ctx).unwrap(), 1);
        assert_eq!(to_integer(&Value::Number(dec("1.5")), &ctx).unwrap(), 2);
        assert_eq!(to_integer(&Value::Number(dec("-1.5")), &ctx).unwrap(), -2);
        assert_eq!(to_integer(&Value::from("123"), &ctx).unwrap(), 123);
        assert!(to_integer(&Value::from("1.5x"), &ctx).is_err());
    }

    #[test]
    fn decimals() {
        let ctx = ctx();
        assert_eq!(to_decimal(&Value::from(" 12.50 "), &ctx).unwrap(), dec("12.50"));
        assert_eq!(to_decimal(&Value::Bool(false), &ctx).unwrap(), Decimal::ZERO);
        assert!(to_decimal(&Value::from("twelve"), &ctx).is_err());
    }

    #[test]
    fn strings_use_context_formats() {
        let ctx = ctx();
        assert_eq!(to_string(&Value::Bool(false), &ctx).unwrap(), "FALSE");
        assert_eq!(to_string(&Value::Number(dec("1.2300")), &ctx).unwrap(), "1.23");
        assert_eq!(to_string(&Value::Date(NaiveDate::from_ymd_opt(2012, 3, 4).unwrap()), &ctx).unwrap(), "04-03-2012");
        assert_eq!(to_string(&Value::Time(NaiveTime::from_hms_opt(9, 5, 0).unwrap()), &ctx).unwrap(), "09:05");
        let utc = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2012, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(to_string(&Value::DateTime(utc), &ctx).unwrap(), "2012-03-04T07:06:07+02:00");
    }

    #[test]
    fn dates_from_text() {
        let ctx = ctx();
        assert_eq!(to_date(&Value::from("14th Aug 2015"), &ctx).unwrap(), NaiveDate::from_ymd_opt(2015, 8, 14).unwrap());
        assert_eq!(to_date(&Value::from("14/8/15 10:30"), &ctx).unwrap(), NaiveDate::from_ymd_opt(2015, 8, 14).unwrap());
        assert!(to_date(&Value::from("not a date"), &ctx).is_err());
    }

    #[test]
    fn datetimes_from_dates_are_local_midnight() {
        let ctx = ctx();
        let date = Value::Date(NaiveDate::from_ymd_opt(2015, 8, 14).unwrap());
        assert_eq!(to_datetime(&date, &ctx).unwrap(), kigali(2015, 8, 14, 0, 0));
        assert_eq!(to_datetime(&Value::from("14/8/15 10:30"), &ctx).unwrap(), kigali(2015, 8, 14, 10, 30));
    }

    #[test]
    fn times() {
        let ctx = ctx();
        assert_eq!(to_time(&Value::from("2:55PM"), &ctx).unwrap(), NaiveTime::from_hms_opt(14, 55, 0).unwrap());
        assert_eq!(to_time(&Value::DateTime(kigali(2015, 8, 14, 10, 30)), &ctx).unwrap(), NaiveTime::from_hms_opt(10, 30, 0).unwrap());
        assert!(to_time(&Value::from(5), &ctx).is_err());
    }

    #[test]
    fn repr_quotes_text_and_temporals() {
        let ctx = ctx();
        assert_eq!(to_repr(&Value::Bool(true), &ctx).unwrap(), "TRUE");
        assert_eq!(to_repr(&Value::Number(dec("1.5")), &ctx).unwrap(), "1.5");
        assert_eq!(to_repr(&Value::from("x\"y"), &ctx).unwrap(), "\"x\"\"y\"");
        assert_eq!(to_repr(&Value::Date(NaiveDate::from_ymd_opt(2015, 8, 14).unwrap()), &ctx).unwrap(), "\"14-08-2015\"");
    }
}
