//! Spreadsheet-compatible text, date, math and logical functions.

use chrono::{Datelike, Months, NaiveDate, NaiveTime, Timelike};
use itertools::Itertools;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use super::{failed, Arguments, FunctionDef, Library, ParamType};
use crate::context::EvaluationContext;
use crate::errors::{EvaluationError, Result};
use crate::utils::{decimal_pow, decimal_round, precise, DECIMAL_PRECISION};
use crate::value::Value;

use ParamType::{Any, Boolean, Date, DateTime, Integer, Number, Text};

pub fn library() -> Library {
    Library {
        name: "excel",
        functions: vec![
            // text
            FunctionDef::new("char", "Returns the character specified by a number")
                .param("number", Integer)
                .body(unichar),
            FunctionDef::new("clean", "Removes all non-printable characters from a text string")
                .param("text", Text)
                .body(|args| Ok(Value::Text(args.text(0)?.chars().filter(|c| *c >= ' ').collect()))),
            FunctionDef::new("code", "Returns a numeric code for the first character in a text string")
                .param("text", Text)
                .body(unicode),
            FunctionDef::new("concatenate", "Joins text strings into one text string")
                .variadic("text", Text)
                .body_with_context(|ctx, args| {
                    let texts = args.rest_texts()?;
                    let length = texts.iter().try_fold(0usize, |total, text| total.checked_add(text.len()));
                    check_text_length(ctx, length)?;
                    Ok(Value::Text(texts.concat()))
                }),
            FunctionDef::new("fixed", "Formats the given number in decimal format using a period and commas")
                .param("number", Number)
                .param_default("decimals", Integer, 2)
                .param_default("no_commas", Boolean, false)
                .body(fixed),
            FunctionDef::new("left", "Returns the first characters in a text string")
                .param("text", Text)
                .param("num_chars", Integer)
                .body(|args| {
                    let count = char_count(args.integer(1)?)?;
                    Ok(Value::Text(args.text(0)?.chars().take(count).collect()))
                }),
            FunctionDef::new("_len", "Returns the number of characters in a text string")
                .param("text", Text)
                .body(|args| Ok(Value::from(args.text(0)?.chars().count() as i64))),
            FunctionDef::new("lower", "Converts a text string to lowercase")
                .param("text", Text)
                .body(|args| Ok(Value::Text(args.text(0)?.to_lowercase()))),
            FunctionDef::new("proper", "Capitalizes the first letter of every word in a text string")
                .param("text", Text)
                .body(|args| Ok(Value::Text(title_case(args.text(0)?)))),
            FunctionDef::new("rept", "Repeats text a given number of times")
                .param("text", Text)
                .param("number_times", Integer)
                .body_with_context(|ctx, args| {
                    let text = args.text(0)?;
                    let times = usize::try_from(args.integer(1)?).map_err(|_| failed("Number of times can't be negative"))?;
                    check_text_length(ctx, text.len().checked_mul(times))?;
                    Ok(Value::Text(text.repeat(times)))
                }),
            FunctionDef::new("right", "Returns the last characters in a text string")
                .param("text", Text)
                .param("num_chars", Integer)
                .body(|args| {
                    let count = char_count(args.integer(1)?)?;
                    let chars: Vec<char> = args.text(0)?.chars().collect();
                    Ok(Value::Text(chars[chars.len().saturating_sub(count)..].iter().collect()))
                }),
            FunctionDef::new("substitute", "Substitutes new_text for old_text in a text string")
                .param("text", Text)
                .param("old_text", Text)
                .param("new_text", Text)
                .param_default("instance_num", Integer, -1)
                .body_with_context(substitute),
            FunctionDef::new("unichar", "Returns the unicode character specified by a number")
                .param("number", Integer)
                .body(unichar),
            FunctionDef::new("_unicode", "Returns a numeric code for the first character in a text string")
                .param("text", Text)
                .body(unicode),
            FunctionDef::new("upper", "Converts a text string to uppercase")
                .param("text", Text)
                .body(|args| Ok(Value::Text(args.text(0)?.to_uppercase()))),
            // date and time
            FunctionDef::new("date", "Defines a date value")
                .param("year", Integer)
                .param("month", Integer)
                .param("day", Integer)
                .body(|args| {
                    let (year, month, day) = (args.integer(0)?, args.integer(1)?, args.integer(2)?);
                    i32::try_from(year)
                        .ok()
                        .zip(u32::try_from(month).ok())
                        .zip(u32::try_from(day).ok())
                        .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d))
                        .map(Value::Date)
                        .ok_or_else(|| failed(format!("Invalid date {year}-{month}-{day}")))
                }),
            FunctionDef::new("datedif", "Calculates the number of days, months, or years between two dates.")
                .param("start_date", Date)
                .param("end_date", Date)
                .param("unit", Text)
                .body(|args| datedif(args.date(0)?, args.date(1)?, args.text(2)?).map(Value::from)),
            FunctionDef::new("datevalue", "Converts date stored in text to an actual date")
                .param("text", Date)
                .body(|args| Ok(Value::Date(args.date(0)?))),
            FunctionDef::new("day", "Returns only the day of the month of a date (1 to 31)")
                .param("date", Date)
                .body(|args| Ok(Value::from(i64::from(args.date(0)?.day())))),
            FunctionDef::new("days", "Returns the number of days between two dates.")
                .param("end_date", Date)
                .param("start_date", Date)
                .body(|args| datedif(args.date(1)?, args.date(0)?, "d").map(Value::from)),
            FunctionDef::new("edate", "Moves a date by the given number of months")
                .param("date", Date)
                .param("months", Integer)
                .body(edate),
            FunctionDef::new("hour", "Returns only the hour of a datetime (0 to 23)")
                .param("datetime", DateTime)
                .body(|args| Ok(Value::from(i64::from(args.datetime(0)?.hour())))),
            FunctionDef::new("minute", "Returns only the minute of a datetime (0 to 59)")
                .param("datetime", DateTime)
                .body(|args| Ok(Value::from(i64::from(args.datetime(0)?.minute())))),
            FunctionDef::new("month", "Returns only the month of a date (1 to 12)")
                .param("date", Date)
                .body(|args| Ok(Value::from(i64::from(args.date(0)?.month())))),
            FunctionDef::new("now", "Returns the current date and time")
                .body_with_context(|ctx, _| Ok(Value::DateTime(ctx.now_local()))),
            FunctionDef::new("second", "Returns only the second of a datetime (0 to 59)")
                .param("datetime", DateTime)
                .body(|args| Ok(Value::from(i64::from(args.datetime(0)?.second())))),
            FunctionDef::new("time", "Defines a time value")
                .param("hours", Integer)
                .param("minutes", Integer)
                .param("seconds", Integer)
                .body(|args| {
                    let (h, m, s) = (args.integer(0)?, args.integer(1)?, args.integer(2)?);
                    u32::try_from(h)
                        .ok()
                        .zip(u32::try_from(m).ok())
                        .zip(u32::try_from(s).ok())
                        .and_then(|((h, m), s)| NaiveTime::from_hms_opt(h, m, s))
                        .map(Value::Time)
                        .ok_or_else(|| failed(format!("Invalid time {h}:{m}:{s}")))
                }),
            FunctionDef::new("timevalue", "Converts time stored in text to an actual time")
                .param("text", ParamType::Time)
                .body(|args| Ok(Value::Time(args.time(0)?))),
            FunctionDef::new("today", "Returns the current date")
                .body_with_context(|ctx, _| Ok(Value::Date(ctx.now_local().date_naive()))),
            FunctionDef::new("weekday", "Returns the day of the week of a date (1 for Sunday to 7 for Saturday)")
                .param("date", Date)
                .body(|args| Ok(Value::from(i64::from(args.date(0)?.weekday().number_from_sunday())))),
            FunctionDef::new("year", "Returns only the year of a date")
                .param("date", Date)
                .body(|args| Ok(Value::from(i64::from(args.date(0)?.year())))),
            // math
            FunctionDef::new("_abs", "Returns the absolute value of a number")
                .param("number", Number)
                .body(|args| Ok(Value::Number(args.decimal(0)?.abs()))),
            FunctionDef::new("average", "Returns the average (arithmetic mean) of the arguments")
                .variadic("number", Number)
                .body(|args| {
                    let numbers = non_empty(args.rest_decimals()?)?;
                    let mean = checked_sum(&numbers)?.checked_div(Decimal::from(numbers.len())).ok_or_else(overflow)?;
                    Ok(Value::Number(precise(mean)))
                }),
            FunctionDef::new("exp", "Returns e raised to the power of number")
                .param("number", Number)
                .body(|args| {
                    let number = args.decimal(0)?;
                    number
                        .to_f64()
                        .map(f64::exp)
                        .and_then(Decimal::from_f64)
                        .map(|result| Value::Number(precise(result)))
                        .ok_or_else(|| failed(format!("Can't raise e to {number}")))
                }),
            FunctionDef::new("_int", "Rounds a number down to the nearest integer")
                .param("number", Number)
                .body(|args| Ok(Value::Number(args.decimal(0)?.floor()))),
            FunctionDef::new("_max", "Returns the maximum value of all arguments")
                .variadic("number", Number)
                .body(|args| non_empty(args.rest_decimals()?)?.into_iter().max().map(Value::Number).ok_or_else(no_arguments)),
            FunctionDef::new("_min", "Returns the minimum value of all arguments")
                .variadic("number", Number)
                .body(|args| non_empty(args.rest_decimals()?)?.into_iter().min().map(Value::Number).ok_or_else(no_arguments)),
            FunctionDef::new("mod", "Returns the remainder after number is divided by divisor")
                .param("number", Number)
                .param("divisor", Number)
                .body(|args| {
                    let (number, divisor) = (args.decimal(0)?, args.decimal(1)?);
                    if divisor.is_zero() {
                        return Err(failed("Division by zero"));
                    }
                    number
                        .checked_div(divisor)
                        .and_then(|quotient| divisor.checked_mul(quotient.floor()))
                        .and_then(|multiple| number.checked_sub(multiple))
                        .map(Value::Number)
                        .ok_or_else(overflow)
                }),
            FunctionDef::new("_power", "Returns the result of a number raised to a power")
                .param("number", Number)
                .param("power", Number)
                .body(|args| {
                    let (number, power) = (args.decimal(0)?, args.decimal(1)?);
                    decimal_pow(number, power)
                        .map(Value::Number)
                        .ok_or_else(|| failed(format!("Can't raise {number} to {power}")))
                }),
            FunctionDef::new("_round", "Rounds a number to a specified number of digits")
                .param("number", Number)
                .param("num_digits", Integer)
                .body(|args| round(args, RoundingStrategy::MidpointAwayFromZero)),
            FunctionDef::new("rounddown", "Rounds a number down, toward zero")
                .param("number", Number)
                .param("num_digits", Integer)
                .body(|args| round(args, RoundingStrategy::ToZero)),
            FunctionDef::new("roundup", "Rounds a number up, away from zero")
                .param("number", Number)
                .param("num_digits", Integer)
                .body(|args| round(args, RoundingStrategy::AwayFromZero)),
            FunctionDef::new("_sum", "Returns the sum of all arguments")
                .variadic("number", Number)
                .body(|args| Ok(Value::Number(checked_sum(&non_empty(args.rest_decimals()?)?)?))),
            FunctionDef::new("trunc", "Truncates a number to an integer by removing the fractional part of the number")
                .param("number", Number)
                .body(|args| Ok(Value::Number(args.decimal(0)?.trunc()))),
            // logical
            FunctionDef::new("_and", "Returns TRUE if and only if all its arguments evaluate to TRUE")
                .variadic("logical", Boolean)
                .body(|args| Ok(Value::Bool(args.rest_booleans()?.into_iter().all(|b| b)))),
            FunctionDef::new("false", "Returns the logical value FALSE").body(|_| Ok(Value::Bool(false))),
            FunctionDef::new(
                "_if",
                "Returns one value if the condition evaluates to TRUE, and another value if it evaluates to FALSE",
            )
            .param("logical_test", Boolean)
            .param_default("value_if_true", Any, 0)
            .param_default("value_if_false", Any, false)
            .body(|args| Ok(if args.boolean(0)? { args.value(1) } else { args.value(2) }.clone())),
            FunctionDef::new("_or", "Returns TRUE if any argument is TRUE")
                .variadic("logical", Boolean)
                .body(|args| Ok(Value::Bool(args.rest_booleans()?.into_iter().any(|b| b)))),
            FunctionDef::new("true", "Returns the logical value TRUE").body(|_| Ok(Value::Bool(true))),
        ],
    }
}

fn no_arguments() -> EvaluationError {
    failed("Wrong number of arguments")
}

fn overflow() -> EvaluationError {
    failed("Number is too large")
}

fn checked_sum(numbers: &[Decimal]) -> Result<Decimal> {
    numbers
        .iter()
        .try_fold(Decimal::ZERO, |total, number| total.checked_add(*number))
        .ok_or_else(overflow)
}

/// Fails when a text of `length` bytes, `None` meaning unrepresentable, is
/// over the context's limit.
fn check_text_length(ctx: &EvaluationContext, length: Option<usize>) -> Result<()> {
    match length {
        Some(length) if length <= ctx.max_text_length() => Ok(()),
        _ => Err(failed(format!("Result exceeds the maximum text length of {}", ctx.max_text_length()))),
    }
}

fn non_empty(numbers: Vec<Decimal>) -> Result<Vec<Decimal>> {
    if numbers.is_empty() {
        Err(no_arguments())
    } else {
        Ok(numbers)
    }
}

fn char_count(requested: i64) -> Result<usize> {
    usize::try_from(requested).map_err(|_| failed("Number of chars can't be negative"))
}

fn unichar(args: &Arguments) -> Result<Value> {
    let code = args.integer(0)?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::Text(c.to_string()))
        .ok_or_else(|| failed(format!("No character with code {code}")))
}

fn unicode(args: &Arguments) -> Result<Value> {
    let first = args.text(0)?.chars().next().ok_or_else(|| failed("Text can't be empty"))?;
    Ok(Value::from(i64::from(u32::from(first))))
}

/// Upper-cases the first letter of every run of letters, lower-cases the rest.
fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if in_word {
            result.extend(c.to_lowercase());
        } else {
            result.extend(c.to_uppercase());
        }
        in_word = c.is_alphabetic();
    }
    result
}

fn substitute(ctx: &EvaluationContext, args: &Arguments) -> Result<Value> {
    let (text, old, new) = (args.text(0)?, args.text(1)?, args.text(2)?);
    let instance = args.integer(3)?;
    if instance < 0 || old.is_empty() {
        // an empty pattern matches between every character
        let replaced = if old.is_empty() { text.chars().count() + 1 } else { text.matches(old).count() };
        let length = replaced
            .checked_mul(new.len())
            .and_then(|added| (text.len() - replaced * old.len()).checked_add(added));
        check_text_length(ctx, length)?;
        return Ok(Value::Text(text.replace(old, new)));
    }
    let mut pieces = text.split(old);
    let mut output = pieces.next().unwrap_or_default().to_string();
    for (number, piece) in pieces.enumerate() {
        output.push_str(if number as i64 + 1 == instance { new } else { old });
        output.push_str(piece);
    }
    Ok(Value::Text(output))
}

fn fixed(args: &Arguments) -> Result<Value> {
    let (number, decimals, no_commas) = (args.decimal(0)?, args.integer(1)?, args.boolean(2)?);
    let mut rounded = decimal_round(number, decimals, RoundingStrategy::MidpointAwayFromZero)
        .ok_or_else(|| failed(format!("Can't round {number}")))?;
    if decimals >= 0 {
        rounded.rescale(decimals.min(i64::from(DECIMAL_PRECISION)) as u32);
    }
    let text = rounded.to_string();
    Ok(Value::Text(if no_commas { text } else { group_thousands(&text) }))
}

fn group_thousands(text: &str) -> String {
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };
    let grouped = whole
        .chars()
        .rev()
        .chunks(3)
        .into_iter()
        .map(|chunk| chunk.collect::<String>())
        .join(",")
        .chars()
        .rev()
        .collect::<String>();
    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}

fn round(args: &Arguments, strategy: RoundingStrategy) -> Result<Value> {
    let (number, digits) = (args.decimal(0)?, args.integer(1)?);
    decimal_round(number, digits, strategy)
        .map(Value::Number)
        .ok_or_else(|| failed(format!("Can't round {number} to {digits} digits")))
}

/// Whole months from `start` to `end`, counting a month only once its day is reached.
fn whole_months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    if end.day() < start.day() {
        months - 1
    } else {
        months
    }
}

fn datedif(start: NaiveDate, end: NaiveDate, unit: &str) -> Result<i64> {
    if start > end {
        return Err(failed("Start date cannot be after end date"));
    }
    let months = whole_months_between(start, end);
    match unit.to_lowercase().as_str() {
        "y" => Ok(i64::from(months / 12)),
        "m" => Ok(i64::from(months)),
        "d" => Ok((end - start).num_days()),
        "md" => {
            let anniversary = start
                .checked_add_months(Months::new(months as u32))
                .ok_or_else(|| failed("Date out of range"))?;
            Ok((end - anniversary).num_days())
        }
        "ym" => Ok(i64::from(months % 12)),
        "yd" => {
            let same_year = start
                .with_year(end.year())
                .or_else(|| NaiveDate::from_ymd_opt(end.year(), start.month(), 28))
                .ok_or_else(|| failed("Date out of range"))?;
            Ok((end - same_year).num_days())
        }
        other => Err(failed(format!("Invalid unit value: {other}"))),
    }
}

fn shift_months<T>(value: T, months: i64, add: impl Fn(T, Months) -> Option<T>, sub: impl Fn(T, Months) -> Option<T>) -> Option<T> {
    let amount = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        add(value, amount)
    } else {
        sub(value, amount)
    }
}

fn edate(args: &Arguments) -> Result<Value> {
    let months = args.integer(1)?;
    let shifted = match args.value(0) {
        Value::DateTime(dt) => shift_months(*dt, months, |d, m| d.checked_add_months(m), |d, m| d.checked_sub_months(m))
            .map(Value::DateTime),
        _ => shift_months(args.date(0)?, months, |d, m| d.checked_add_months(m), |d, m| d.checked_sub_months(m))
            .map(Value::Date),
    };
    shifted.ok_or_else(|| failed("Date out of range"))
}
