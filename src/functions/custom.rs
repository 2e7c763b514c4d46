//! Functions specific to messaging flows: word handling, digits for
//! text-to-speech, location paths and regex extraction.

use itertools::Itertools;
use regex::RegexBuilder;
use rust_decimal::{Decimal, RoundingStrategy};

use super::{failed, Arguments, FunctionDef, Library, ParamType};
use crate::errors::Result;
use crate::utils::{slice, tokenize};
use crate::value::Value;

use ParamType::{Boolean, DateTime, Integer, Number, Text};

pub fn library() -> Library {
    Library {
        name: "custom",
        functions: vec![
            FunctionDef::new("field", "Reference a field in string separated by a delimiter")
                .param("text", Text)
                .param("index", Integer)
                .param_default("delimiter", Text, " ")
                .body(field),
            FunctionDef::new("first_word", "Returns the first word in the given text string")
                .param("text", Text)
                .body(|args| Ok(Value::Text(word_slice(args.text(0)?, 1, 2, false)?))),
            FunctionDef::new("percent", "Formats a number as a percentage")
                .param("number", Number)
                .body(|args| {
                    let percent = args
                        .decimal(0)?
                        .checked_mul(Decimal::ONE_HUNDRED)
                        .ok_or_else(|| failed("Number is too large"))?
                        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
                    Ok(Value::Text(format!("{}%", percent.normalize())))
                }),
            FunctionDef::new("epoch", "Converts the given date to the number of seconds since January 1st, 1970 UTC")
                .param("datetime", DateTime)
                .body(|args| {
                    let datetime = args.datetime(0)?;
                    let nanos = datetime.timestamp_nanos_opt().ok_or_else(|| failed("Date out of range"))?;
                    Ok(Value::Number(Decimal::from_i128_with_scale(i128::from(nanos), 9).normalize()))
                }),
            FunctionDef::new("read_digits", "Formats digits in text for reading in TTS")
                .param("text", Text)
                .body(|args| Ok(Value::Text(read_digits(args.text(0)?)))),
            FunctionDef::new("remove_first_word", "Removes the first word from the given text string")
                .param("text", Text)
                .body(|args| {
                    let text = args.text(0)?.trim_start();
                    let first = word_slice(text, 1, 2, false)?;
                    let rest = match text.find(first.as_str()) {
                        Some(start) if !first.is_empty() => text[start + first.len()..].trim_start(),
                        _ => "",
                    };
                    Ok(Value::Text(rest.to_string()))
                }),
            FunctionDef::new("word", "Extracts the nth word from the given text string")
                .param("text", Text)
                .param("number", Integer)
                .param_default("by_spaces", Boolean, false)
                .body(|args| {
                    let number = args.integer(1)?;
                    let stop = number.checked_add(1).ok_or_else(|| failed(format!("No word at {number}")))?;
                    Ok(Value::Text(word_slice(args.text(0)?, number, stop, args.boolean(2)?)?))
                }),
            FunctionDef::new("word_count", "Returns the number of words in the given text string")
                .param("text", Text)
                .param_default("by_spaces", Boolean, false)
                .body(|args| Ok(Value::from(words(args.text(0)?, args.boolean(1)?).len() as i64))),
            FunctionDef::new("word_slice", "Extracts a substring spanning from start up to but not-including stop")
                .param("text", Text)
                .param("start", Integer)
                .param_default("stop", Integer, 0)
                .param_default("by_spaces", Boolean, false)
                .body(|args| {
                    let text = word_slice(args.text(0)?, args.integer(1)?, args.integer(2)?, args.boolean(3)?)?;
                    Ok(Value::Text(text))
                }),
            FunctionDef::new(
                "format_date",
                "Takes a single parameter (date as string) and returns it in the format defined by the org",
            )
            .param("text", DateTime)
            .body_with_context(|ctx, args| Ok(Value::Text(args.datetime(0)?.format(ctx.date_format(true)).to_string()))),
            FunctionDef::new(
                "format_location",
                "Takes a single parameter (administrative boundary as a string) and returns the name of the leaf boundary",
            )
            .param("text", Text)
            .body(|args| Ok(Value::Text(args.text(0)?.rsplit('>').next().unwrap_or_default().trim().to_string()))),
            FunctionDef::new(
                "regex_group",
                "Tries to match the text with the given pattern and returns the value of matching group",
            )
            .param("text", Text)
            .param("pattern", Text)
            .param("group_num", Integer)
            .body(regex_group),
        ],
    }
}

/// Words split on punctuation, or only on whitespace when `by_spaces`.
fn words(text: &str, by_spaces: bool) -> Vec<String> {
    if by_spaces {
        text.split_whitespace().map(str::to_string).collect()
    } else {
        tokenize(text)
    }
}

/// Words `start` up to `stop`, one-based. Negative positions count from the
/// end and a `stop` of zero means no end.
fn word_slice(text: &str, start: i64, stop: i64, by_spaces: bool) -> Result<String> {
    let start = match start {
        0 => return Err(failed("Start word cannot be zero")),
        s if s > 0 => s - 1,
        s => s,
    };
    let stop = match stop {
        0 => None,
        s if s > 0 => Some(s - 1),
        s => Some(s),
    };
    Ok(slice(&words(text, by_spaces), Some(start), stop).join(" "))
}

fn field(args: &Arguments) -> Result<Value> {
    let (text, index, delimiter) = (args.text(0)?, args.integer(1)?, args.text(2)?);
    if index < 1 {
        return Err(failed("Field index cannot be less than 1"));
    }
    let fields = text.split(delimiter).filter(|f| *f != delimiter && !f.trim().is_empty()).collect_vec();
    let picked = usize::try_from(index - 1).ok().and_then(|i| fields.get(i)).copied().unwrap_or_default();
    Ok(Value::Text(picked.to_string()))
}

fn spaced(digits: &[char]) -> String {
    digits.iter().join(" ")
}

fn read_digits(text: &str) -> String {
    let text = text.trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    let digits: Vec<char> = text.chars().collect();
    let length = digits.len();
    match length {
        0 => String::new(),
        // social security numbers
        9 => [&digits[..3], &digits[3..5], &digits[5..]].iter().map(|part| spaced(part)).join(" , "),
        // phone numbers
        n if n % 3 == 0 && n > 3 => digits.chunks(3).map(spaced).join(" , "),
        // credit cards
        n if n % 4 == 0 => digits.chunks(4).map(spaced).join(" , "),
        _ => digits.iter().join(","),
    }
}

fn regex_group(args: &Arguments) -> Result<Value> {
    let (text, pattern, group) = (args.text(0)?, args.text(1)?, args.integer(2)?);
    let expression = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|err| failed(format!("Invalid regular expression: {err}")))?;
    let Some(captures) = expression.captures(text) else {
        return Ok(Value::Text(String::new()));
    };
    let index = usize::try_from(group)
        .ok()
        .filter(|i| *i < captures.len())
        .ok_or_else(|| failed(format!("No such matching group {group}")))?;
    Ok(Value::Text(captures.get(index).map_or("", |m| m.as_str()).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::dates::DateStyle;
    use crate::errors::ErrorKind;
    use crate::functions::FunctionRegistry;
    use crate::value::VariableMap;
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: Vec<Value>) -> Result<Value> {
        let mut registry = FunctionRegistry::new();
        registry.register(library()).unwrap();
        let ctx = EvaluationContext::new(VariableMap::new(), chrono_tz::Africa::Kigali, DateStyle::DayFirst);
        registry.invoke(&ctx, name, args)
    }

    fn text(name: &str, args: Vec<Value>) -> String {
        call(name, args).unwrap().to_string()
    }

    #[test]
    fn fields() {
        assert_eq!(text("field", vec!["15+M+Seattle".into(), 1.into(), "+".into()]), "15");
        assert_eq!(text("field", vec!["15 M Seattle".into(), 1.into()]), "15");
        assert_eq!(text("field", vec!["15+M+Seattle".into(), 4.into(), "+".into()]), "");
        assert_eq!(text("field", vec!["15    M  Seattle".into(), 2.into()]), "M");
        assert_eq!(text("field", vec![" واحد إثنان-ثلاثة ".into(), 1.into()]), "واحد");
        assert!(call("field", vec!["15+M+Seattle".into(), 0.into()]).is_err());
    }

    #[test]
    fn words_and_slices() {
        assert_eq!(text("first_word", vec!["  ".into()]), "");
        assert_eq!(text("first_word", vec![" abc def ghi".into()]), "abc");
        assert_eq!(text("remove_first_word", vec![" abc def-ghi ".into()]), "def-ghi ");
        assert_eq!(text("remove_first_word", vec![" abc ".into()]), "");
        assert_eq!(text("word", vec!["abc-def  ghi  jkl".into(), 3.into()]), "ghi");
        assert_eq!(text("word", vec!["abc-def  ghi  jkl".into(), "3".into(), "TRUE".into()]), "jkl");
        assert_eq!(text("word", vec!["abc-def  ghi  jkl".into(), (-1).into()]), "jkl");
        assert_eq!(text("word", vec![" abc def   ghi".into(), 6.into()]), "");
        assert_eq!(text("word_count", vec![" abc-def  ghi  jkl".into()]), "4");
        assert_eq!(text("word_count", vec![" abc-def  ghi  jkl".into(), true.into()]), "3");
        assert_eq!(text("word_slice", vec![" abc  def ghi-jkl ".into(), 1.into(), 3.into()]), "abc def");
        assert_eq!(text("word_slice", vec![" abc  def ghi-jkl ".into(), 3.into(), 0.into(), true.into()]), "ghi-jkl");
        assert_eq!(text("word_slice", vec![" abc  def ghi-jkl ".into(), 2.into(), (-1).into()]), "def ghi");
        assert_eq!(text("word_slice", vec![" abc  def ghi-jkl ".into(), (-1).into()]), "jkl");
        assert!(call("word_slice", vec![" abc ".into(), 0.into()]).is_err());
        assert_eq!(call("word", vec!["abc".into(), Value::from(i64::MAX)]).unwrap_err().kind, ErrorKind::FunctionFailed);
        assert_eq!(text("word", vec!["abc".into(), Value::from(i64::MAX - 1)]), "");
    }

    #[test]
    fn percent_and_digits() {
        assert_eq!(text("percent", vec!["0.25321".into()]), "25%");
        assert_eq!(call("percent", vec![Value::Number(Decimal::MAX)]).unwrap_err().kind, ErrorKind::FunctionFailed);
        assert_eq!(text("read_digits", vec!["1234567890123456".into()]), "1 2 3 4 , 5 6 7 8 , 9 0 1 2 , 3 4 5 6");
        assert_eq!(text("read_digits", vec!["+123456789012".into()]), "1 2 3 , 4 5 6 , 7 8 9 , 0 1 2");
        assert_eq!(text("read_digits", vec!["123456789".into()]), "1 2 3 , 4 5 , 6 7 8 9");
        assert_eq!(text("read_digits", vec!["12345".into()]), "1,2,3,4,5");
        assert_eq!(text("read_digits", vec!["".into()]), "");
    }

    #[test]
    fn dates_and_locations() {
        assert_eq!(text("format_date", vec!["2034-02-01T14:55:41.060422123Z".into()]), "01-02-2034 16:55");
        assert_eq!(call("format_date", vec!["not date".into()]).unwrap_err().kind, ErrorKind::ArgumentType);
        assert_eq!(text("epoch", vec!["2015-08-14T10:38:30.500Z".into()]), "1439548710.5");
        assert_eq!(text("format_location", vec!["Rwanda > Kigali > Kimihurura".into()]), "Kimihurura");
        assert_eq!(text("format_location", vec!["Rwanda".into()]), "Rwanda");
    }

    #[test]
    fn regex_groups() {
        assert_eq!(text("regex_group", vec!["Isaac Newton".into(), r"(\w+) (\w+)".into(), 0.into()]), "Isaac Newton");
        assert_eq!(text("regex_group", vec!["Isaac Newton".into(), r"(\w+) (\w+)".into(), "2".into()]), "Newton");
        assert_eq!(text("regex_group", vec!["Isaac".into(), r"(\d+)".into(), 1.into()]), "");
        assert!(call("regex_group", vec!["Isaac Newton".into(), r"(\w+) (\w+)".into(), 5.into()]).is_err());
    }
}
