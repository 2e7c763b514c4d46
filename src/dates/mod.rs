//! Flexible parsing of human-written dates, times and datetimes.
//!
//! Text is split into digit and letter tokens, each token is given every
//! role it could play (a `26` may be a day, a year or a minute, never a
//! month), and the token list is matched against the configured component
//! sequences. Every complete match becomes a [`DateCandidate`]; the first
//! valid one in descending rank wins.

pub mod lexer;
pub mod sequences;

use std::collections::HashMap;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, SecondsFormat, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::errors::{EvaluationError, Result};
use lexer::{tokenize, Token, TokenType};
pub use sequences::{Component, DateParserConfig, Sequence};

/// Which of two ambiguous numbers is read as the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStyle {
    #[default]
    DayFirst,
    MonthFirst,
}

/// What kind of value a parse is allowed to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Date,
    DateTime,
    Time,
    /// A date or a datetime, whichever the text supports.
    Auto,
}

/// A parsed calendar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<FixedOffset>),
}

const AM: i64 = 0;
const PM: i64 = 1;

/// One complete binding of tokens to a component sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DateCandidate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: Option<u32>,
    pub nanos: Option<u32>,
    /// Explicit UTC offset in seconds, from `Z` or a signed suffix.
    pub offset: Option<i32>,
    pub valid: bool,
    /// One point each for a named month and a four-digit year.
    pub rank: u8,
}

impl DateCandidate {
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year?, self.month?, self.day?)
    }

    pub fn time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_nano_opt(self.hour?, self.minute?, self.second.unwrap_or(0), self.nanos.unwrap_or(0))
    }

    /// Converts to a value, placing datetimes in `timezone` unless the text
    /// carried its own offset.
    pub fn to_temporal(&self, timezone: Tz) -> Option<Temporal> {
        match (self.date(), self.time()) {
            (Some(date), Some(time)) => {
                let naive = date.and_time(time);
                let datetime = match self.offset {
                    Some(seconds) => FixedOffset::east_opt(seconds)?.from_local_datetime(&naive).single()?,
                    None => localize(timezone, naive)?,
                };
                Some(Temporal::DateTime(datetime))
            }
            (Some(date), None) => Some(Temporal::Date(date)),
            (None, Some(time)) => Some(Temporal::Time(time)),
            (None, None) => None,
        }
    }
}

/// Places a wall-clock time in `timezone`, taking the earlier instant when a
/// DST change makes it ambiguous and skipping forward over a gap.
pub fn localize(timezone: Tz, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    let local = timezone
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| timezone.from_local_datetime(&(naive + Duration::hours(1))).earliest())?;
    Some(local.with_timezone(&local.offset().fix()))
}

#[derive(Debug, Clone, Copy)]
struct Possibility {
    value: i64,
    specific: bool,
}

type Possibilities = HashMap<Component, Possibility>;

/// Parses dates relative to a fixed `now`, in one timezone and date style.
#[derive(Debug, Clone)]
pub struct DateParser<'a> {
    config: &'a DateParserConfig,
    now: DateTime<Utc>,
    timezone: Tz,
    style: DateStyle,
}

impl<'a> DateParser<'a> {
    pub fn new(config: &'a DateParserConfig, now: DateTime<Utc>, timezone: Tz, style: DateStyle) -> Self {
        Self { config, now, timezone, style }
    }

    /// Returns a date or a datetime depending on what the text holds.
    pub fn auto(&self, text: &str) -> Result<Temporal> {
        self.parse(text, Mode::Auto)
    }

    /// Parses a time of day.
    pub fn time(&self, text: &str) -> Result<NaiveTime> {
        match self.parse(text, Mode::Time)? {
            Temporal::Time(time) => Ok(time),
            _ => Err(EvaluationError::invalid_date(text)),
        }
    }

    pub fn parse(&self, text: &str, mode: Mode) -> Result<Temporal> {
        self.disambiguate_with_mode(text, mode)?
            .to_temporal(self.timezone)
            .ok_or_else(|| EvaluationError::invalid_date(text))
    }

    /// The best valid reading of `text` as a date, optionally with a time.
    pub fn disambiguate(&self, text: &str) -> Result<DateCandidate> {
        self.disambiguate_with_mode(text, Mode::Auto)
    }

    pub fn disambiguate_with_mode(&self, text: &str, mode: Mode) -> Result<DateCandidate> {
        let candidates = self.candidates(text, mode);
        let winner = candidates
            .into_iter()
            .find(|candidate| candidate.valid && candidate.to_temporal(self.timezone).is_some());
        trace!(text, ?mode, ?winner, "disambiguated date");
        winner.ok_or_else(|| EvaluationError::invalid_date(text))
    }

    /// Every complete binding of `text` to a sequence, valid or not, best rank first.
    pub fn candidates(&self, text: &str, mode: Mode) -> Vec<DateCandidate> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let possibilities = self.token_possibilities(text, mode);
        let mut candidates: Vec<DateCandidate> = self
            .sequences(mode, possibilities.len())
            .into_iter()
            .filter_map(|sequence| self.bind(&sequence, &possibilities))
            .collect();
        candidates.sort_by(|a, b| b.rank.cmp(&a.rank));
        trace!(text, count = candidates.len(), "date candidates");
        candidates
    }

    fn sequences(&self, mode: Mode, length: usize) -> Vec<Sequence> {
        let dates = match self.style {
            DateStyle::DayFirst => &self.config.day_first,
            DateStyle::MonthFirst => &self.config.month_first,
        };
        let mut sequences: Vec<Sequence> = match mode {
            Mode::Date | Mode::Auto => dates.iter().filter(|s| s.len() == length).cloned().collect(),
            Mode::Time => self.config.time.iter().filter(|s| s.len() == length).cloned().collect(),
            Mode::DateTime => Vec::new(),
        };
        if matches!(mode, Mode::DateTime | Mode::Auto) {
            for date in dates {
                for time in &self.config.time {
                    if date.len() + time.len() == length {
                        sequences.push(date.iter().chain(time).copied().collect());
                    }
                }
            }
        }
        sequences
    }

    fn token_possibilities(&self, text: &str, mode: Mode) -> Vec<Possibilities> {
        let chars: Vec<char> = text.chars().collect();
        let mut tokens = tokenize(text);
        let offset = match mode {
            Mode::Date => None,
            _ => take_offset_suffix(&chars, &mut tokens),
        };
        let mut result: Vec<Possibilities> =
            tokens.iter().map(|token| classify(token, mode)).filter(|p| !p.is_empty()).collect();
        if let Some(seconds) = offset {
            result.push(HashMap::from([(Component::Offset, Possibility { value: seconds, specific: false })]));
        }
        result
    }

    fn bind(&self, sequence: &[Component], possibilities: &[Possibilities]) -> Option<DateCandidate> {
        let mut values: HashMap<Component, Possibility> = HashMap::with_capacity(sequence.len());
        for (component, options) in sequence.iter().zip(possibilities) {
            values.insert(*component, *options.get(component)?);
        }
        Some(self.build(&values))
    }

    fn build(&self, values: &HashMap<Component, Possibility>) -> DateCandidate {
        let get = |component| values.get(&component).map(|p| p.value);
        let mut candidate = DateCandidate::default();
        let mut valid = true;

        if let Some(month) = values.get(&Component::Month) {
            let current_year = self.now.with_timezone(&self.timezone).year();
            let year = get(Component::Year).map_or(current_year, |y| self.config.expand_year(y as i32, current_year));
            candidate.year = Some(year);
            candidate.month = Some(month.value as u32);
            candidate.day = Some(get(Component::Day).unwrap_or(1) as u32);
            valid &= candidate.date().is_some();
            candidate.rank += u8::from(month.specific);
            candidate.rank += u8::from(values.get(&Component::Year).is_some_and(|y| y.specific));
        }

        if let Some(combined) = get(Component::HourAndMinute) {
            candidate.hour = Some((combined / 100) as u32);
            candidate.minute = Some((combined % 100) as u32);
            candidate.second = Some(0);
            candidate.nanos = Some(0);
        } else if let (Some(hour), Some(minute)) = (get(Component::Hour), get(Component::Minute)) {
            let hour = match get(Component::AmPm) {
                Some(AM) if hour == 12 => 0,
                Some(PM) if hour < 12 => hour + 12,
                _ => hour,
            };
            candidate.hour = Some(hour as u32);
            candidate.minute = Some(minute as u32);
            candidate.second = Some(get(Component::Second).unwrap_or(0) as u32);
            candidate.nanos = Some(get(Component::Nano).unwrap_or(0) as u32);
        }
        if candidate.hour.is_some() {
            valid &= candidate.time().is_some();
        }

        candidate.offset = get(Component::Offset).map(|seconds| seconds as i32);
        candidate.valid = valid && (candidate.month.is_some() || candidate.hour.is_some());
        candidate
    }
}

/// Every role `token` could play, ignoring its neighbours.
fn classify(token: &Token, mode: Mode) -> Possibilities {
    let mut possibilities = Possibilities::new();
    let text = token.text.to_lowercase();
    let number = text.parse::<i64>();
    let mut add = |component, value, specific| {
        possibilities.insert(component, Possibility { value, specific });
    };

    match (token.kind, number) {
        // longer runs than any component are noise
        (TokenType::Numeric, Err(_)) => {}
        (TokenType::Numeric, Ok(number)) => {
            let length = text.len();
            if mode != Mode::Time {
                if (1..=9999).contains(&number) && (length == 2 || length == 4) {
                    add(Component::Year, number, length == 4);
                }
                if (1..=12).contains(&number) {
                    add(Component::Month, number, false);
                }
                if (1..=31).contains(&number) {
                    add(Component::Day, number, false);
                }
            }
            if mode != Mode::Date {
                if (0..=23).contains(&number) {
                    add(Component::Hour, number, false);
                }
                if (0..=59).contains(&number) {
                    add(Component::Minute, number, false);
                    add(Component::Second, number, false);
                }
                match length {
                    3 => add(Component::Nano, number * 1_000_000, false),
                    6 => add(Component::Nano, number * 1_000, false),
                    9 => add(Component::Nano, number, false),
                    _ => {}
                }
                if length == 4 && number / 100 <= 23 && number % 100 <= 59 {
                    add(Component::HourAndMinute, number, false);
                }
            }
        }
        (TokenType::Alphabetic, _) => {
            if mode != Mode::Time {
                if let Some(month) = MONTHS_BY_ALIAS.get(text.as_str()) {
                    add(Component::Month, i64::from(*month), true);
                }
            }
            if mode != Mode::Date {
                match text.as_str() {
                    "am" => add(Component::AmPm, AM, false),
                    "pm" => add(Component::AmPm, PM, false),
                    "z" => add(Component::Offset, 0, false),
                    _ => {}
                }
            }
        }
    }
    possibilities
}

/// Removes a trailing `+HH:MM`, `+HHMM` or `+HH` (or `-`) from `tokens` and
/// returns it in seconds. Only recognized after a `:`-separated time so a
/// dash between date parts is never read as a sign.
fn take_offset_suffix(chars: &[char], tokens: &mut Vec<Token>) -> Option<i64> {
    let last = tokens.last()?;
    if last.kind != TokenType::Numeric || chars[last.end..].iter().any(|c| !c.is_whitespace()) {
        return None;
    }
    let (first, minutes) = match tokens.len() {
        n if n >= 2
            && last.text.len() == 2
            && tokens[n - 2].kind == TokenType::Numeric
            && tokens[n - 2].text.len() == 2
            && tokens[n - 2].end + 1 == last.start
            && chars[tokens[n - 2].end] == ':' =>
        {
            (n - 2, last.text.parse::<i64>().ok()?)
        }
        n => (n - 1, 0),
    };
    let head = &tokens[first];
    let sign = match head.start.checked_sub(1).map(|i| chars[i]) {
        Some('+') => 1,
        Some('-') => -1,
        _ => return None,
    };
    if first == 0 || !chars[..head.start].contains(&':') {
        return None;
    }
    let (hours, minutes) = match (head.text.len(), first == tokens.len() - 1) {
        (4, true) => {
            let combined = head.text.parse::<i64>().ok()?;
            (combined / 100, combined % 100)
        }
        (2, _) => (head.text.parse::<i64>().ok()?, minutes),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    tokens.truncate(first);
    Some(sign * (hours * 3600 + minutes * 60))
}

const MONTH_ALIASES: [&[&str]; 12] = [
    &["january", "jan", "janvier", "janv", "enero", "ene", "janeiro"],
    &["february", "feb", "février", "fevrier", "févr", "fév", "fev", "febrero", "fevereiro"],
    &["march", "mar", "mars", "marzo", "março", "marco"],
    &["april", "apr", "avril", "avr", "abril", "abr"],
    &["may", "mai", "mayo", "maio"],
    &["june", "jun", "juin", "junio", "junho"],
    &["july", "jul", "juillet", "juil", "julio", "julho"],
    &["august", "aug", "août", "aout", "agosto", "ago"],
    &["september", "sep", "sept", "septembre", "septiembre", "set", "setembro"],
    &["october", "oct", "octobre", "octubre", "outubro", "out"],
    &["november", "nov", "novembre", "noviembre", "novembro"],
    &["december", "dec", "décembre", "decembre", "déc", "diciembre", "dic", "dezembro", "dez"],
];

static MONTHS_BY_ALIAS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    let mut aliases = HashMap::new();
    for (index, names) in MONTH_ALIASES.iter().enumerate() {
        for name in names.iter() {
            aliases.insert(*name, index as u32 + 1);
        }
    }
    aliases
});

/// ISO-8601 with offset, microseconds only when the fraction is non-zero.
pub fn format_iso_datetime(value: &DateTime<FixedOffset>) -> String {
    if value.nanosecond() == 0 {
        value.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
    } else {
        value.format("%Y-%m-%dT%H:%M:%S%.6f%:z").to_string()
    }
}

/// The UTC millisecond form used at the JSON boundary, e.g. `2014-10-03T09:41:12.790Z`.
pub fn format_json_date(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_json_date(text: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|value| value.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parser(config: &DateParserConfig, style: DateStyle) -> DateParser<'_> {
        let now = Utc.with_ymd_and_hms(2015, 8, 12, 10, 0, 0).unwrap();
        DateParser::new(config, now, chrono_tz::Africa::Kigali, style)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn ambiguous_pairs_follow_style() {
        let config = DateParserConfig::default();
        let day_first = parser(&config, DateStyle::DayFirst).disambiguate("12/5/15").unwrap();
        assert_eq!((day_first.day, day_first.month, day_first.year), (Some(12), Some(5), Some(2015)));

        let month_first = parser(&config, DateStyle::MonthFirst).disambiguate("12/5/15").unwrap();
        assert_eq!((month_first.day, month_first.month), (Some(5), Some(12)));
    }

    #[test]
    fn day_over_twelve_is_forced() {
        let config = DateParserConfig::default();
        let candidate = parser(&config, DateStyle::MonthFirst).disambiguate("31/5/15").unwrap();
        assert_eq!((candidate.day, candidate.month), (Some(31), Some(5)));
    }

    #[test]
    fn named_months_rank_higher() {
        let config = DateParserConfig::default();
        let candidate = parser(&config, DateStyle::DayFirst).disambiguate("1 Feb 2034").unwrap();
        assert_eq!(candidate.rank, 2);
        assert_eq!(candidate.date(), Some(ymd(2034, 2, 1)));
    }

    #[test]
    fn invalid_days_are_rejected() {
        let config = DateParserConfig::default();
        let p = parser(&config, DateStyle::DayFirst);
        assert!(p.disambiguate("31-02-99").is_err());
        assert!(p.disambiguate("29/2/15").is_err());
        assert_eq!(p.auto("29/2/16").unwrap(), Temporal::Date(ymd(2016, 2, 29)));
    }

    #[test]
    fn offset_suffixes() {
        let config = DateParserConfig::default();
        let p = parser(&config, DateStyle::DayFirst);
        let Temporal::DateTime(dt) = p.auto("2034-02-01T14:55:41-0530").unwrap() else { panic!() };
        assert_eq!(dt.offset().local_minus_utc(), -(5 * 3600 + 30 * 60));
        let Temporal::DateTime(dt) = p.auto("2034-02-01 14:55 +03").unwrap() else { panic!() };
        assert_eq!(dt.offset().local_minus_utc(), 3 * 3600);
        assert_eq!(p.auto("2/25-70").unwrap(), Temporal::Date(ymd(1970, 2, 25)));
    }

    #[test]
    fn month_aliases_cover_four_languages() {
        assert_eq!(MONTHS_BY_ALIAS.get("février"), Some(&2));
        assert_eq!(MONTHS_BY_ALIAS.get("diciembre"), Some(&12));
        assert_eq!(MONTHS_BY_ALIAS.get("outubro"), Some(&10));
        assert_eq!(MONTHS_BY_ALIAS.get("sept"), Some(&9));
    }

    #[test]
    fn iso_format_omits_zero_fraction() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let whole = tz.with_ymd_and_hms(2014, 10, 3, 9, 41, 12).unwrap();
        assert_eq!(format_iso_datetime(&whole), "2014-10-03T09:41:12+00:00");
        let fractional = whole + Duration::milliseconds(790);
        assert_eq!(format_iso_datetime(&fractional), "2014-10-03T09:41:12.790000+00:00");
    }

    #[test]
    fn json_dates_use_utc_milliseconds() {
        let value = parse_json_date("2014-10-03T09:41:12.790Z").unwrap();
        assert_eq!(format_json_date(&value), "2014-10-03T09:41:12.790Z");
        assert!(parse_json_date("yesterday").is_err());
    }
}
