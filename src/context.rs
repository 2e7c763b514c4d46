use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::config::DEFAULT_MAX_TEXT_LENGTH;
use crate::dates::{parse_json_date, DateParser, DateParserConfig, DateStyle};
use crate::errors::{ContextError, Result};
use crate::value::{Value, VariableMap};
use crate::variables;

/// Variables and date options for one evaluation request.
///
/// `now` is captured once, so every expression in a request sees the same
/// instant.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub variables: VariableMap,
    pub timezone: Tz,
    pub date_style: DateStyle,
    pub now: DateTime<Utc>,
    date_config: Arc<DateParserConfig>,
    max_text_length: usize,
}

/// The JSON form accepted at the boundary.
#[derive(Debug, Deserialize)]
struct SerializedContext {
    #[serde(default)]
    variables: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default)]
    date_style: DateStyle,
    #[serde(default)]
    now: Option<String>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new(VariableMap::new(), Tz::UTC, DateStyle::DayFirst)
    }
}

impl EvaluationContext {
    pub fn new(variables: VariableMap, timezone: Tz, date_style: DateStyle) -> Self {
        Self {
            variables,
            timezone,
            date_style,
            now: Utc::now(),
            date_config: Arc::default(),
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Replaces the date pattern tables and two-digit year window.
    pub fn with_date_config(mut self, config: Arc<DateParserConfig>) -> Self {
        self.date_config = config;
        self
    }

    /// Caps the size in bytes of text that functions may build.
    pub fn with_max_text_length(mut self, max_text_length: usize) -> Self {
        self.max_text_length = max_text_length;
        self
    }

    pub fn max_text_length(&self) -> usize {
        self.max_text_length
    }

    /// Reads a context such as
    /// `{"variables": {...}, "timezone": "Africa/Kigali", "date_style": "day_first", "now": "2015-10-03T09:41:12.790Z"}`.
    pub fn from_json(json: &str) -> std::result::Result<Self, ContextError> {
        Self::from_json_value(serde_json::from_str(json)?)
    }

    pub fn from_json_value(json: serde_json::Value) -> std::result::Result<Self, ContextError> {
        let serialized: SerializedContext = serde_json::from_value(json)?;
        let timezone: Tz = serialized
            .timezone
            .parse()
            .map_err(|_| ContextError::UnknownTimezone(serialized.timezone.clone()))?;
        let variables = serialized.variables.into_iter().map(|(key, value)| (key, Value::from(value))).collect();
        let mut context = Self::new(variables, timezone, serialized.date_style);
        if let Some(now) = serialized.now {
            context.now = parse_json_date(&now).map_err(|_| ContextError::InvalidNow(now))?;
        }
        Ok(context)
    }

    pub fn resolve_variable(&self, path: &str) -> Result<Value> {
        variables::resolve(&self.variables, path)
    }

    /// Adds or replaces a top-level variable. Not for use mid-evaluation.
    pub fn put_variable(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn date_parser(&self) -> DateParser<'_> {
        DateParser::new(&self.date_config, self.now, self.timezone, self.date_style)
    }

    pub fn date_config(&self) -> &DateParserConfig {
        &self.date_config
    }

    /// `strftime` pattern for dates shown to users in this context's style.
    pub fn date_format(&self, include_time: bool) -> &'static str {
        match (self.date_style, include_time) {
            (DateStyle::DayFirst, false) => "%d-%m-%Y",
            (DateStyle::DayFirst, true) => "%d-%m-%Y %H:%M",
            (DateStyle::MonthFirst, false) => "%m-%d-%Y",
            (DateStyle::MonthFirst, true) => "%m-%d-%Y %H:%M",
        }
    }

    /// `now` in this context's timezone.
    pub fn now_local(&self) -> DateTime<FixedOffset> {
        self.now.with_timezone(&self.timezone).fixed_offset()
    }
}
