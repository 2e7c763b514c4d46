use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::EvaluationContext;
use crate::dates::DateParserConfig;
use crate::errors::ConfigError;
use crate::scanner::Scanner;

pub const DEFAULT_PREFIX: char = '@';

pub const DEFAULT_TOP_LEVELS: [&str; 6] = ["channel", "contact", "date", "extra", "flow", "step"];

/// Largest text, in bytes, a function may produce.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 1 << 20;

/// Evaluator settings. Every field has a default, so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub expression_prefix: char,
    pub allowed_top_levels: Vec<String>,
    pub dates: DateParserConfig,
    pub max_text_length: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            expression_prefix: DEFAULT_PREFIX,
            allowed_top_levels: DEFAULT_TOP_LEVELS.iter().map(|s| s.to_string()).collect(),
            dates: DateParserConfig::default(),
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }
}

impl EvaluatorConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn scanner(&self) -> Scanner {
        Scanner::new(self.expression_prefix, &self.allowed_top_levels)
    }

    pub fn date_config(&self) -> Arc<DateParserConfig> {
        Arc::new(self.dates.clone())
    }

    /// Applies the date tables and text limit to a context.
    pub fn configure(&self, ctx: EvaluationContext) -> EvaluationContext {
        ctx.with_date_config(self.date_config()).with_max_text_length(self.max_text_length)
    }
}
