//! Evaluation of `@` expressions embedded in message templates.
//!
//! A template such as `Hi @contact.name, it's @(FORMAT_DATE(NOW()))` is
//! scanned for expressions, each expression is evaluated against an
//! [`EvaluationContext`], and the results are substituted back in.

pub mod config;
pub mod context;
pub mod conversions;
pub mod dates;
pub mod errors;
pub mod evaluator;
pub mod expression;
pub mod functions;
pub mod parser;
pub mod scanner;
pub mod utils;
pub mod value;
pub mod variables;

pub use config::EvaluatorConfig;
pub use context::EvaluationContext;
pub use dates::{DateParser, DateStyle};
pub use errors::{ErrorKind, EvaluationError, Result};
pub use evaluator::{Evaluator, TemplateOutcome};
pub use expression::{CallExpressionEngine, ExpressionEngine};
pub use functions::{FunctionRegistry, DEFAULT_FUNCTIONS};
pub use scanner::{ExpressionSpan, Scanner};
pub use value::{Value, VariableMap};

/// Renders `template` with the default configuration and builtin functions.
pub fn evaluate_template(template: &str, ctx: &EvaluationContext) -> TemplateOutcome {
    Evaluator::default().evaluate_template(template, ctx, false)
}
