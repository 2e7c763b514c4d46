use serde::Serialize;
use tracing::debug;

use crate::config::EvaluatorConfig;
use crate::context::EvaluationContext;
use crate::conversions;
use crate::errors::{EvaluationError, Result};
use crate::expression::{CallExpressionEngine, ExpressionEngine};
use crate::scanner::{ExpressionSpan, Scanner};
use crate::utils::urlquote;
use crate::value::Value;

/// Rendered text plus the errors of any expressions left as typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateOutcome {
    pub output: String,
    pub errors: Vec<EvaluationError>,
}

/// Renders templates by substituting each expression's value.
pub struct Evaluator {
    scanner: Scanner,
    engine: Box<dyn ExpressionEngine>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(&EvaluatorConfig::default())
    }
}

impl Evaluator {
    pub fn new(config: &EvaluatorConfig) -> Self {
        Self { scanner: config.scanner(), engine: Box::new(CallExpressionEngine::default()) }
    }

    /// Swaps the engine used for advanced expressions.
    pub fn with_engine(mut self, engine: impl ExpressionEngine + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Substitutes every expression in `template`. One failing expression
    /// doesn't stop the rest; it's echoed as written and its error kept.
    pub fn evaluate_template(&self, template: &str, ctx: &EvaluationContext, url_encode: bool) -> TemplateOutcome {
        let chars: Vec<char> = template.chars().collect();
        let mut output = String::with_capacity(template.len());
        let mut errors = Vec::new();
        let mut last = 0;

        for span in self.scanner.scan(template) {
            output.push_str(&self.unescape(&chars[last..span.start]));
            last = span.end;
            if !span.closed && span.is_advanced() {
                output.push_str(&span.text);
                continue;
            }
            match self.evaluate_span(&span, ctx).and_then(|value| conversions::to_string(&value, ctx)) {
                Ok(text) if url_encode => output.push_str(&urlquote(&text)),
                Ok(text) => output.push_str(&text),
                Err(err) => {
                    debug!(expression = %span.text, kind = err.kind.code(), error = %err, "expression failed");
                    output.push_str(&span.text);
                    errors.push(err);
                }
            }
        }
        output.push_str(&self.unescape(&chars[last..]));

        TemplateOutcome { output, errors }
    }

    /// Evaluates each expression in `template` separately.
    pub fn evaluate_spans(&self, template: &str, ctx: &EvaluationContext) -> Vec<(ExpressionSpan, Result<Value>)> {
        self.scanner
            .scan(template)
            .into_iter()
            .map(|span| {
                let result = self.evaluate_span(&span, ctx);
                (span, result)
            })
            .collect()
    }

    /// Evaluates an expression body without its prefix, e.g. `contact.name`
    /// or `UPPER(contact.name)`.
    pub fn evaluate_expression(&self, expression: &str, ctx: &EvaluationContext) -> Result<Value> {
        self.engine.evaluate(expression, ctx)
    }

    fn evaluate_span(&self, span: &ExpressionSpan, ctx: &EvaluationContext) -> Result<Value> {
        if !span.is_advanced() {
            return ctx.resolve_variable(span.body());
        }
        if !span.closed {
            return Err(EvaluationError::unbalanced(&span.text));
        }
        self.engine.evaluate(span.body(), ctx)
    }

    /// Literal text with each doubled prefix collapsed to one.
    fn unescape(&self, literal: &[char]) -> String {
        let prefix = self.scanner.prefix();
        let mut out = String::with_capacity(literal.len());
        let mut chars = literal.iter().peekable();
        while let Some(&c) = chars.next() {
            out.push(c);
            if c == prefix && chars.peek() == Some(&&prefix) {
                chars.next();
            }
        }
        out
    }
}
