use serde::Serialize;
use thiserror::Error;

/// Machine-discriminable category of an evaluation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UndefinedVariable,
    InvalidDate,
    UnknownFunction,
    ArgumentCount,
    ArgumentType,
    /// An `@(` expression with no matching `)`. Expected while typing.
    UnbalancedExpression,
    InvalidExpression,
    /// A function accepted its arguments but could not produce a value.
    FunctionFailed,
}

impl ErrorKind {
    /// Stable identifier for the kind, suitable for clients.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::UndefinedVariable => "undefined_variable",
            ErrorKind::InvalidDate => "invalid_date",
            ErrorKind::UnknownFunction => "unknown_function",
            ErrorKind::ArgumentCount => "argument_count_error",
            ErrorKind::ArgumentType => "argument_type_error",
            ErrorKind::UnbalancedExpression => "unbalanced_expression",
            ErrorKind::InvalidExpression => "invalid_expression",
            ErrorKind::FunctionFailed => "function_failed",
        }
    }
}

/// A recoverable, per-expression failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct EvaluationError {
    pub kind: ErrorKind,
    pub message: String,
    /// The offending path, token or function name, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl EvaluationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), subject: None }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn undefined_variable(path: &str) -> Self {
        Self::new(ErrorKind::UndefinedVariable, format!("Undefined variable: {path}")).with_subject(path)
    }

    pub fn invalid_date(text: &str) -> Self {
        Self::new(ErrorKind::InvalidDate, format!("Can't parse '{text}' as a date")).with_subject(text)
    }

    pub fn unknown_function(name: &str) -> Self {
        Self::new(ErrorKind::UnknownFunction, format!("Undefined function: {name}")).with_subject(name)
    }

    pub fn argument_count(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentCount, message)
    }

    pub fn argument_type(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentType, message)
    }

    pub fn unbalanced(expression: &str) -> Self {
        Self::new(ErrorKind::UnbalancedExpression, format!("Expression is not closed: {expression}"))
            .with_subject(expression)
    }

    pub fn invalid_expression(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidExpression, message)
    }

    pub fn function_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FunctionFailed, message)
    }
}

pub type Result<T> = std::result::Result<T, EvaluationError>;

/// Contract violations found while building a function registry. These are
/// programming errors and are reported once, at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("function name is empty")]
    EmptyName,

    #[error("function {0} is registered more than once")]
    Duplicate(String),

    #[error("function {function}: parameter '{param}' has no default but follows a defaulted parameter")]
    MisplacedDefault { function: String, param: String },

    #[error("function {function}: variadic parameter '{param}' is not last")]
    MisplacedVariadic { function: String, param: String },

    #[error("function {0} has no body")]
    MissingBody(String),
}

/// Failures reading a serialized evaluation context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid context JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("invalid 'now' timestamp: {0}")]
    InvalidNow(String),
}

/// Failures loading evaluator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_stable_codes() {
        assert_eq!(ErrorKind::ArgumentCount.code(), "argument_count_error");
        assert_eq!(ErrorKind::ArgumentType.code(), "argument_type_error");
        assert_eq!(ErrorKind::UndefinedVariable.code(), "undefined_variable");
    }

    #[test]
    fn undefined_variable_keeps_original_path() {
        let err = EvaluationError::undefined_variable("Contact.Nme");
        assert_eq!(err.to_string(), "Undefined variable: Contact.Nme");
        assert_eq!(err.subject.as_deref(), Some("Contact.Nme"));
    }
}
