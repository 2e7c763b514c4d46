//! Named functions callable from expressions.
//!
//! Libraries declare their functions explicitly with [`FunctionDef`]; a
//! [`FunctionRegistry`] indexes them by canonical name and dispatches calls,
//! binding defaults and variadic tails and coercing each argument to its
//! declared type before the body runs.

pub mod custom;
pub mod excel;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use itertools::Itertools;
use once_cell::sync::Lazy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::context::EvaluationContext;
use crate::conversions;
use crate::errors::{ErrorKind, EvaluationError, RegistryError, Result};
use crate::value::Value;

/// The type an argument is coerced to before a function body sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Any,
    Number,
    Integer,
    Text,
    Boolean,
    /// A date, or a datetime kept as one.
    Date,
    DateTime,
    Time,
}

impl ParamType {
    fn coerce(self, value: &Value, ctx: &EvaluationContext) -> Result<Value> {
        Ok(match self {
            ParamType::Any => value.clone(),
            ParamType::Number => Value::Number(conversions::to_decimal(value, ctx)?),
            ParamType::Integer => Value::from(conversions::to_integer(value, ctx)?),
            ParamType::Text => Value::Text(conversions::to_string(value, ctx)?),
            ParamType::Boolean => Value::Bool(conversions::to_boolean(value, ctx)?),
            ParamType::Date => conversions::to_date_or_datetime(value, ctx)?,
            ParamType::DateTime => Value::DateTime(conversions::to_datetime(value, ctx)?),
            ParamType::Time => Value::Time(conversions::to_time(value, ctx)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<Value>,
    pub variadic: bool,
}

impl Param {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

type Body = Arc<dyn Fn(&EvaluationContext, &Arguments) -> Result<Value> + Send + Sync>;

/// A registered function. Immutable once in a registry.
#[derive(Clone)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<Param>,
    pub is_variadic: bool,
    pub takes_context: bool,
    body: Body,
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("is_variadic", &self.is_variadic)
            .field("takes_context", &self.takes_context)
            .finish_non_exhaustive()
    }
}

impl FunctionDescriptor {
    fn fixed_params(&self) -> &[Param] {
        if self.is_variadic {
            &self.params[..self.params.len() - 1]
        } else {
            &self.params
        }
    }

    fn required(&self) -> usize {
        self.fixed_params().iter().filter(|p| !p.has_default()).count()
    }
}

/// Declaration of a library function, in the shape it was written:
/// the declared name may carry a leading underscore.
pub struct FunctionDef {
    declared_name: String,
    description: String,
    public: bool,
    params: Vec<Param>,
    takes_context: bool,
    body: Option<Body>,
}

impl FunctionDef {
    pub fn new(declared_name: &str, description: &str) -> Self {
        Self {
            declared_name: declared_name.to_string(),
            description: description.to_string(),
            public: true,
            params: Vec::new(),
            takes_context: false,
            body: None,
        }
    }

    /// Helpers that libraries keep for themselves are never registered.
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn param(mut self, name: &str, ty: ParamType) -> Self {
        self.params.push(Param { name: name.to_string(), ty, default: None, variadic: false });
        self
    }

    pub fn param_default(mut self, name: &str, ty: ParamType, default: impl Into<Value>) -> Self {
        self.params.push(Param { name: name.to_string(), ty, default: Some(default.into()), variadic: false });
        self
    }

    /// Captures every remaining argument. Must be the last parameter.
    pub fn variadic(mut self, name: &str, ty: ParamType) -> Self {
        self.params.push(Param { name: name.to_string(), ty, default: None, variadic: true });
        self
    }

    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Value> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(move |_ctx: &EvaluationContext, args: &Arguments| body(args)));
        self
    }

    pub fn body_with_context<F>(mut self, body: F) -> Self
    where
        F: Fn(&EvaluationContext, &Arguments) -> Result<Value> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self.takes_context = true;
        self
    }

    /// Upper-cased with one leading underscore removed: `_abs` is `ABS`.
    pub fn canonical_name(&self) -> String {
        let name = self.declared_name.strip_prefix('_').unwrap_or(&self.declared_name);
        name.to_uppercase()
    }

    fn into_descriptor(self) -> std::result::Result<FunctionDescriptor, RegistryError> {
        let name = self.canonical_name();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let mut seen_default = false;
        for (index, param) in self.params.iter().enumerate() {
            if param.variadic && index + 1 != self.params.len() {
                return Err(RegistryError::MisplacedVariadic { function: name, param: param.name.clone() });
            }
            if param.has_default() {
                seen_default = true;
            } else if seen_default && !param.variadic {
                return Err(RegistryError::MisplacedDefault { function: name, param: param.name.clone() });
            }
        }
        let body = self.body.ok_or_else(|| RegistryError::MissingBody(name.clone()))?;
        Ok(FunctionDescriptor {
            is_variadic: self.params.last().is_some_and(|p| p.variadic),
            name,
            description: self.description,
            params: self.params,
            takes_context: self.takes_context,
            body,
        })
    }
}

/// A named group of function declarations.
pub struct Library {
    pub name: &'static str,
    pub functions: Vec<FunctionDef>,
}

/// Arguments bound and coerced for one call. A variadic tail is the last
/// value, as a list.
#[derive(Debug, Clone, PartialEq)]
pub struct Arguments {
    values: Vec<Value>,
}

fn unexpected(index: usize, expected: &str, found: &Value) -> EvaluationError {
    EvaluationError::argument_type(format!("argument {} should be {expected}, got {}", index + 1, found.type_name()))
}

impl Arguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(index).unwrap_or(&NULL)
    }

    pub fn decimal(&self, index: usize) -> Result<Decimal> {
        match self.value(index) {
            Value::Number(n) => Ok(*n),
            other => Err(unexpected(index, "a number", other)),
        }
    }

    pub fn integer(&self, index: usize) -> Result<i64> {
        match self.value(index) {
            Value::Number(n) => n.trunc().to_i64().ok_or_else(|| unexpected(index, "an integer", &Value::Number(*n))),
            other => Err(unexpected(index, "an integer", other)),
        }
    }

    pub fn text(&self, index: usize) -> Result<&str> {
        match self.value(index) {
            Value::Text(s) => Ok(s),
            other => Err(unexpected(index, "text", other)),
        }
    }

    pub fn boolean(&self, index: usize) -> Result<bool> {
        match self.value(index) {
            Value::Bool(b) => Ok(*b),
            other => Err(unexpected(index, "a boolean", other)),
        }
    }

    /// The calendar date of a date or datetime argument.
    pub fn date(&self, index: usize) -> Result<NaiveDate> {
        match self.value(index) {
            Value::Date(d) => Ok(*d),
            Value::DateTime(dt) => Ok(dt.date_naive()),
            other => Err(unexpected(index, "a date", other)),
        }
    }

    pub fn datetime(&self, index: usize) -> Result<DateTime<FixedOffset>> {
        match self.value(index) {
            Value::DateTime(dt) => Ok(*dt),
            other => Err(unexpected(index, "a datetime", other)),
        }
    }

    pub fn time(&self, index: usize) -> Result<NaiveTime> {
        match self.value(index) {
            Value::Time(t) => Ok(*t),
            other => Err(unexpected(index, "a time", other)),
        }
    }

    /// The variadic tail.
    pub fn rest(&self) -> &[Value] {
        match self.values.last() {
            Some(Value::List(items)) => items,
            _ => &[],
        }
    }

    pub fn rest_decimals(&self) -> Result<Vec<Decimal>> {
        Arguments::new(self.rest().to_vec()).collect_with(Arguments::decimal)
    }

    pub fn rest_booleans(&self) -> Result<Vec<bool>> {
        Arguments::new(self.rest().to_vec()).collect_with(Arguments::boolean)
    }

    pub fn rest_texts(&self) -> Result<Vec<String>> {
        Arguments::new(self.rest().to_vec()).collect_with(|args, i| args.text(i).map(str::to_string))
    }

    fn collect_with<T>(&self, get: impl Fn(&Self, usize) -> Result<T>) -> Result<Vec<T>> {
        (0..self.len()).map(|i| get(self, i)).collect()
    }
}

/// One function in a [`FunctionRegistry::build_listing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionListing {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamListing>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamListing {
    pub name: String,
    pub optional: bool,
    pub vararg: bool,
}

/// Canonical name to descriptor. Built once, then shared read-only.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    inner: Arc<HashMap<String, Arc<FunctionDescriptor>>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.inner.keys().sorted()).finish()
    }
}

/// The registry with the builtin libraries, for callers that don't customize.
pub static DEFAULT_FUNCTIONS: Lazy<FunctionRegistry> =
    Lazy::new(|| FunctionRegistry::with_builtins().expect("builtin function libraries are well formed"));

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> std::result::Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(excel::library())?.register(custom::library())?;
        Ok(registry)
    }

    /// Adds every public function of `library`. Nothing is added when any
    /// declaration is malformed or clashes with a registered name.
    pub fn register(&mut self, library: Library) -> std::result::Result<&mut Self, RegistryError> {
        let descriptors = library
            .functions
            .into_iter()
            .filter(|def| def.public)
            .map(FunctionDef::into_descriptor)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut names = HashSet::new();
        for descriptor in &descriptors {
            if self.inner.contains_key(&descriptor.name) || !names.insert(descriptor.name.as_str()) {
                return Err(RegistryError::Duplicate(descriptor.name.clone()));
            }
        }

        let count = descriptors.len();
        let map = Arc::make_mut(&mut self.inner);
        map.extend(descriptors.into_iter().map(|descriptor| (descriptor.name.clone(), Arc::new(descriptor))));
        debug!(library = library.name, count, "registered function library");
        Ok(self)
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<Arc<FunctionDescriptor>> {
        self.inner.get(&name.to_uppercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Calls `name` with positional `arguments`.
    pub fn invoke(&self, ctx: &EvaluationContext, name: &str, arguments: Vec<Value>) -> Result<Value> {
        let function = self.get(name).ok_or_else(|| EvaluationError::unknown_function(name))?;
        let bound = bind(&function, ctx, &arguments)?;
        (function.body)(ctx, &bound).map_err(|err| match err.kind {
            ErrorKind::FunctionFailed => {
                debug!(function = %function.name, error = %err, "function failed");
                let shown = arguments.iter().map(|arg| pretty_argument(arg, ctx)).join(", ");
                EvaluationError::function_failed(format!("Error calling function {} with arguments {shown}", function.name))
                    .with_subject(function.name.clone())
            }
            _ => err,
        })
    }

    /// Every function, sorted by name.
    pub fn build_listing(&self) -> Vec<FunctionListing> {
        self.inner
            .values()
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .map(|function| FunctionListing {
                name: function.name.clone(),
                description: function.description.clone(),
                params: function
                    .params
                    .iter()
                    .map(|p| ParamListing { name: p.name.clone(), optional: p.has_default(), vararg: p.variadic })
                    .collect(),
            })
            .collect()
    }
}

fn bind(function: &FunctionDescriptor, ctx: &EvaluationContext, arguments: &[Value]) -> Result<Arguments> {
    let fixed = function.fixed_params();
    if arguments.len() < function.required() {
        return Err(EvaluationError::argument_count(format!("Too few arguments provided for function {}", function.name))
            .with_subject(function.name.clone()));
    }
    if !function.is_variadic && arguments.len() > fixed.len() {
        return Err(EvaluationError::argument_count(format!("Too many arguments provided for function {}", function.name))
            .with_subject(function.name.clone()));
    }

    let mut values = Vec::with_capacity(function.params.len());
    for (index, param) in fixed.iter().enumerate() {
        let supplied = arguments.get(index).or(param.default.as_ref()).ok_or_else(|| {
            EvaluationError::argument_count(format!("Missing argument '{}' for function {}", param.name, function.name))
        })?;
        values.push(param.ty.coerce(supplied, ctx)?);
    }
    if let Some(tail) = function.params.last().filter(|p| p.variadic) {
        let rest = arguments.get(fixed.len()..).unwrap_or_default();
        let coerced = rest.iter().map(|value| tail.ty.coerce(value, ctx)).collect::<Result<Vec<_>>>()?;
        values.push(Value::List(coerced));
    }
    Ok(Arguments::new(values))
}

fn pretty_argument(value: &Value, ctx: &EvaluationContext) -> String {
    match value {
        Value::Text(s) => format!("\"{s}\""),
        other => conversions::to_string(other, ctx).unwrap_or_else(|_| other.to_string()),
    }
}

/// Shorthand for a body rejecting its arguments.
pub(crate) fn failed(message: impl Into<String>) -> EvaluationError {
    EvaluationError::function_failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_library() -> Library {
        Library {
            name: "test",
            functions: vec![
                FunctionDef::new("foo", "Doubles a number")
                    .param("a", ParamType::Integer)
                    .body(|args| Ok(Value::from(args.integer(0)? * 2))),
                FunctionDef::new("_bar", "Adds two numbers")
                    .param("a", ParamType::Integer)
                    .param_default("b", ParamType::Integer, 2)
                    .body(|args| Ok(Value::from(args.integer(0)? + args.integer(1)?))),
                FunctionDef::new("doh", "Multiplies by the number of extra arguments")
                    .param("a", ParamType::Integer)
                    .variadic("args", ParamType::Any)
                    .body(|args| Ok(Value::from(args.integer(0)? * args.rest().len() as i64))),
                FunctionDef::new("zed", "Not callable").private().body(|_| Ok(Value::Null)),
            ],
        }
    }

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        registry.register(test_library()).unwrap();
        registry
    }

    #[test]
    fn invokes_with_defaults_and_varargs() {
        let registry = registry();
        let ctx = EvaluationContext::default();
        assert_eq!(registry.invoke(&ctx, "foo", vec![Value::from(12)]).unwrap(), Value::from(24));
        assert_eq!(registry.invoke(&ctx, "FOO", vec![Value::from(12)]).unwrap(), Value::from(24));
        assert_eq!(registry.invoke(&ctx, "bar", vec![Value::from(12), Value::from(5)]).unwrap(), Value::from(17));
        assert_eq!(registry.invoke(&ctx, "bar", vec![Value::from(12)]).unwrap(), Value::from(14));
        let doh = vec![Value::from(12), Value::from(1), Value::from(2), Value::from(3)];
        assert_eq!(registry.invoke(&ctx, "doh", doh).unwrap(), Value::from(36));
    }

    #[test]
    fn private_and_unknown_functions_are_unreachable() {
        let registry = registry();
        let ctx = EvaluationContext::default();
        assert_eq!(registry.invoke(&ctx, "zed", vec![Value::from(12)]).unwrap_err().kind, ErrorKind::UnknownFunction);
        assert_eq!(registry.invoke(&ctx, "nope", vec![]).unwrap_err().kind, ErrorKind::UnknownFunction);
    }

    #[test]
    fn argument_count_and_type_errors() {
        let registry = registry();
        let ctx = EvaluationContext::default();
        let err = registry.invoke(&ctx, "foo", vec![]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ArgumentCount);
        assert_eq!(err.message, "Too few arguments provided for function FOO");
        let err = registry.invoke(&ctx, "foo", vec![Value::from(1), Value::from(2)]).unwrap_err();
        assert_eq!(err.message, "Too many arguments provided for function FOO");
        let map = Value::Map(Default::default());
        assert_eq!(registry.invoke(&ctx, "foo", vec![map]).unwrap_err().kind, ErrorKind::ArgumentType);
    }

    #[test]
    fn listing_is_sorted_and_hides_private_functions() {
        let listing = registry().build_listing();
        assert_eq!(listing.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(), vec!["BAR", "DOH", "FOO"]);
        assert_eq!(
            listing[0].params,
            vec![
                ParamListing { name: "a".into(), optional: false, vararg: false },
                ParamListing { name: "b".into(), optional: true, vararg: false },
            ]
        );
        assert!(listing[1].params[1].vararg);
    }

    #[test]
    fn malformed_libraries_are_rejected() {
        let mut registry = registry();
        let duplicate = Library { name: "dup", functions: vec![FunctionDef::new("FOO", "").body(|_| Ok(Value::Null))] };
        assert_eq!(registry.register(duplicate).unwrap_err(), RegistryError::Duplicate("FOO".into()));

        let misplaced = Library {
            name: "bad",
            functions: vec![FunctionDef::new("bad", "")
                .param_default("a", ParamType::Any, 1)
                .param("b", ParamType::Any)
                .body(|_| Ok(Value::Null))],
        };
        assert!(matches!(registry.register(misplaced), Err(RegistryError::MisplacedDefault { .. })));

        let unnamed = Library { name: "empty", functions: vec![FunctionDef::new("_", "").body(|_| Ok(Value::Null))] };
        assert_eq!(registry.register(unnamed).unwrap_err(), RegistryError::EmptyName);
    }

    #[test]
    fn failed_registration_adds_nothing() {
        let mut registry = registry();
        let clashing = Library {
            name: "clash",
            functions: vec![
                FunctionDef::new("new_one", "").body(|_| Ok(Value::Null)),
                FunctionDef::new("foo", "").body(|_| Ok(Value::Null)),
            ],
        };
        assert_eq!(registry.register(clashing).unwrap_err(), RegistryError::Duplicate("FOO".into()));
        assert!(registry.get("NEW_ONE").is_none());

        let repeated = Library {
            name: "repeated",
            functions: vec![
                FunctionDef::new("twice", "").body(|_| Ok(Value::Null)),
                FunctionDef::new("_twice", "").body(|_| Ok(Value::Null)),
            ],
        };
        assert_eq!(registry.register(repeated).unwrap_err(), RegistryError::Duplicate("TWICE".into()));
        assert!(registry.get("twice").is_none());

        let broken_tail = Library {
            name: "broken",
            functions: vec![
                FunctionDef::new("fine", "").body(|_| Ok(Value::Null)),
                FunctionDef::new("bodiless", ""),
            ],
        };
        assert!(matches!(registry.register(broken_tail), Err(RegistryError::MissingBody(_))));
        assert!(registry.get("fine").is_none());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn body_failures_name_the_call() {
        let mut registry = FunctionRegistry::new();
        registry
            .register(Library {
                name: "failing",
                functions: vec![FunctionDef::new("boom", "")
                    .param("text", ParamType::Text)
                    .param("n", ParamType::Number)
                    .body(|_| Err(failed("nope")))],
            })
            .unwrap();
        let err = registry
            .invoke(&EvaluationContext::default(), "boom", vec![Value::from("abc"), Value::from(3)])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FunctionFailed);
        assert_eq!(err.message, "Error calling function BOOM with arguments \"abc\", 3");
    }
}
