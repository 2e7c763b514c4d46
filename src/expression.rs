// src/expression.rs
//! A small tree-walker for the body of an `@(...)` expression: literals,
//! variable references, grouping, negation and function calls.

use rust_decimal::Decimal;

use crate::context::EvaluationContext;
use crate::conversions;
use crate::errors::Result;
use crate::functions::{FunctionRegistry, DEFAULT_FUNCTIONS};
use crate::parser::{ParseError, Parser};
use crate::value::Value;

/// Deepest nesting of groups, negations and calls accepted in one expression.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ENode {
    Call { name: String, args: Vec<ENode> },
    Text(String),
    Number(Decimal),
    Bool(bool),
    /// A dotted variable path.
    Reference(String),
    Negate(Box<ENode>),
    Group(Box<ENode>),
}

pub fn parse_expr(input: &str) -> std::result::Result<ENode, ParseError> {
    let mut p = EParser::new(input);
    let node = p.parse_node()?;
    p.parser.skip_ws();
    if !p.parser.eof() {
        return Err(p.parser.unexpected());
    }
    Ok(node)
}

struct EParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> EParser<'a> {
    fn new(s: &'a str) -> Self {
        Self { parser: Parser::new(s), depth: 0 }
    }

    fn parse_node(&mut self) -> std::result::Result<ENode, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let node = self.parse_term();
        self.depth -= 1;
        node
    }

    fn parse_term(&mut self) -> std::result::Result<ENode, ParseError> {
        self.parser.skip_ws();
        match self.parser.peek_char() {
            Some('"') => Ok(ENode::Text(self.parser.parse_quoted_string()?)),
            Some('-') => {
                self.parser.expect('-')?;
                Ok(ENode::Negate(Box::new(self.parse_node()?)))
            }
            Some('(') => {
                self.parser.expect('(')?;
                let inner = self.parse_node()?;
                self.parser.skip_ws();
                self.parser.expect(')')?;
                Ok(ENode::Group(Box::new(inner)))
            }
            Some(c) if c.is_ascii_digit() => Ok(ENode::Number(self.parser.parse_number_literal()?)),
            Some(_) => self.parse_name_or_call(),
            None => Err(ParseError::Incomplete),
        }
    }

    fn parse_name_or_call(&mut self) -> std::result::Result<ENode, ParseError> {
        let is_call = self.parser.peek_after_name() == Some('(');
        let name = self.parser.parse_name()?;
        if is_call && !name.contains('.') {
            self.parser.skip_ws();
            self.parser.expect('(')?;
            let args = self.parse_args()?;
            self.parser.expect(')')?;
            return Ok(ENode::Call { name: name.to_string(), args });
        }
        Ok(match name.to_ascii_lowercase().as_str() {
            "true" => ENode::Bool(true),
            "false" => ENode::Bool(false),
            _ => ENode::Reference(name.to_string()),
        })
    }

    fn parse_args(&mut self) -> std::result::Result<Vec<ENode>, ParseError> {
        let mut out = Vec::new();
        self.parser.skip_ws();
        if self.parser.peek_char() == Some(')') {
            return Ok(out);
        }
        loop {
            out.push(self.parse_node()?);
            self.parser.skip_ws();
            if !self.parser.consume_char(',') {
                break;
            }
        }
        Ok(out)
    }
}

/// Evaluates a tree against `ctx`, dispatching calls through `functions`.
/// Trees nested deeper than [`MAX_DEPTH`] are rejected.
pub fn eval(node: &ENode, ctx: &EvaluationContext, functions: &FunctionRegistry) -> Result<Value> {
    eval_at(node, ctx, functions, 0)
}

fn eval_at(node: &ENode, ctx: &EvaluationContext, functions: &FunctionRegistry, depth: usize) -> Result<Value> {
    if depth >= MAX_DEPTH {
        return Err(ParseError::TooDeep(MAX_DEPTH).into());
    }
    match node {
        ENode::Text(s) => Ok(Value::Text(s.clone())),
        ENode::Number(n) => Ok(Value::Number(*n)),
        ENode::Bool(b) => Ok(Value::Bool(*b)),
        ENode::Reference(path) => ctx.resolve_variable(path),
        ENode::Group(inner) => eval_at(inner, ctx, functions, depth + 1),
        ENode::Negate(inner) => {
            let value = eval_at(inner, ctx, functions, depth + 1)?;
            Ok(Value::Number(-conversions::to_decimal(&value, ctx)?))
        }
        ENode::Call { name, args } => {
            let values = args
                .iter()
                .map(|arg| eval_at(arg, ctx, functions, depth + 1))
                .collect::<Result<Vec<_>>>()?;
            functions.invoke(ctx, name, values)
        }
    }
}

/// Evaluates the body of an advanced expression. Grammars richer than
/// [`CallExpressionEngine`] plug in here.
pub trait ExpressionEngine: Send + Sync {
    fn evaluate(&self, expression: &str, ctx: &EvaluationContext) -> Result<Value>;
}

/// Engine for literals, references, grouping, unary minus and calls.
#[derive(Debug, Clone)]
pub struct CallExpressionEngine {
    functions: FunctionRegistry,
}

impl Default for CallExpressionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FUNCTIONS.clone())
    }
}

impl CallExpressionEngine {
    pub fn new(functions: FunctionRegistry) -> Self {
        Self { functions }
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }
}

impl ExpressionEngine for CallExpressionEngine {
    fn evaluate(&self, expression: &str, ctx: &EvaluationContext) -> Result<Value> {
        let tree = parse_expr(expression)?;
        tracing::trace!(expression, ?tree, "parsed expression");
        eval(&tree, ctx, &self.functions)
    }
}
