//! Locates `@path` and `@(...)` expressions in free text and answers the
//! cursor questions an editor asks while a template is being typed.

use serde::Serialize;
use tracing::trace;

use crate::config::{DEFAULT_PREFIX, DEFAULT_TOP_LEVELS};

/// One expression found in a template. Offsets count characters, not bytes,
/// and are half-open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpressionSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Only advanced expressions close; a simple one is always `false`.
    pub closed: bool,
}

impl ExpressionSpan {
    pub fn is_advanced(&self) -> bool {
        self.text.chars().nth(1) == Some('(')
    }

    /// The expression without its prefix, e.g. `contact.name` or `(1 + 2)`.
    pub fn body(&self) -> &str {
        self.text.char_indices().nth(1).map_or("", |(i, _)| &self.text[i..])
    }
}

#[derive(Debug, Clone)]
pub struct Scanner {
    prefix: char,
    allowed_top_levels: Vec<String>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, DEFAULT_TOP_LEVELS)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl Scanner {
    pub fn new<I, S>(prefix: char, allowed_top_levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_top_levels = allowed_top_levels.into_iter().map(|s| s.as_ref().to_lowercase()).collect();
        Self { prefix, allowed_top_levels }
    }

    pub fn prefix(&self) -> char {
        self.prefix
    }

    /// Whether a simple expression's first segment names an allowed namespace.
    pub fn is_allowed_top_level(&self, path: &str) -> bool {
        let top = path.split('.').next().unwrap_or_default().to_lowercase();
        self.allowed_top_levels.iter().any(|allowed| *allowed == top)
    }

    /// All expressions in `text`, left to right and never overlapping.
    pub fn scan(&self, text: &str) -> Vec<ExpressionSpan> {
        let chars: Vec<char> = text.chars().collect();
        let spans = self.spans(&chars, false);
        trace!(count = spans.len(), "scanned template");
        spans
    }

    /// The unfinished expression the text ends with, if any. Namespaces
    /// aren't checked here since the name may still be being typed.
    pub fn expression_context(&self, text: &str) -> Option<String> {
        let chars: Vec<char> = text.chars().collect();
        self.spans(&chars, true)
            .pop()
            .filter(|span| span.end == chars.len() && !span.closed)
            .map(|span| span.text)
    }

    /// What to suggest at the end of `text`: the path typed so far after the
    /// prefix, the function whose arguments are being typed, or the name
    /// fragment at the cursor.
    pub fn auto_complete_context(&self, text: &str) -> Option<String> {
        let expression = self.expression_context(text)?;
        let body: String = expression.chars().skip(1).collect();
        if !body.starts_with('(') {
            return Some(body);
        }

        let mut in_string = false;
        let mut calls: Vec<Option<String>> = Vec::new();
        let mut run = String::new();
        let mut just_closed: Option<String> = None;

        for c in body.chars() {
            if in_string {
                in_string = c != '"';
                continue;
            }
            match c {
                '"' => {
                    in_string = true;
                    run.clear();
                    just_closed = None;
                }
                '(' => {
                    calls.push(call_name(&run));
                    run.clear();
                    just_closed = None;
                }
                ')' => {
                    just_closed = calls.pop().flatten();
                    run.clear();
                }
                c if is_word_char(c) || c == '.' => {
                    run.push(c);
                    just_closed = None;
                }
                // whitespace after a closing paren keeps that call as the context
                c if c.is_whitespace() => run.clear(),
                _ => {
                    run.clear();
                    just_closed = None;
                }
            }
        }

        if in_string {
            return None;
        }
        if let Some(name) = calls.iter().rev().find_map(Clone::clone) {
            return Some(name);
        }
        just_closed.or_else(|| Some(run).filter(|r| !r.is_empty()))
    }

    fn spans(&self, chars: &[char], editing: bool) -> Vec<ExpressionSpan> {
        let mut spans = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] != self.prefix {
                i += 1;
                continue;
            }
            match chars.get(i + 1) {
                Some(&c) if c == self.prefix => i += 2,
                Some('(') => {
                    let (end, closed) = balanced_end(chars, i + 2);
                    spans.push(span(chars, i, end, closed));
                    i = end;
                }
                Some(&c) if is_word_char(c) => {
                    let end = identifier_end(chars, i + 1, editing);
                    let found = span(chars, i, end, false);
                    if editing || self.is_allowed_top_level(found.body()) {
                        spans.push(found);
                    }
                    i = end;
                }
                _ => i += 1,
            }
        }
        spans
    }
}

fn span(chars: &[char], start: usize, end: usize, closed: bool) -> ExpressionSpan {
    ExpressionSpan { start, end, text: chars[start..end].iter().collect(), closed }
}

/// End of an identifier path starting at `from`. A `.` only continues the
/// path when a word character follows it, or when it ends the text while
/// `trailing_dot` is set.
fn identifier_end(chars: &[char], from: usize, trailing_dot: bool) -> usize {
    let mut i = from;
    while i < chars.len() {
        let c = chars[i];
        let extends = match chars.get(i + 1) {
            _ if is_word_char(c) => true,
            Some(&next) => c == '.' && is_word_char(next),
            None => c == '.' && trailing_dot,
        };
        if !extends {
            break;
        }
        i += 1;
    }
    i
}

/// Scans past the `(` that precedes `from`. Returns the span end and whether
/// the parentheses balanced before the text ran out.
fn balanced_end(chars: &[char], from: usize) -> (usize, bool) {
    let mut depth = 1usize;
    let mut in_string = false;
    for (i, &c) in chars.iter().enumerate().skip(from) {
        if in_string {
            // a doubled quote reopens the literal on the next character
            in_string = c != '"';
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return (i + 1, true);
                }
            }
            _ => {}
        }
    }
    (chars.len(), false)
}

/// The function name a `(` belongs to, if the run before it names one.
fn call_name(run: &str) -> Option<String> {
    let first = run.chars().next()?;
    let callable = (first.is_alphabetic() || first == '_') && !run.contains('.');
    callable.then(|| run.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spans(text: &str) -> Vec<(usize, usize, String, bool)> {
        Scanner::default().scan(text).into_iter().map(|s| (s.start, s.end, s.text, s.closed)).collect()
    }

    #[test]
    fn finds_simple_and_advanced_expressions() {
        assert_eq!(
            spans("Hi @contact.name from @(flow.sender)"),
            vec![(3, 16, "@contact.name".to_string(), false), (22, 36, "@(flow.sender)".to_string(), true)]
        );
    }

    #[test]
    fn ignores_unlisted_namespaces() {
        assert_eq!(spans("Hi @contact.name from @nyaruka"), vec![(3, 16, "@contact.name".to_string(), false)]);
        assert_eq!(spans("email me at bob@nyaruka.com"), vec![]);
        assert_eq!(spans("@CONTACT.Name"), vec![(0, 13, "@CONTACT.Name".to_string(), false)]);
    }

    #[test]
    fn trailing_period_ends_a_path() {
        assert_eq!(spans("Bye @contact.name."), vec![(4, 17, "@contact.name".to_string(), false)]);
        assert_eq!(spans("@contact.first_name!"), vec![(0, 19, "@contact.first_name".to_string(), false)]);
    }

    #[test]
    fn escaped_prefix_is_not_an_expression() {
        assert_eq!(spans("@@contact.name @@(1)"), vec![]);
        assert_eq!(spans("@@@contact"), vec![(2, 10, "@contact".to_string(), false)]);
    }

    #[test]
    fn parens_in_strings_do_not_count() {
        assert_eq!(
            spans(r#"@(LEN("a)b""c(")) x"#),
            vec![(0, 17, r#"@(LEN("a)b""c("))"#.to_string(), true)]
        );
    }

    #[test]
    fn unclosed_advanced_expression_runs_to_end() {
        assert_eq!(spans("Sum is @(1 + (2"), vec![(7, 15, "@(1 + (2".to_string(), false)]);
    }

    #[test]
    fn offsets_count_characters() {
        assert_eq!(spans("ñé @step.value"), vec![(3, 14, "@step.value".to_string(), false)]);
    }

    #[test]
    fn spans_expose_their_bodies() {
        let found = Scanner::default().scan("@(1) @flow.x");
        assert!(found[0].is_advanced());
        assert_eq!(found[0].body(), "(1)");
        assert!(!found[1].is_advanced());
        assert_eq!(found[1].body(), "flow.x");
    }

    #[test]
    fn custom_prefix_and_namespaces() {
        let scanner = Scanner::new('$', ["order"]);
        let found = scanner.scan("$order.id costs $(price) at @contact");
        assert_eq!(found.iter().map(|s| s.text.as_str()).collect::<Vec<_>>(), vec!["$order.id", "$(price)"]);
    }

    #[test]
    fn expression_context_is_the_open_trailing_expression() {
        let scanner = Scanner::default();
        assert_eq!(scanner.expression_context("Hi @contact.na").as_deref(), Some("@contact.na"));
        assert_eq!(scanner.expression_context("Hi @contact.").as_deref(), Some("@contact."));
        assert_eq!(scanner.expression_context("Hi @(SUM(1, ").as_deref(), Some("@(SUM(1, "));
        assert_eq!(scanner.expression_context("Hi @con").as_deref(), Some("@con"));
        assert_eq!(scanner.expression_context("Hi @(1)"), None);
        assert_eq!(scanner.expression_context("Hi @contact.name "), None);
        assert_eq!(scanner.expression_context("Hi there"), None);
    }

    #[test]
    fn auto_complete_for_simple_paths() {
        let scanner = Scanner::default();
        assert_eq!(scanner.auto_complete_context("Hi @contact.fir").as_deref(), Some("contact.fir"));
        assert_eq!(scanner.auto_complete_context("Hi @contact.").as_deref(), Some("contact."));
        assert_eq!(scanner.auto_complete_context("Hi @contact.name and"), None);
    }

    #[test]
    fn auto_complete_for_function_arguments() {
        let scanner = Scanner::default();
        assert_eq!(scanner.auto_complete_context("Hi @(SUM(dads, ABS(number))").as_deref(), Some("SUM"));
        assert_eq!(scanner.auto_complete_context("Hi @(SUM(dads, ABS(number)))"), None);
        assert_eq!(scanner.auto_complete_context("Hi @(SUM(dads, ABS(number))  ").as_deref(), Some("SUM"));
        assert_eq!(scanner.auto_complete_context("@(SUM(a, ABS(b)) ").as_deref(), Some("SUM"));
        assert_eq!(scanner.auto_complete_context("@(SUM(a, ABS(b)) , "), None);
        assert_eq!(scanner.auto_complete_context("@(SUM(").as_deref(), Some("SUM"));
        assert_eq!(scanner.auto_complete_context("@(SUM(1, ABS(").as_deref(), Some("ABS"));
        assert_eq!(scanner.auto_complete_context("@(SUM(1, ABS(2)").as_deref(), Some("SUM"));
        assert_eq!(scanner.auto_complete_context("@(SUM( dads ,  ").as_deref(), Some("SUM"));
        assert_eq!(scanner.auto_complete_context("@(SUM((1 + 2), ").as_deref(), Some("SUM"));
    }

    #[test]
    fn auto_complete_for_names_at_cursor() {
        let scanner = Scanner::default();
        assert_eq!(scanner.auto_complete_context("@(contact.na").as_deref(), Some("contact.na"));
        assert_eq!(scanner.auto_complete_context("@(1 + (contact.age").as_deref(), Some("contact.age"));
        assert_eq!(scanner.auto_complete_context("@(1 + "), None);
        assert_eq!(scanner.auto_complete_context(r#"@(UPPER("a(b"#), None);
        assert_eq!(scanner.auto_complete_context(r#"@(UPPER("a""b"#), None);
        assert_eq!(scanner.auto_complete_context(r#"@(UPPER("a""b", "#).as_deref(), Some("UPPER"));
    }
}
