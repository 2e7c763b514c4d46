//! Dotted-path variable resolution and container rendering.
//!
//! Lookups are case-insensitive at every level. The caller's maps are never
//! copied or rewritten: each level gets a [`CaseFoldedView`] whose folded key
//! index is only built when an exact-case lookup misses.

use std::collections::HashMap;

use itertools::Itertools;
use once_cell::unsync::OnceCell;

use crate::errors::{EvaluationError, Result};
use crate::value::{Value, VariableMap};

/// Current key holding a container's display value.
pub const DEFAULT_KEY: &str = "*";
/// Legacy alias of [`DEFAULT_KEY`].
pub const LEGACY_DEFAULT_KEY: &str = "__default__";

const NESTED_PLACEHOLDER: &str = "[...]";

/// A borrowed, case-insensitive view over a variable map.
pub struct CaseFoldedView<'a> {
    map: &'a VariableMap,
    folded: OnceCell<HashMap<String, &'a str>>,
}

impl<'a> CaseFoldedView<'a> {
    pub fn new(map: &'a VariableMap) -> Self {
        Self { map, folded: OnceCell::new() }
    }

    /// Looks up `key` ignoring case. An exact-case key wins; among keys that
    /// only differ by case, the lexicographically first one wins.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        if let Some(value) = self.map.get(key) {
            return Some(value);
        }
        let folded = self.folded.get_or_init(|| {
            let mut index = HashMap::with_capacity(self.map.len());
            for original in self.map.keys() {
                index.entry(original.to_lowercase()).or_insert(original.as_str());
            }
            index
        });
        folded.get(&key.to_lowercase()).and_then(|original| self.map.get(*original))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Resolves a dotted path such as `contact.name` against `variables`.
///
/// A path ending on a map yields the map's rendered text; intermediate maps
/// are traversed structurally.
pub fn resolve(variables: &VariableMap, path: &str) -> Result<Value> {
    let mut container = variables;
    let mut remaining = path;
    loop {
        let (item, rest) = match remaining.split_once('.') {
            Some((item, rest)) => (item, Some(rest)),
            None => (remaining, None),
        };
        let value = CaseFoldedView::new(container)
            .get(item)
            .ok_or_else(|| EvaluationError::undefined_variable(path))?;

        match (rest, value) {
            (Some(rest), Value::Map(inner)) => {
                container = inner;
                remaining = rest;
            }
            (Some(_), _) => return Err(EvaluationError::undefined_variable(path)),
            (None, Value::Map(inner)) => return Ok(Value::Text(render(inner))),
            (None, other) => return Ok(other.clone()),
        }
    }
}

fn default_of(map: &VariableMap) -> Option<&Value> {
    map.get(DEFAULT_KEY).or_else(|| map.get(LEGACY_DEFAULT_KEY))
}

/// Flattens a map into display text: its default value if it has one,
/// otherwise one `key: value` line per entry in key order.
pub fn render(map: &VariableMap) -> String {
    match default_of(map) {
        Some(Value::Map(inner)) => render(inner),
        Some(default) => default.to_string(),
        None => map.iter().map(|(key, value)| format!("{key}: {}", render_entry(value))).join("\n"),
    }
}

// nested maps only ever show their default or the placeholder
fn render_entry(value: &Value) -> String {
    match value {
        Value::Map(inner) => match default_of(inner) {
            Some(default) => render_entry(default),
            None => NESTED_PLACEHOLDER.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn map(json: serde_json::Value) -> VariableMap {
        match Value::from(json) {
            Value::Map(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn renders_default_key() {
        assert_eq!(render(&map(json!({"__default__": "Bob", "name": "Robert"}))), "Bob");
        assert_eq!(render(&map(json!({"*": "Bob", "name": "Robert"}))), "Bob");
    }

    #[test]
    fn renders_sorted_entries() {
        assert_eq!(render(&map(json!({"name": "Robert", "age": 34}))), "age: 34\nname: Robert");
    }

    #[test]
    fn nested_maps_render_default_or_placeholder() {
        let mut var = map(json!({"name": "Robert", "age": 34, "address": {"house": 8661, "street": "Kudu Rd"}}));
        assert_eq!(render(&var), "address: [...]\nage: 34\nname: Robert");

        var.insert("address".into(), Value::from(json!({"*": "8661 Kudu Rd", "house": 8661})));
        assert_eq!(render(&var), "address: 8661 Kudu Rd\nage: 34\nname: Robert");

        var.insert("address".into(), Value::from(json!({"__default__": "8661_Kudu_Rd"})));
        assert_eq!(render(&var), "address: 8661_Kudu_Rd\nage: 34\nname: Robert");
    }

    #[test]
    fn view_is_case_insensitive_without_touching_the_map() {
        let vars = map(json!({"FOO": 1, "bAr": 2}));
        let view = CaseFoldedView::new(&vars);
        assert_eq!(view.get("foo"), Some(&Value::from(1)));
        assert_eq!(view.get("BAR"), Some(&Value::from(2)));
        assert!(!view.contains_key("baz"));
        assert!(vars.contains_key("FOO") && vars.contains_key("bAr"));
    }

    #[test]
    fn resolves_paths_case_insensitively() {
        let vars = map(json!({
            "foo": 123,
            "contact": {"*": "Bob", "name": "Bob", "age": 33, "isnull": null, "isdict": {"a": 123}},
            "zed": ["x", 4]
        }));
        assert_eq!(resolve(&vars, "FOO").unwrap(), Value::from(123));
        assert_eq!(resolve(&vars, "contact").unwrap(), Value::from("Bob"));
        assert_eq!(resolve(&vars, "Contact.name").unwrap(), resolve(&vars, "contact.NAME").unwrap());
        assert_eq!(resolve(&vars, "contact.AGE").unwrap(), Value::from(33));
        assert_eq!(resolve(&vars, "contact.isnull").unwrap(), Value::Null);
        assert_eq!(resolve(&vars, "contact.isdict").unwrap(), Value::from("a: 123"));
    }

    #[test]
    fn missing_segments_report_the_original_path() {
        let vars = map(json!({"contact": {"name": "Bob"}, "zed": ["x", 4]}));
        let err = resolve(&vars, "Contact.Nme").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
        assert_eq!(err.message, "Undefined variable: Contact.Nme");

        assert_eq!(resolve(&vars, "bar").unwrap_err().kind, ErrorKind::UndefinedVariable);
        assert_eq!(resolve(&vars, "zed.something").unwrap_err().kind, ErrorKind::UndefinedVariable);
        assert_eq!(resolve(&vars, "contact.name.first").unwrap_err().kind, ErrorKind::UndefinedVariable);
    }
}
