use std::collections::BTreeSet;

use serde_json::Value;

/// Collect every `var` path an expression references.
///
/// Walks the whole tree and records the string target of each `{"var": _}`
/// node, whether bare (`{"var": "a.b"}`) or the first element of the
/// argument list (`{"var": ["a.b", 0]}`). The empty path (whole-context
/// access) is not a named variable and is skipped. Iteration order of the
/// returned set is unspecified; compare as sets.
pub fn extract_vars(expr: &Value) -> BTreeSet<String> {
    let mut vars = BTreeSet::new();
    collect(expr, &mut vars);
    vars
}

fn collect(value: &Value, vars: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == "var" {
                    record(child, vars);
                }
                collect(child, vars);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, vars);
            }
        }
        _ => {}
    }
}

fn record(target: &Value, vars: &mut BTreeSet<String>) {
    let path = match target {
        Value::String(s) => Some(s),
        Value::Array(items) => match items.first() {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    };
    if let Some(path) = path {
        if !path.is_empty() {
            vars.insert(path.clone());
        }
    }
}
