use serde_json::Value;

/// Maximum container nesting an expression may carry.
///
/// Objects and arrays both count toward the depth; the root object sits at
/// depth 1. The same bound guards [`evaluate`](crate::evaluate), so authored
/// data can never recurse the interpreter unboundedly.
pub const MAX_DEPTH: usize = 10;

/// Structurally validate an expression without evaluating it.
///
/// Rejects null, arrays, non-objects and empty objects at the top level,
/// then walks object values and array elements, collecting every problem
/// found. Validation does not type-check operator arity; that surfaces at
/// evaluation time.
pub fn validate(expr: &Value) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    match expr {
        Value::Null => errors.push("Expression must not be null".to_string()),
        Value::Array(_) => errors.push("Expression must not be an array".to_string()),
        Value::Object(map) if map.is_empty() => {
            errors.push("Expression must have at least one operator".to_string());
        }
        Value::Object(_) => walk(expr, 1, &mut errors),
        _ => errors.push("Expression must be an object".to_string()),
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn walk(value: &Value, depth: usize, errors: &mut Vec<String>) {
    if depth > MAX_DEPTH {
        let msg = format!("Expression exceeds maximum depth of {MAX_DEPTH}");
        if !errors.contains(&msg) {
            errors.push(msg);
        }
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                walk(item, depth + 1, errors);
            }
        }
        Value::Object(map) => {
            for child in map.values() {
                walk(child, depth + 1, errors);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_null_and_scalars() {
        assert_eq!(
            validate(&Value::Null).unwrap_err(),
            vec!["Expression must not be null"]
        );
        assert_eq!(
            validate(&json!(42)).unwrap_err(),
            vec!["Expression must be an object"]
        );
        assert_eq!(
            validate(&json!("x")).unwrap_err(),
            vec!["Expression must be an object"]
        );
    }

    #[test]
    fn rejects_top_level_array_and_empty_object() {
        assert_eq!(
            validate(&json!([1, 2])).unwrap_err(),
            vec!["Expression must not be an array"]
        );
        assert_eq!(
            validate(&json!({})).unwrap_err(),
            vec!["Expression must have at least one operator"]
        );
    }

    #[test]
    fn accepts_simple_comparison() {
        assert!(validate(&json!({">=": [{"var": "population"}, 5000]})).is_ok());
    }

    #[test]
    fn depth_boundary() {
        // Within the bound: alternating object/array nesting passes.
        let mut expr = json!({"var": "x"});
        // {"var": "x"} is 1 level; each wrap adds an object and an array.
        for _ in 0..4 {
            expr = json!({"!": [expr]});
        }
        // depth = 1 + 4 * 2 = 9 <= 10
        assert!(validate(&expr).is_ok());

        expr = json!({"!": [expr]});
        // depth = 11 > 10
        let errors = validate(&expr).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("maximum depth"));
    }

    #[test]
    fn overdeep_reports_once() {
        let mut expr = json!({"var": "x"});
        for _ in 0..11 {
            expr = json!({"+": [expr, 1]});
        }
        let errors = validate(&expr).unwrap_err();
        assert_eq!(
            errors
                .iter()
                .filter(|e| e.contains("maximum depth"))
                .count(),
            1
        );
    }
}
