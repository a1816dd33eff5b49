use serde_json::Value;

use crate::error::EvalError;
use crate::validate::MAX_DEPTH;

/// Interpret a JSONLogic expression against a context value.
///
/// Literals evaluate to themselves, arrays element-wise, and single-key
/// objects as operator applications. `{"var": "a.b"}` resolves a dotted
/// path in `ctx`; a missing path yields `null`, which is how a condition
/// over absent data reports `false` rather than an error.
pub fn evaluate(expr: &Value, ctx: &Value) -> Result<Value, EvalError> {
    eval_at(expr, ctx, 1)
}

/// JS truthiness: `false`, `0`, `""`, `null` and `[]` are falsy, everything
/// else (including `{}`) is truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn eval_at(expr: &Value, ctx: &Value, depth: usize) -> Result<Value, EvalError> {
    if depth > MAX_DEPTH {
        return Err(EvalError::DepthExceeded);
    }
    match expr {
        Value::Object(map) if !map.is_empty() => {
            if map.len() > 1 {
                return Err(EvalError::MultipleOperators(map.len()));
            }
            match map.iter().next() {
                Some((op, args)) => apply(op, args, ctx, depth),
                None => Ok(Value::Null),
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| eval_at(item, ctx, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Arguments may be a list or a bare value (`{"!": true}`).
fn arg_slice(args: &Value) -> Vec<&Value> {
    match args {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn apply(op: &str, args: &Value, ctx: &Value, depth: usize) -> Result<Value, EvalError> {
    match op {
        "var" => op_var(args, ctx, depth),
        "missing" => op_missing(args, ctx, depth),
        "missing_some" => op_missing_some(args, ctx, depth),
        "if" | "?:" => op_if(args, ctx, depth),
        "and" => op_and(args, ctx, depth),
        "or" => op_or(args, ctx, depth),
        _ => {
            let values = arg_slice(args)
                .into_iter()
                .map(|a| eval_at(a, ctx, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            apply_strict(op, &values)
        }
    }
}

fn apply_strict(op: &str, values: &[Value]) -> Result<Value, EvalError> {
    match op {
        "==" => Ok(Value::Bool(loose_eq(arg(values, 0), arg(values, 1)))),
        "!=" => Ok(Value::Bool(!loose_eq(arg(values, 0), arg(values, 1)))),
        "===" => Ok(Value::Bool(strict_eq(arg(values, 0), arg(values, 1)))),
        "!==" => Ok(Value::Bool(!strict_eq(arg(values, 0), arg(values, 1)))),
        "!" => Ok(Value::Bool(!truthy(arg(values, 0)))),
        "!!" => Ok(Value::Bool(truthy(arg(values, 0)))),
        ">" => compare(op, values, |o| o == std::cmp::Ordering::Greater),
        ">=" => compare(op, values, |o| o != std::cmp::Ordering::Less),
        "<" => compare(op, values, |o| o == std::cmp::Ordering::Less),
        "<=" => compare(op, values, |o| o != std::cmp::Ordering::Greater),
        "+" => {
            let mut sum = 0.0;
            for v in values {
                sum += number(op, v)?;
            }
            number_value(op, sum)
        }
        "-" => match values {
            [only] => number_value(op, -number(op, only)?),
            [a, b] => number_value(op, number(op, a)? - number(op, b)?),
            _ => Err(invalid(op, "expected one or two arguments")),
        },
        "*" => {
            let mut product = 1.0;
            for v in values {
                product *= number(op, v)?;
            }
            number_value(op, product)
        }
        "/" => match values {
            [a, b] => number_value(op, number(op, a)? / number(op, b)?),
            _ => Err(invalid(op, "expected two arguments")),
        },
        "%" => match values {
            [a, b] => number_value(op, number(op, a)? % number(op, b)?),
            _ => Err(invalid(op, "expected two arguments")),
        },
        "min" | "max" => {
            if values.is_empty() {
                return Err(invalid(op, "expected at least one argument"));
            }
            let mut best = number(op, &values[0])?;
            for v in &values[1..] {
                let n = number(op, v)?;
                if (op == "min" && n < best) || (op == "max" && n > best) {
                    best = n;
                }
            }
            number_value(op, best)
        }
        "in" => {
            let needle = arg(values, 0);
            Ok(Value::Bool(match arg(values, 1) {
                Value::String(haystack) => match needle {
                    Value::String(n) => haystack.contains(n.as_str()),
                    _ => false,
                },
                Value::Array(items) => items.iter().any(|item| loose_eq(needle, item)),
                _ => false,
            }))
        }
        "cat" => {
            let mut out = String::new();
            for v in values {
                out.push_str(&stringify(v));
            }
            Ok(Value::String(out))
        }
        "substr" => op_substr(values),
        "merge" => {
            let mut out = Vec::new();
            for v in values {
                match v {
                    Value::Array(items) => out.extend(items.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::Array(out))
        }
        other => Err(EvalError::UnknownOperator(other.to_string())),
    }
}

// ── Lazy operators ──────────────────────────────────────────────────────

fn op_var(args: &Value, ctx: &Value, depth: usize) -> Result<Value, EvalError> {
    let list = arg_slice(args);
    let path = match list.first() {
        Some(v) => eval_at(v, ctx, depth + 1)?,
        None => Value::String(String::new()),
    };
    let default = match list.get(1) {
        Some(v) => Some(eval_at(v, ctx, depth + 1)?),
        None => None,
    };
    let found = match &path {
        Value::Null => Some(ctx.clone()),
        Value::String(s) if s.is_empty() => Some(ctx.clone()),
        Value::String(s) => lookup_path(ctx, s),
        Value::Number(n) => lookup_segment(ctx, &n.to_string()),
        _ => None,
    };
    Ok(found.unwrap_or_else(|| default.unwrap_or(Value::Null)))
}

fn op_missing(args: &Value, ctx: &Value, depth: usize) -> Result<Value, EvalError> {
    // Arguments may themselves be an expression producing the key list.
    let keys = match eval_at(args, ctx, depth + 1)? {
        Value::Array(items) => items,
        other => vec![other],
    };
    let mut missing = Vec::new();
    for key in keys {
        if let Value::String(path) = &key {
            let present = match lookup_path(ctx, path) {
                Some(Value::Null) | None => false,
                Some(Value::String(s)) => !s.is_empty(),
                Some(_) => true,
            };
            if !present {
                missing.push(key);
            }
        }
    }
    Ok(Value::Array(missing))
}

fn op_missing_some(args: &Value, ctx: &Value, depth: usize) -> Result<Value, EvalError> {
    let list = arg_slice(args);
    let (min, keys) = match (list.first(), list.get(1)) {
        (Some(m), Some(k)) => (eval_at(m, ctx, depth + 1)?, (*k).clone()),
        _ => return Err(invalid("missing_some", "expected [min, keys]")),
    };
    let min = number("missing_some", &min)? as usize;
    let missing = op_missing(&keys, ctx, depth)?;
    let missing_len = missing.as_array().map_or(0, Vec::len);
    let requested = match &keys {
        Value::Array(items) => items.len(),
        _ => 1,
    };
    if requested - missing_len >= min {
        Ok(Value::Array(Vec::new()))
    } else {
        Ok(missing)
    }
}

fn op_if(args: &Value, ctx: &Value, depth: usize) -> Result<Value, EvalError> {
    let list = arg_slice(args);
    let mut i = 0;
    while i < list.len() {
        if i + 1 < list.len() {
            if truthy(&eval_at(list[i], ctx, depth + 1)?) {
                return eval_at(list[i + 1], ctx, depth + 1);
            }
            i += 2;
        } else {
            // Trailing else branch.
            return eval_at(list[i], ctx, depth + 1);
        }
    }
    Ok(Value::Null)
}

fn op_and(args: &Value, ctx: &Value, depth: usize) -> Result<Value, EvalError> {
    let mut last = Value::Null;
    for item in arg_slice(args) {
        last = eval_at(item, ctx, depth + 1)?;
        if !truthy(&last) {
            return Ok(last);
        }
    }
    Ok(last)
}

fn op_or(args: &Value, ctx: &Value, depth: usize) -> Result<Value, EvalError> {
    let mut last = Value::Null;
    for item in arg_slice(args) {
        last = eval_at(item, ctx, depth + 1)?;
        if truthy(&last) {
            return Ok(last);
        }
    }
    Ok(last)
}

// ── Context resolution ──────────────────────────────────────────────────

fn lookup_path(ctx: &Value, path: &str) -> Option<Value> {
    let mut current = ctx.clone();
    for segment in path.split('.') {
        current = lookup_segment(&current, segment)?;
    }
    Some(current)
}

fn lookup_segment(value: &Value, segment: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.get(segment).cloned(),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned()),
        _ => None,
    }
}

// ── Coercion helpers ────────────────────────────────────────────────────

fn arg(values: &[Value], index: usize) -> &Value {
    values.get(index).unwrap_or(&Value::Null)
}

fn invalid(operator: &str, message: &str) -> EvalError {
    EvalError::InvalidArguments {
        operator: operator.to_string(),
        message: message.to_string(),
    }
}

/// Coerce a value to a number the way JS `parseFloat`-style operators do.
fn number(op: &str, value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Null => Ok(0.0),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| invalid(op, "number out of range")),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(0.0)
            } else {
                trimmed
                    .parse::<f64>()
                    .map_err(|_| invalid(op, "string is not numeric"))
            }
        }
        _ => Err(invalid(op, "value is not numeric")),
    }
}

/// Render an f64 back into JSON's single number model: integral results
/// come out as integers, everything else as the float itself. Non-finite
/// results have no JSON rendering and are evaluation errors.
fn number_value(op: &str, n: f64) -> Result<Value, EvalError> {
    if !n.is_finite() {
        return Err(EvalError::NonFiniteNumber(op.to_string()));
    }
    if n.fract() == 0.0 && n.abs() <= i64::MAX as f64 {
        Ok(Value::from(n as i64))
    } else {
        Ok(Value::from(n))
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        _ => match (coerce_f64(a), coerce_f64(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Silent numeric coercion for equality and ordering; `None` plays NaN.
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => {
            let x = coerce_f64(a)?;
            let y = coerce_f64(b)?;
            x.partial_cmp(&y)
        }
    }
}

fn compare(
    op: &str,
    values: &[Value],
    accept: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, EvalError> {
    // Three-argument form is the between test: a < b < c.
    let pairs: &[(usize, usize)] = match values.len() {
        3 if op == "<" || op == "<=" => &[(0, 1), (1, 2)],
        _ => &[(0, 1)],
    };
    for &(i, j) in pairs {
        match ordering(arg(values, i), arg(values, j)) {
            Some(o) if accept(o) => {}
            // NaN comparisons are false, as in JS.
            _ => return Ok(Value::Bool(false)),
        }
    }
    Ok(Value::Bool(true))
}

fn op_substr(values: &[Value]) -> Result<Value, EvalError> {
    let source = match arg(values, 0) {
        Value::String(s) => s.clone(),
        other => stringify(other),
    };
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len() as i64;
    let clamp = |i: i64| -> usize { i.clamp(0, len) as usize };
    let start = match values.get(1) {
        Some(v) => {
            let n = number("substr", v)? as i64;
            if n < 0 {
                clamp(len + n)
            } else {
                clamp(n)
            }
        }
        None => 0,
    };
    let end = match values.get(2) {
        Some(v) => {
            let n = number("substr", v)? as i64;
            if n < 0 {
                clamp(len + n)
            } else {
                clamp(start as i64 + n)
            }
        }
        None => len as usize,
    };
    Ok(Value::String(
        chars[start..end.max(start)].iter().collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: Value, ctx: Value) -> Value {
        evaluate(&expr, &ctx).unwrap()
    }

    #[test]
    fn literals_pass_through() {
        assert_eq!(eval(json!(5), json!({})), json!(5));
        assert_eq!(eval(json!("x"), json!({})), json!("x"));
        assert_eq!(eval(json!([1, 2]), json!({})), json!([1, 2]));
    }

    #[test]
    fn var_resolves_dotted_paths() {
        let ctx = json!({"a": {"b": {"c": 7}}, "list": [10, 20]});
        assert_eq!(eval(json!({"var": "a.b.c"}), ctx.clone()), json!(7));
        assert_eq!(eval(json!({"var": "list.1"}), ctx.clone()), json!(20));
        assert_eq!(eval(json!({"var": "a.missing.c"}), ctx.clone()), json!(null));
        assert_eq!(eval(json!({"var": ["nope", 42]}), ctx.clone()), json!(42));
        assert_eq!(eval(json!({"var": ""}), json!({"k": 1})), json!({"k": 1}));
    }

    #[test]
    fn comparison_coerces_like_js() {
        assert_eq!(
            eval(json!({">=": [{"var": "population"}, 5000]}), json!({"population": 6000})),
            json!(true)
        );
        // null coerces to 0, so null >= 5000 is false, not an error.
        assert_eq!(
            eval(json!({">=": [{"var": "population"}, 5000]}), json!({})),
            json!(false)
        );
        assert_eq!(eval(json!({"<": [1, {"var": "x"}, 3]}), json!({"x": 2})), json!(true));
        assert_eq!(eval(json!({"<": [1, 5, 3]}), json!({})), json!(false));
        assert_eq!(eval(json!({">": ["10", 9]}), json!({})), json!(true));
        assert_eq!(eval(json!({"<": ["a", "b"]}), json!({})), json!(true));
    }

    #[test]
    fn equality_loose_and_strict() {
        assert_eq!(eval(json!({"==": [1, "1"]}), json!({})), json!(true));
        assert_eq!(eval(json!({"===": [1, "1"]}), json!({})), json!(false));
        assert_eq!(eval(json!({"===": [1, 1.0]}), json!({})), json!(true));
        assert_eq!(eval(json!({"!=": [null, 0]}), json!({})), json!(true));
        assert_eq!(eval(json!({"==": [true, 1]}), json!({})), json!(true));
    }

    #[test]
    fn arithmetic_keeps_json_number_model() {
        assert_eq!(eval(json!({"+": [1, 2, 3]}), json!({})), json!(6));
        assert_eq!(eval(json!({"+": ["2", 2]}), json!({})), json!(4));
        assert_eq!(eval(json!({"-": [5]}), json!({})), json!(-5));
        assert_eq!(eval(json!({"*": [2, 2.5]}), json!({})), json!(5));
        assert_eq!(eval(json!({"/": [7, 2]}), json!({})), json!(3.5));
        assert_eq!(eval(json!({"%": [7, 3]}), json!({})), json!(1));
        assert_eq!(eval(json!({"min": [3, 1, 2]}), json!({})), json!(1));
        assert_eq!(eval(json!({"max": [3, 1, 2]}), json!({})), json!(3));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            evaluate(&json!({"/": [1, 0]}), &json!({})),
            Err(EvalError::NonFiniteNumber("/".to_string()))
        );
    }

    #[test]
    fn and_or_short_circuit_and_return_operands() {
        assert_eq!(eval(json!({"and": [true, 5]}), json!({})), json!(5));
        assert_eq!(eval(json!({"and": [0, 5]}), json!({})), json!(0));
        assert_eq!(eval(json!({"or": [0, "", 3]}), json!({})), json!(3));
        assert_eq!(eval(json!({"or": [false, null]}), json!({})), json!(null));
        // Short circuit: the unknown operator in the tail never runs.
        assert_eq!(
            eval(json!({"or": [true, {"bogus": []}]}), json!({})),
            json!(true)
        );
    }

    #[test]
    fn if_chains() {
        let expr = json!({"if": [
            {"<": [{"var": "temp"}, 0]}, "frozen",
            {"<": [{"var": "temp"}, 100]}, "liquid",
            "gas"
        ]});
        assert_eq!(eval(expr.clone(), json!({"temp": -5})), json!("frozen"));
        assert_eq!(eval(expr.clone(), json!({"temp": 50})), json!("liquid"));
        assert_eq!(eval(expr, json!({"temp": 200})), json!("gas"));
    }

    #[test]
    fn in_strings_and_arrays() {
        assert_eq!(eval(json!({"in": ["ell", "hello"]}), json!({})), json!(true));
        assert_eq!(eval(json!({"in": [2, [1, 2, 3]]}), json!({})), json!(true));
        assert_eq!(eval(json!({"in": [4, [1, 2, 3]]}), json!({})), json!(false));
    }

    #[test]
    fn cat_substr_merge() {
        assert_eq!(
            eval(json!({"cat": ["a", 1, null, true]}), json!({})),
            json!("a1true")
        );
        assert_eq!(eval(json!({"substr": ["jsonlogic", 4]}), json!({})), json!("logic"));
        assert_eq!(eval(json!({"substr": ["jsonlogic", 0, 4]}), json!({})), json!("json"));
        assert_eq!(eval(json!({"substr": ["jsonlogic", -5]}), json!({})), json!("logic"));
        assert_eq!(
            eval(json!({"merge": [[1, 2], 3, [4]]}), json!({})),
            json!([1, 2, 3, 4])
        );
    }

    #[test]
    fn missing_and_missing_some() {
        let ctx = json!({"a": 1, "c": ""});
        assert_eq!(
            eval(json!({"missing": ["a", "b", "c"]}), ctx.clone()),
            json!(["b", "c"])
        );
        assert_eq!(
            eval(json!({"missing_some": [1, ["a", "b"]]}), ctx.clone()),
            json!([])
        );
        assert_eq!(
            eval(json!({"missing_some": [2, ["a", "b", "c"]]}), ctx),
            json!(["b", "c"])
        );
    }

    #[test]
    fn unknown_and_multi_key_operators_error() {
        assert_eq!(
            evaluate(&json!({"frobnicate": [1]}), &json!({})),
            Err(EvalError::UnknownOperator("frobnicate".to_string()))
        );
        assert_eq!(
            evaluate(&json!({"+": [1], "-": [1]}), &json!({})),
            Err(EvalError::MultipleOperators(2))
        );
    }

    #[test]
    fn evaluation_is_depth_bounded() {
        let mut expr = json!({"var": "x"});
        for _ in 0..11 {
            expr = json!({"+": [expr, 1]});
        }
        assert_eq!(evaluate(&expr, &json!({"x": 1})), Err(EvalError::DepthExceeded));
    }

    #[test]
    fn repeated_calls_are_referentially_transparent() {
        let expr = json!({"+": [{"var": "a"}, {"var": "b"}]});
        let ctx = json!({"a": 2, "b": 3});
        let first = evaluate(&expr, &ctx).unwrap();
        let second = evaluate(&expr, &ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, json!(5));
    }
}
