use condeval_logic::{evaluate, extract_vars, validate, EvalError};
use serde_json::json;

#[test]
fn population_threshold_over_present_data() {
    let expr = json!({">=": [{"var": "population"}, 5000]});
    let value = evaluate(&expr, &json!({"population": 6000})).unwrap();
    assert_eq!(value, json!(true));
}

#[test]
fn population_threshold_over_absent_data_is_false_not_an_error() {
    let expr = json!({">=": [{"var": "population"}, 5000]});
    let value = evaluate(&expr, &json!({})).unwrap();
    assert_eq!(value, json!(false));
}

#[test]
fn eleven_deep_expression_fails_validation_with_depth_message() {
    let mut expr = json!({"var": "x"});
    for _ in 0..11 {
        expr = json!({"+": [expr, 1]});
    }
    let errors = validate(&expr).unwrap_err();
    assert!(errors.iter().any(|e| e.contains("maximum depth")));
}

#[test]
fn validation_accepts_what_evaluation_accepts_at_the_boundary() {
    // Nine containers of nesting: passes both validation and evaluation.
    let mut expr = json!({"var": "x"});
    for _ in 0..4 {
        expr = json!({"!!": [expr]});
    }
    assert!(validate(&expr).is_ok());
    assert_eq!(evaluate(&expr, &json!({"x": 1})).unwrap(), json!(true));
}

#[test]
fn extracted_vars_match_evaluated_lookups() {
    let expr = json!({"and": [
        {">": [{"var": "supplies.food"}, 0]},
        {"!": [{"var": "under_siege"}]}
    ]});
    let vars = extract_vars(&expr);
    assert!(vars.contains("supplies.food"));
    assert!(vars.contains("under_siege"));

    let ctx = json!({"supplies": {"food": 12}, "under_siege": false});
    assert_eq!(evaluate(&expr, &ctx).unwrap(), json!(true));
}

#[test]
fn interpreter_errors_are_values_not_panics() {
    let err = evaluate(&json!({"nope": [1]}), &json!({})).unwrap_err();
    assert!(matches!(err, EvalError::UnknownOperator(_)));
    assert!(err.to_string().contains("nope"));
}
