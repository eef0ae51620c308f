//! Dependency condition evaluation.
//!
//! Conditional swarm dependencies carry a restricted boolean expression over
//! `output`, the upstream agent's output decoded as JSON. Supported syntax:
//! field access (dotted or bracketed), comparisons, boolean operators,
//! `len`, and `any`/`all` over arrays.
//!
//! Access chains like `output.risk` or `output["data"]["nested"]` are
//! rewritten to flat variable names before evaluation, and the decoded JSON
//! is bound under the same names.

use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, EvalexprError, Function,
    HashMapContext, Value,
};

use crate::domain::errors::{DomainError, DomainResult};

/// Decode an agent's output into JSON: the first fenced JSON block, else the
/// first top-level JSON object, else a wrapper exposing `output.text`.
pub fn extract_output_json(output: &str) -> serde_json::Value {
    if let Some(block) = fenced_json_block(output) {
        if let Ok(value) = serde_json::from_str(block) {
            return value;
        }
    }
    if let Some(object) = first_json_object(output) {
        if let Ok(value) = serde_json::from_str(object) {
            return value;
        }
    }
    serde_json::json!({ "text": output })
}

fn fenced_json_block(output: &str) -> Option<&str> {
    let start = output.find("```json")?;
    let rest = &output[start + 7..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// Find the first balanced top-level `{...}` span, respecting strings.
fn first_json_object(output: &str) -> Option<&str> {
    let start = output.find('{')?;
    let bytes = output.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&output[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Evaluate a condition against a dependency's output.
///
/// Missing fields compare as false rather than erroring; genuinely
/// unparseable conditions surface a typed evaluation error so the scheduler
/// can skip the dependent with a reason.
pub fn evaluate_condition(condition: &str, output: Option<&str>) -> DomainResult<bool> {
    let Some(output) = output else {
        return Err(DomainError::ConditionEvaluation(
            "dependency produced no output to evaluate".to_string(),
        ));
    };

    let json = extract_output_json(output);
    let expression = rewrite_access_chains(condition);

    let mut context = HashMapContext::new();
    bind_json(&mangle(&["output".to_string()]), &json, &mut context)
        .map_err(|e| DomainError::ConditionEvaluation(format!("context error: {e}")))?;
    install_functions(&mut context)
        .map_err(|e| DomainError::ConditionEvaluation(format!("context error: {e}")))?;

    match evalexpr::eval_boolean_with_context(&expression, &context) {
        Ok(result) => Ok(result),
        // Unknown identifiers mean the field is absent; the comparison is
        // simply false, matching lenient gate semantics.
        Err(EvalexprError::VariableIdentifierNotFound(_)) => Ok(false),
        Err(e) => Err(DomainError::ConditionEvaluation(format!(
            "error evaluating '{condition}': {e}"
        ))),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn sanitize(part: &str) -> String {
    part.chars().map(|c| if is_ident_char(c) { c } else { '_' }).collect()
}

/// Flat variable name for an access path.
fn mangle(parts: &[String]) -> String {
    parts.iter().map(|p| sanitize(p)).collect::<Vec<_>>().join("__")
}

/// Rewrite every `output`-rooted access chain (dotted or bracketed) into its
/// flat variable name, leaving string literals untouched.
fn rewrite_access_chains(condition: &str) -> String {
    let chars: Vec<char> = condition.chars().collect();
    let mut result = String::with_capacity(condition.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        // Copy string literals verbatim.
        if c == '"' || c == '\'' {
            let quote = c;
            result.push(c);
            i += 1;
            while i < chars.len() {
                result.push(chars[i]);
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 1;
                    result.push(chars[i]);
                } else if chars[i] == quote {
                    i += 1;
                    break;
                }
                i += 1;
            }
            continue;
        }

        // Identifier start?
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();

            if ident == "output" {
                let mut parts = vec![ident];
                loop {
                    if i < chars.len() && chars[i] == '.' {
                        let field_start = i + 1;
                        let mut j = field_start;
                        while j < chars.len() && is_ident_char(chars[j]) {
                            j += 1;
                        }
                        if j == field_start {
                            break;
                        }
                        parts.push(chars[field_start..j].iter().collect());
                        i = j;
                    } else if i < chars.len() && chars[i] == '[' {
                        // Only quoted keys form part of the chain.
                        let Some((key, next)) = bracket_key(&chars, i) else { break };
                        parts.push(key);
                        i = next;
                    } else {
                        break;
                    }
                }
                result.push_str(&mangle(&parts));
            } else {
                result.push_str(&ident);
            }
            continue;
        }

        result.push(c);
        i += 1;
    }
    result
}

/// Parse `["key"]` / `['key']` starting at `open`; returns the key and the
/// index after the closing bracket.
fn bracket_key(chars: &[char], open: usize) -> Option<(String, usize)> {
    let mut i = open + 1;
    let quote = *chars.get(i)?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    i += 1;
    let start = i;
    while i < chars.len() && chars[i] != quote {
        i += 1;
    }
    if i >= chars.len() || *chars.get(i + 1)? != ']' {
        return None;
    }
    Some((chars[start..i].iter().collect(), i + 2))
}

fn bind_json(
    name: &str,
    value: &serde_json::Value,
    context: &mut HashMapContext,
) -> Result<(), EvalexprError> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                bind_json(&format!("{name}__{}", sanitize(key)), child, context)?;
            }
        }
        other => {
            context.set_value(name.to_string(), json_to_value(other))?;
        }
    }
    Ok(())
}

fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Empty,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Tuple(items.iter().map(json_to_value).collect())
        }
        // Nested objects inside arrays are surfaced as JSON strings.
        serde_json::Value::Object(_) => Value::String(value.to_string()),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Boolean(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Tuple(t) => !t.is_empty(),
        Value::Empty => false,
    }
}

fn as_items(argument: &Value) -> Vec<Value> {
    match argument {
        Value::Tuple(items) => items.clone(),
        Value::Empty => Vec::new(),
        other => vec![other.clone()],
    }
}

fn install_functions(context: &mut HashMapContext) -> Result<(), EvalexprError> {
    context.set_function(
        "any".to_string(),
        Function::new(|argument| Ok(Value::Boolean(as_items(argument).iter().any(truthy)))),
    )?;
    context.set_function(
        "all".to_string(),
        Function::new(|argument| {
            let items = as_items(argument);
            Ok(Value::Boolean(!items.is_empty() && items.iter().all(truthy)))
        }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_equality() {
        let output = r#"{"risk_level": "high"}"#;
        assert!(evaluate_condition(r#"output.risk_level == "high""#, Some(output)).unwrap());
        let output = r#"{"risk_level": "low"}"#;
        assert!(!evaluate_condition(r#"output.risk_level == "high""#, Some(output)).unwrap());
    }

    #[test]
    fn numeric_comparison() {
        let output = r#"{"score": 85}"#;
        assert!(evaluate_condition("output.score >= 80", Some(output)).unwrap());
        assert!(!evaluate_condition("output.score >= 90", Some(output)).unwrap());
    }

    #[test]
    fn len_over_arrays() {
        let output = r#"{"issues": [1, 2, 3]}"#;
        assert!(evaluate_condition("len(output.issues) > 0", Some(output)).unwrap());
        let output = r#"{"issues": []}"#;
        assert!(!evaluate_condition("len(output.issues) > 0", Some(output)).unwrap());
    }

    #[test]
    fn bracket_access_rewritten() {
        let output = r#"{"data": {"nested": "value"}}"#;
        assert!(
            evaluate_condition(r#"output["data"]["nested"] == "value""#, Some(output)).unwrap()
        );
    }

    #[test]
    fn mixed_access_chains() {
        let output = r#"{"data": {"nested": {"deep": 7}}}"#;
        assert!(evaluate_condition(r#"output.data["nested"].deep == 7"#, Some(output)).unwrap());
    }

    #[test]
    fn json_in_code_block() {
        let output = "Here is the result:\n```json\n{\"status\": \"success\"}\n```\nDone!";
        assert!(evaluate_condition(r#"output.status == "success""#, Some(output)).unwrap());
    }

    #[test]
    fn plain_text_wrapped() {
        let output = "Just plain text output";
        assert!(evaluate_condition(r#"output.text != """#, Some(output)).unwrap());
    }

    #[test]
    fn none_output_errors() {
        let result = evaluate_condition(r#"output.foo == "bar""#, None);
        assert!(matches!(result, Err(DomainError::ConditionEvaluation(_))));
    }

    #[test]
    fn missing_field_is_false() {
        let output = r#"{"foo": "bar"}"#;
        assert!(!evaluate_condition("output.nonexistent == 42", Some(output)).unwrap());
    }

    #[test]
    fn boolean_field() {
        let output = r#"{"enabled": true}"#;
        assert!(evaluate_condition("output.enabled", Some(output)).unwrap());
    }

    #[test]
    fn any_and_all_over_boolean_arrays() {
        let output = r#"{"checks": [true, false, true]}"#;
        assert!(evaluate_condition("any(output.checks)", Some(output)).unwrap());
        assert!(!evaluate_condition("all(output.checks)", Some(output)).unwrap());
        let output = r#"{"checks": [true, true]}"#;
        assert!(evaluate_condition("all(output.checks)", Some(output)).unwrap());
        let output = r#"{"checks": []}"#;
        assert!(!evaluate_condition("any(output.checks)", Some(output)).unwrap());
    }

    #[test]
    fn invalid_syntax_errors() {
        let output = r#"{"foo": "bar"}"#;
        let result = evaluate_condition("output.foo ==== bar", Some(output));
        assert!(matches!(result, Err(DomainError::ConditionEvaluation(_))));
    }

    #[test]
    fn string_literals_survive_rewriting() {
        let output = r#"{"name": "output.name"}"#;
        assert!(evaluate_condition(r#"output.name == "output.name""#, Some(output)).unwrap());
    }

    #[test]
    fn rewrite_shapes() {
        assert_eq!(rewrite_access_chains("output.a.b > 1"), "output__a__b > 1");
        assert_eq!(rewrite_access_chains(r#"output["x-y"] == 2"#), "output__x_y == 2");
        assert_eq!(rewrite_access_chains("len(output.items)"), "len(output__items)");
        // Unrelated identifiers are untouched.
        assert_eq!(rewrite_access_chains("an_output.a"), "an_output.a");
    }

    #[test]
    fn extraction_precedence() {
        // Fenced block wins over a bare object.
        let mixed = "intro {\"a\": 1}\n```json\n{\"b\": 2}\n```";
        assert_eq!(extract_output_json(mixed), serde_json::json!({"b": 2}));
        // Bare object next.
        let bare = "result: {\"a\": {\"b\": 1}} trailing";
        assert_eq!(extract_output_json(bare), serde_json::json!({"a": {"b": 1}}));
        // Fallback wrapper.
        assert_eq!(
            extract_output_json("no json here"),
            serde_json::json!({"text": "no json here"})
        );
    }

    #[test]
    fn balanced_object_respects_strings() {
        let tricky = r#"note {"msg": "brace } inside", "n": 1} tail"#;
        assert_eq!(
            extract_output_json(tricky),
            serde_json::json!({"msg": "brace } inside", "n": 1})
        );
    }
}
