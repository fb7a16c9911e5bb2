//! Rendering JSON values as JavaScript source.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

/// Object key as written in source: bare when it is an identifier.
pub fn render_key(key: &str) -> String {
    if IDENTIFIER.is_match(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

/// JSON-quoted string. Valid JavaScript since ES2019.
pub fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// A value as a JavaScript expression, `{ key: value }` style for objects.
pub fn render_js(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let items: Vec<_> = items.iter().map(render_js).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(map) => {
            let members: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", render_key(k), render_js(v)))
                .collect();
            format!("{{ {} }}", members.join(", "))
        }
    }
}

/// A value as a JSX attribute initializer: `"text"` when the string can be
/// written literally, `{expression}` otherwise.
pub fn render_attribute_value(value: &Value) -> String {
    match value {
        // JSX strings have no escapes; quotes and entities need an expression.
        Value::String(s) if !s.contains('"') && !s.contains('&') => format!("\"{s}\""),
        other => format!("{{{}}}", render_js(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_key() {
        assert_eq!(render_key("field"), "field");
        assert_eq!(render_key("$ref_2"), "$ref_2");
        assert_eq!(render_key("data-x"), "\"data-x\"");
        assert_eq!(render_key("2d"), "\"2d\"");
    }

    #[test]
    fn test_render_js() {
        assert_eq!(render_js(&json!("number")), "\"number\"");
        assert_eq!(render_js(&json!(null)), "null");
        assert_eq!(render_js(&json!(1.5)), "1.5");
        assert_eq!(render_js(&json!([1, "a"])), "[1, \"a\"]");
        assert_eq!(
            render_js(&json!({"field": "id", "min-width": 10})),
            "{ field: \"id\", \"min-width\": 10 }"
        );
        assert_eq!(render_js(&json!({})), "{}");
    }

    #[test]
    fn test_render_attribute_value() {
        assert_eq!(render_attribute_value(&json!("primary")), "\"primary\"");
        assert_eq!(render_attribute_value(&json!("a \"b\"")), "{\"a \\\"b\\\"\"}");
        assert_eq!(render_attribute_value(&json!("R&D")), "{\"R&D\"}");
        assert_eq!(render_attribute_value(&json!(3)), "{3}");
        assert_eq!(render_attribute_value(&json!(false)), "{false}");
    }
}
