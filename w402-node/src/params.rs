//! Structured parameter shapes shared by the nodes.
//!
//! Hosts hand over collections as `{ "<key>": [{ "name", "value" }] }` and
//! JSON fields either as already-parsed values or as raw text.

use serde::de::DeserializeOwned;
use serde_json::Value;
use w402::NodeError;
use w402::node::NodeContext;

/// Reads an option selector such as `operation` into a tagged enum.
///
/// # Errors
///
/// Returns a validation error naming the parameter when the value is not one
/// of the variants.
pub fn choice<T: DeserializeOwned>(
    ctx: &dyn NodeContext,
    name: &str,
    item: usize,
    default: &str,
) -> Result<T, NodeError> {
    let raw = ctx
        .parameter(name, item)
        .filter(|v| !v.is_null())
        .unwrap_or_else(|| Value::String(default.to_owned()));
    serde_json::from_value(raw.clone()).map_err(|_| {
        NodeError::validation(format!("The {name} {} is not supported", display(&raw)))
    })
}

/// `(name, value)` pairs of a fixed collection, skipping blank names.
#[must_use]
pub fn pairs(ctx: &dyn NodeContext, name: &str, key: &str, item: usize) -> Vec<(String, String)> {
    ctx.parameter(name, item)
        .as_ref()
        .and_then(|collection| collection.get(key))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let name = display(entry.get("name")?);
                    if name.trim().is_empty() {
                        return None;
                    }
                    let value = entry.get("value").map(display).unwrap_or_default();
                    Some((name, value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A JSON parameter given either as a value or as text.
///
/// Missing or blank text yields `None`.
///
/// # Errors
///
/// Returns a configuration error when the text does not parse.
pub fn json(ctx: &dyn NodeContext, name: &str, item: usize) -> Result<Option<Value>, NodeError> {
    match ctx.parameter(name, item) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => serde_json::from_str(&text).map(Some).map_err(|e| {
            NodeError::configuration(format!("Invalid JSON in '{name}'"))
                .with_description(e.to_string())
        }),
        Some(value) => Ok(Some(value)),
    }
}

/// The `options` collection of a node, or an empty object.
#[must_use]
pub fn options(ctx: &dyn NodeContext, item: usize) -> Value {
    ctx.parameter("options", item)
        .filter(Value::is_object)
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
}

/// Renders a scalar the way a form field shows it.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use w402::ErrorKind;
    use w402::node::StaticContext;

    #[derive(Debug, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "camelCase")]
    enum Operation {
        Sign,
        Verify,
    }

    #[test]
    fn test_choice_reads_tagged_variants() {
        let ctx = StaticContext::single().with_parameter("operation", "verify");
        assert_eq!(choice::<Operation>(&ctx, "operation", 0, "sign").unwrap(), Operation::Verify);
        let ctx = StaticContext::single();
        assert_eq!(choice::<Operation>(&ctx, "operation", 0, "sign").unwrap(), Operation::Sign);
        let ctx = StaticContext::single().with_parameter("operation", "burn");
        let err = choice::<Operation>(&ctx, "operation", 0, "sign").unwrap_err();
        assert_eq!(err.message, "The operation burn is not supported");
    }

    #[test]
    fn test_pairs_skip_blank_names() {
        let ctx = StaticContext::single().with_parameter(
            "headers",
            json!({"header": [
                {"name": "X-Trace", "value": "abc"},
                {"name": "", "value": "dropped"},
                {"name": "X-Count", "value": 3}
            ]}),
        );
        assert_eq!(
            pairs(&ctx, "headers", "header", 0),
            vec![("X-Trace".to_owned(), "abc".to_owned()), ("X-Count".to_owned(), "3".to_owned())]
        );
        assert!(pairs(&ctx, "missing", "header", 0).is_empty());
    }

    #[test]
    fn test_json_accepts_text_or_value() {
        let ctx = StaticContext::single()
            .with_parameter("a", r#"{"x": 1}"#)
            .with_parameter("b", json!({"y": 2}))
            .with_parameter("c", "   ")
            .with_parameter("d", "{oops");
        assert_eq!(json(&ctx, "a", 0).unwrap(), Some(json!({"x": 1})));
        assert_eq!(json(&ctx, "b", 0).unwrap(), Some(json!({"y": 2})));
        assert_eq!(json(&ctx, "c", 0).unwrap(), None);
        let err = json(&ctx, "d", 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert_eq!(err.message, "Invalid JSON in 'd'");
    }
}
