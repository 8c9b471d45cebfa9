//! Flat property-value maps supplied by the caller.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{SpecError, SpecResult};
use crate::property::{PropertySpec, PropertyType};

/// Property key → raw value (string, number, boolean or JSON text).
pub type PropertyValueMap = BTreeMap<String, Value>;

/// Parse a JSON object into a value map.
pub fn parse_values_json(text: &str) -> SpecResult<PropertyValueMap> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(SpecError::InvalidValueMap {
            found: json_kind(&other).to_string(),
        }),
    }
}

/// Copy of `values` with spec default values filled in for missing top-level keys.
pub fn with_defaults(spec: &PropertySpec, values: &PropertyValueMap) -> PropertyValueMap {
    let mut out = values.clone();
    for property in spec.flatten() {
        if out.contains_key(&property.key) {
            continue;
        }
        if let Some(ref default) = property.default_value {
            out.insert(
                property.key.clone(),
                typed_default(property.property_type, default),
            );
        }
    }
    out
}

/// Copy of `values` with the datasource `key` replaced by a committed item list.
///
/// Datasources inside object lists commit under a path such as `columns[0].rows`;
/// the item list is then written into that record of the parent list, keeping the
/// parent's form (JSON text or array). A path that does not resolve leaves the
/// values unchanged.
pub fn merge_datasource_commit(
    values: &PropertyValueMap,
    key: &str,
    items_json: &str,
) -> PropertyValueMap {
    let mut out = values.clone();
    let Some((steps, leaf)) = parse_datasource_path(key) else {
        out.insert(key.to_string(), Value::String(items_json.to_string()));
        return out;
    };
    let Some(((parent, index), rest)) = steps.split_first() else {
        return out;
    };
    let merged = out
        .get_mut(parent.as_str())
        .map(|list| merge_into_list(list, *index, rest, leaf, items_json))
        .unwrap_or(false);
    if !merged {
        return values.clone();
    }
    out
}

/// `a[0].b[1].ds` → `([("a", 0), ("b", 1)], "ds")`. `None` for a plain key.
fn parse_datasource_path(key: &str) -> Option<(Vec<(String, usize)>, &str)> {
    if !key.contains('[') {
        return None;
    }
    let mut segments: Vec<&str> = key.split('.').collect();
    let leaf = segments.pop().filter(|l| !l.is_empty() && !l.contains('['))?;
    let steps = segments
        .into_iter()
        .map(|segment| {
            let (name, rest) = segment.split_once('[')?;
            let index = rest.strip_suffix(']')?.parse::<usize>().ok()?;
            Some((name.to_string(), index))
        })
        .collect::<Option<Vec<_>>>()?;
    Some((steps, leaf))
}

fn merge_into_list(
    list: &mut Value,
    index: usize,
    rest: &[(String, usize)],
    leaf: &str,
    items_json: &str,
) -> bool {
    let as_text = list.is_string();
    let mut parsed = match &*list {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(v) => v,
            Err(_) => return false,
        },
        other => other.clone(),
    };
    let Some(record) = parsed.get_mut(index).and_then(Value::as_object_mut) else {
        return false;
    };
    let merged = match rest.split_first() {
        None => {
            record.insert(leaf.to_string(), Value::String(items_json.to_string()));
            true
        }
        Some(((name, inner), tail)) => record
            .get_mut(name.as_str())
            .map(|nested| merge_into_list(nested, *inner, tail, leaf, items_json))
            .unwrap_or(false),
    };
    if merged {
        *list = if as_text {
            Value::String(parsed.to_string())
        } else {
            parsed
        };
    }
    merged
}

/// Text form of a raw value: strings as-is, structured values re-serialized.
pub fn raw_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn typed_default(property_type: PropertyType, default: &str) -> Value {
    match property_type {
        PropertyType::Boolean => Value::Bool(default == "true"),
        PropertyType::Integer => default
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(default.to_string())),
        PropertyType::Decimal => default
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(default.to_string())),
        _ => Value::String(default.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyNode;
    use serde_json::json;

    #[test]
    fn test_parse_values_requires_object() {
        let values = parse_values_json(r#"{"label":"hi","count":3}"#).unwrap();
        assert_eq!(values["label"], json!("hi"));
        assert!(matches!(
            parse_values_json("[1,2]"),
            Err(SpecError::InvalidValueMap { .. })
        ));
    }

    #[test]
    fn test_defaults_are_typed_and_do_not_override() {
        let spec = PropertySpec::new(vec![
            PropertyNode::new("enabled", PropertyType::Boolean).with_default("true"),
            PropertyNode::new("count", PropertyType::Integer).with_default("4"),
            PropertyNode::new("label", PropertyType::String).with_default("x"),
        ]);
        let mut values = PropertyValueMap::new();
        values.insert("label".into(), json!("given"));
        let filled = with_defaults(&spec, &values);
        assert_eq!(filled["enabled"], json!(true));
        assert_eq!(filled["count"], json!(4));
        assert_eq!(filled["label"], json!("given"));
    }

    #[test]
    fn test_merge_commit_leaves_input_untouched() {
        let mut values = PropertyValueMap::new();
        values.insert("ds".into(), json!("[]"));
        let merged = merge_datasource_commit(&values, "ds", r#"[{"name":"a"}]"#);
        assert_eq!(values["ds"], json!("[]"));
        assert_eq!(merged["ds"], json!(r#"[{"name":"a"}]"#));
    }

    #[test]
    fn test_merge_commit_into_nested_datasource_text() {
        let mut values = PropertyValueMap::new();
        values.insert(
            "columns".into(),
            json!(r#"[{"title":"A","rows":"[{\"n\":1}]"},{"title":"B"}]"#),
        );
        let merged = merge_datasource_commit(&values, "columns[1].rows", r#"[{"n":2}]"#);

        let columns: Value = serde_json::from_str(merged["columns"].as_str().unwrap()).unwrap();
        assert_eq!(columns[0]["rows"], json!(r#"[{"n":1}]"#));
        assert_eq!(columns[1]["rows"], json!(r#"[{"n":2}]"#));
        assert_eq!(columns[1]["title"], json!("B"));
        assert!(!merged.contains_key("columns[1].rows"));
    }

    #[test]
    fn test_merge_commit_into_nested_array_two_levels() {
        let mut values = PropertyValueMap::new();
        values.insert(
            "groups".into(),
            json!([{"columns": [{"rows": "[]"}]}]),
        );
        let merged = merge_datasource_commit(&values, "groups[0].columns[0].rows", r#"[{"n":1}]"#);
        assert_eq!(merged["groups"], json!([{"columns": [{"rows": r#"[{"n":1}]"#}]}]));
    }

    #[test]
    fn test_merge_commit_with_unresolved_path_is_a_no_op() {
        let mut values = PropertyValueMap::new();
        values.insert("columns".into(), json!("[]"));
        assert_eq!(merge_datasource_commit(&values, "columns[3].rows", "[]"), values);
        assert_eq!(merge_datasource_commit(&values, "missing[0].rows", "[]"), values);
    }
}
