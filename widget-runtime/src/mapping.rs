//! Property mapping: flat caller values + spec → the typed props a component receives.
//!
//! Runs host-side. The result crosses the bridge as plain data; the sandbox
//! turns each [`MappedValue`] into its Lua shape (see `lua_api::props`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::trace;
use widget_spec::values::raw_text;
use widget_spec::{PropertyNode, PropertySpec, PropertyType, PropertyValueMap};

pub type MappedProps = BTreeMap<String, MappedValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MappedValue {
    /// Passed through unchanged.
    Raw { value: Value },
    /// Live datasource backed by the JSON text `source`.
    Datasource { key: String, source: Option<String> },
    /// Attribute bound to a field of datasource items: `attr.get(item)`.
    ListAttribute { field: String },
    /// Writable value wrapper with `setValue`.
    EditableValue { value: Value },
    /// `{ value, status = "available" }`
    Expression { value: Value },
    /// `{ value = String(value) }`
    TextTemplate { value: String },
    /// One mapped record per list entry.
    ObjectList { items: Vec<MappedProps> },
}

/// How one property type is turned into component props.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingStrategy {
    Datasource,
    Attribute,
    Expression,
    TextTemplate,
    ObjectList,
    Identity,
}

/// Total over every type; anything without a dedicated shape maps to `Identity`.
pub fn strategy_for(property_type: PropertyType, is_list: bool) -> MappingStrategy {
    match property_type {
        PropertyType::Datasource => MappingStrategy::Datasource,
        PropertyType::Attribute => MappingStrategy::Attribute,
        PropertyType::Expression => MappingStrategy::Expression,
        PropertyType::TextTemplate => MappingStrategy::TextTemplate,
        PropertyType::Object if is_list => MappingStrategy::ObjectList,
        _ => MappingStrategy::Identity,
    }
}

/// Map the caller's values against the spec. Never fails.
pub fn map_properties(values: &PropertyValueMap, spec: &PropertySpec) -> MappedProps {
    let record: serde_json::Map<String, Value> =
        values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    map_record(&record, &spec.flatten(), None)
}

/// `prefix` namespaces datasource keys inside object lists (`columns[0].ds`).
fn map_record(
    record: &serde_json::Map<String, Value>,
    nodes: &[&PropertyNode],
    prefix: Option<&str>,
) -> MappedProps {
    let mut out = MappedProps::new();

    for node in nodes {
        let raw = record.get(&node.key).filter(|v| !v.is_null());
        if let Some(mapped) = map_value(node, raw, prefix) {
            out.insert(node.key.clone(), mapped);
        }
    }

    // Values with no spec node still reach the component.
    for (key, value) in record {
        if !out.contains_key(key) && !nodes.iter().any(|n| &n.key == key) {
            trace!(key = %key, "no spec node for value, passing through");
            out.insert(key.clone(), MappedValue::Raw { value: value.clone() });
        }
    }

    out
}

fn map_value(node: &PropertyNode, raw: Option<&Value>, prefix: Option<&str>) -> Option<MappedValue> {
    match strategy_for(node.property_type, node.is_list) {
        MappingStrategy::Datasource => Some(MappedValue::Datasource {
            key: match prefix {
                Some(p) => format!("{}.{}", p, node.key),
                None => node.key.clone(),
            },
            source: raw.and_then(raw_text),
        }),
        MappingStrategy::Attribute => match raw.and_then(raw_text).filter(|s| !s.is_empty()) {
            Some(field) => Some(MappedValue::ListAttribute { field }),
            None => Some(MappedValue::EditableValue {
                value: raw.cloned().unwrap_or(Value::Null),
            }),
        },
        MappingStrategy::Expression => Some(MappedValue::Expression {
            value: raw.cloned().unwrap_or(Value::Null),
        }),
        MappingStrategy::TextTemplate => Some(MappedValue::TextTemplate {
            value: raw.and_then(raw_text).unwrap_or_default(),
        }),
        MappingStrategy::ObjectList => {
            let nested = node.nested_properties();
            let items = object_list_records(node, raw)
                .iter()
                .enumerate()
                .map(|(i, record)| {
                    let path = match prefix {
                        Some(p) => format!("{}.{}[{}]", p, node.key, i),
                        None => format!("{}[{}]", node.key, i),
                    };
                    map_record(record, &nested, Some(&path))
                })
                .collect();
            Some(MappedValue::ObjectList { items })
        }
        MappingStrategy::Identity => {
            if raw.is_none() {
                return None;
            }
            trace!(key = %node.key, kind = %node.property_type, "passing value through unchanged");
            raw.map(|value| MappedValue::Raw {
                value: value.clone(),
            })
        }
    }
}

/// Records of an object list: a JSON array, or JSON text holding one.
fn object_list_records(node: &PropertyNode, raw: Option<&Value>) -> Vec<serde_json::Map<String, Value>> {
    let parsed = match raw {
        None => return Vec::new(),
        Some(Value::String(text)) if text.trim().is_empty() => return Vec::new(),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(v) => v,
            Err(e) => {
                trace!(key = %node.key, error = %e, "object list value is not JSON, using empty list");
                return Vec::new();
            }
        },
        Some(other) => other.clone(),
    };

    match parsed {
        Value::Array(entries) => entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Datasource keys and sources referenced anywhere in the mapped props, outer first.
pub fn datasource_sources(props: &MappedProps) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();
    collect_sources(props, &mut out);
    out
}

fn collect_sources(props: &MappedProps, out: &mut Vec<(String, Option<String>)>) {
    for value in props.values() {
        if let MappedValue::Datasource { key, source } = value {
            out.push((key.clone(), source.clone()));
        }
    }
    for value in props.values() {
        if let MappedValue::ObjectList { items } = value {
            for item in items {
                collect_sources(item, out);
            }
        }
    }
}
