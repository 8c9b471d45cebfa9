use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SpecError;

/// Closed set of property types a widget may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyType {
    String,
    Boolean,
    Integer,
    Decimal,
    Enumeration,
    Expression,
    TextTemplate,
    File,
    Attribute,
    Association,
    Object,
    Datasource,
    Icon,
    Image,
    Widgets,
    Action,
}

impl PropertyType {
    pub const ALL: [PropertyType; 16] = [
        PropertyType::String,
        PropertyType::Boolean,
        PropertyType::Integer,
        PropertyType::Decimal,
        PropertyType::Enumeration,
        PropertyType::Expression,
        PropertyType::TextTemplate,
        PropertyType::File,
        PropertyType::Attribute,
        PropertyType::Association,
        PropertyType::Object,
        PropertyType::Datasource,
        PropertyType::Icon,
        PropertyType::Image,
        PropertyType::Widgets,
        PropertyType::Action,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Boolean => "boolean",
            PropertyType::Integer => "integer",
            PropertyType::Decimal => "decimal",
            PropertyType::Enumeration => "enumeration",
            PropertyType::Expression => "expression",
            PropertyType::TextTemplate => "textTemplate",
            PropertyType::File => "file",
            PropertyType::Attribute => "attribute",
            PropertyType::Association => "association",
            PropertyType::Object => "object",
            PropertyType::Datasource => "datasource",
            PropertyType::Icon => "icon",
            PropertyType::Image => "image",
            PropertyType::Widgets => "widgets",
            PropertyType::Action => "action",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        PropertyType::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyType::parse(s).ok_or_else(|| SpecError::UnknownPropertyType {
            key: String::new(),
            type_name: s.to_string(),
        })
    }
}

/// One value of an `enumeration` property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerationOption {
    pub key: String,
    #[serde(default)]
    pub caption: String,
}

/// One configurable input of a widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyNode {
    pub key: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Enumeration values; empty for every other type.
    #[serde(default, alias = "enumerationValues", skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<EnumerationOption>,
    /// Key of the datasource property an attribute/action/expression is linked to.
    #[serde(default, alias = "dataSource", skip_serializing_if = "Option::is_none")]
    pub data_source_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_types: Vec<String>,
    /// Nested property tree of an `object` property.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_groups: Vec<PropertyGroup>,
}

impl PropertyNode {
    pub fn new(key: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            key: key.into(),
            property_type,
            caption: String::new(),
            description: None,
            is_list: false,
            required: false,
            default_value: None,
            options: Vec::new(),
            data_source_ref: None,
            attribute_types: Vec::new(),
            nested_groups: Vec::new(),
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    pub fn with_data_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source_ref = Some(data_source.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_nested(mut self, groups: Vec<PropertyGroup>) -> Self {
        self.nested_groups = groups;
        self
    }

    /// Flattened nested properties of an `object` property, in declaration order.
    pub fn nested_properties(&self) -> Vec<&PropertyNode> {
        let mut out = Vec::new();
        for group in &self.nested_groups {
            group.collect_into(&mut out);
        }
        out
    }

    pub fn is_object_list(&self) -> bool {
        self.property_type == PropertyType::Object && self.is_list
    }
}

/// A captioned group of properties and sub-groups.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertyGroup {
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub properties: Vec<PropertyNode>,
    #[serde(default, rename = "propertyGroups", alias = "groups")]
    pub groups: Vec<PropertyGroup>,
}

impl PropertyGroup {
    pub fn new(caption: impl Into<String>, properties: Vec<PropertyNode>) -> Self {
        Self {
            caption: caption.into(),
            properties,
            groups: Vec::new(),
        }
    }

    fn collect_into<'a>(&'a self, out: &mut Vec<&'a PropertyNode>) {
        out.extend(self.properties.iter());
        for group in &self.groups {
            group.collect_into(out);
        }
    }
}

/// Static description of a widget's configurable inputs.
///
/// Accepts either a bare `PropertyNode[]` or `{ properties, propertyGroups }`
/// when deserialized; always serializes to the grouped form.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "SpecInput", into = "SpecDocument")]
pub struct PropertySpec {
    pub properties: Vec<PropertyNode>,
    pub groups: Vec<PropertyGroup>,
}

impl PropertySpec {
    pub fn new(properties: Vec<PropertyNode>) -> Self {
        Self {
            properties,
            groups: Vec::new(),
        }
    }

    pub fn with_groups(groups: Vec<PropertyGroup>) -> Self {
        Self {
            properties: Vec::new(),
            groups,
        }
    }

    /// Every top-level property (ungrouped first, then groups depth-first).
    /// Does not descend into `object` properties.
    pub fn flatten(&self) -> Vec<&PropertyNode> {
        let mut out: Vec<&PropertyNode> = self.properties.iter().collect();
        for group in &self.groups {
            group.collect_into(&mut out);
        }
        out
    }

    pub fn find(&self, key: &str) -> Option<&PropertyNode> {
        self.flatten().into_iter().find(|p| p.key == key)
    }

    /// Keys of top-level datasource properties, in declaration order.
    pub fn datasource_keys(&self) -> Vec<String> {
        self.flatten()
            .into_iter()
            .filter(|p| p.property_type == PropertyType::Datasource)
            .map(|p| p.key.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.flatten().is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecInput {
    Flat(Vec<PropertyNode>),
    Document(SpecDocument),
}

#[derive(Serialize, Deserialize)]
struct SpecDocument {
    #[serde(default)]
    properties: Vec<PropertyNode>,
    #[serde(default, rename = "propertyGroups")]
    property_groups: Vec<PropertyGroup>,
}

impl From<SpecInput> for PropertySpec {
    fn from(input: SpecInput) -> Self {
        match input {
            SpecInput::Flat(properties) => PropertySpec::new(properties),
            SpecInput::Document(doc) => PropertySpec {
                properties: doc.properties,
                groups: doc.property_groups,
            },
        }
    }
}

impl From<PropertySpec> for SpecDocument {
    fn from(spec: PropertySpec) -> Self {
        SpecDocument {
            properties: spec.properties,
            property_groups: spec.groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_names_round_trip() {
        for t in PropertyType::ALL {
            assert_eq!(PropertyType::parse(t.as_str()), Some(t));
        }
        assert_eq!(PropertyType::parse("textTemplate"), Some(PropertyType::TextTemplate));
        assert_eq!(PropertyType::parse("Text"), None);
    }

    #[test]
    fn test_flatten_walks_groups_depth_first() {
        let spec = PropertySpec {
            properties: vec![PropertyNode::new("a", PropertyType::String)],
            groups: vec![PropertyGroup {
                caption: "General".into(),
                properties: vec![PropertyNode::new("b", PropertyType::Boolean)],
                groups: vec![PropertyGroup::new(
                    "Inner",
                    vec![PropertyNode::new("c", PropertyType::Integer)],
                )],
            }],
        };
        let keys: Vec<_> = spec.flatten().iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_deserialize_flat_and_grouped_forms() {
        let flat: PropertySpec =
            serde_json::from_str(r#"[{"key":"label","type":"string"}]"#).unwrap();
        assert_eq!(flat.flatten().len(), 1);

        let grouped: PropertySpec = serde_json::from_str(
            r#"{"propertyGroups":[{"caption":"G","properties":[{"key":"ds","type":"datasource","isList":true}]}]}"#,
        )
        .unwrap();
        assert_eq!(grouped.datasource_keys(), vec!["ds".to_string()]);
        assert!(grouped.find("ds").unwrap().is_list);
    }

    #[test]
    fn test_object_nested_properties() {
        let node = PropertyNode::new("columns", PropertyType::Object)
            .list()
            .with_nested(vec![PropertyGroup::new(
                "Column",
                vec![
                    PropertyNode::new("header", PropertyType::TextTemplate),
                    PropertyNode::new("width", PropertyType::Integer),
                ],
            )]);
        assert!(node.is_object_list());
        assert_eq!(node.nested_properties().len(), 2);
    }
}
