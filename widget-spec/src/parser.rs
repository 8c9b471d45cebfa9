use roxmltree::Node;
use serde::{Deserialize, Serialize};

use crate::error::{SpecError, SpecResult};
use crate::property::{EnumerationOption, PropertyGroup, PropertyNode, PropertySpec, PropertyType};
use crate::validator::{validate_spec, MAX_NESTING_DEPTH};

/// A parsed widget definition (`<widget id="…">` XML document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetDefinition {
    /// Dotted widget id, e.g. `com.example.Rating`
    pub id: String,
    /// Human readable name from `<name>`
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub spec: PropertySpec,
}

impl WidgetDefinition {
    /// Name the bundle registers its component under: the last segment of the id.
    pub fn component_name(&self) -> &str {
        self.id.rsplit('.').next().unwrap_or(&self.id)
    }
}

// ─── Public parse functions ──────────────────────────────────────────────────

/// Parse a widget definition XML document and validate its property tree.
pub fn parse_widget_xml(xml: &str) -> SpecResult<WidgetDefinition> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();

    let definition = match root.tag_name().name() {
        "widget" => {
            let id = required_attribute(root, "id")?.to_string();
            let name = child_text(root, "name").unwrap_or_default();
            let description = child_text(root, "description").filter(|d| !d.is_empty());
            let spec = match element_children(root).find(|n| n.tag_name().name() == "properties") {
                Some(props) => parse_properties_node(props, 0)?,
                None => PropertySpec::default(),
            };
            WidgetDefinition {
                id,
                name,
                description,
                spec,
            }
        }
        "properties" => WidgetDefinition {
            id: String::new(),
            name: String::new(),
            description: None,
            spec: parse_properties_node(root, 0)?,
        },
        other => {
            return Err(SpecError::ValidationError(format!(
                "Unexpected root element <{}>. Expected <widget> or <properties>.",
                other
            )))
        }
    };

    validate_spec(&definition.spec)?;
    Ok(definition)
}

/// Parse only the property specification out of a widget definition XML document.
pub fn parse_spec_xml(xml: &str) -> SpecResult<PropertySpec> {
    parse_widget_xml(xml).map(|def| def.spec)
}

/// Parse a JSON specification (`PropertyNode[]` or `{ properties, propertyGroups }`).
pub fn parse_spec_json(text: &str) -> SpecResult<PropertySpec> {
    let spec: PropertySpec = serde_json::from_str(text)?;
    validate_spec(&spec)?;
    Ok(spec)
}

/// Parse a YAML specification with the same shape as the JSON form.
pub fn parse_spec_yaml(text: &str) -> SpecResult<PropertySpec> {
    let spec: PropertySpec = serde_yaml::from_str(text)?;
    validate_spec(&spec)?;
    Ok(spec)
}

/// Parse a specification, picking the format from the first significant character.
pub fn parse_spec(text: &str) -> SpecResult<PropertySpec> {
    match text.trim_start().chars().next() {
        None => Err(SpecError::EmptySpec),
        Some('<') => parse_spec_xml(text),
        Some('[') | Some('{') => parse_spec_json(text),
        Some(_) => parse_spec_yaml(text),
    }
}

// ─── XML helpers ─────────────────────────────────────────────────────────────

fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child_text(node: Node, tag: &str) -> Option<String> {
    element_children(node)
        .find(|n| n.tag_name().name() == tag)
        .map(|n| n.text().unwrap_or_default().trim().to_string())
}

fn required_attribute<'a>(node: Node<'a, '_>, attribute: &str) -> SpecResult<&'a str> {
    node.attribute(attribute)
        .ok_or_else(|| SpecError::MissingAttribute {
            element: node.tag_name().name().to_string(),
            attribute: attribute.to_string(),
        })
}

fn bool_attribute(node: Node, attribute: &str) -> bool {
    matches!(node.attribute(attribute), Some("true"))
}

/// `<properties>`: ungrouped `<property>` elements and `<propertyGroup>` elements.
fn parse_properties_node(node: Node, depth: usize) -> SpecResult<PropertySpec> {
    if depth > MAX_NESTING_DEPTH {
        return Err(SpecError::MaxNestingDepthExceeded {
            max_depth: MAX_NESTING_DEPTH,
        });
    }

    let mut spec = PropertySpec::default();
    for child in element_children(node) {
        match child.tag_name().name() {
            "property" => spec.properties.push(parse_property_node(child, depth)?),
            "propertyGroup" => spec.groups.push(parse_group_node(child, depth + 1)?),
            // Platform-provided properties (name, visibility, tab index) have no runtime value.
            "systemProperty" => {}
            other => {
                return Err(SpecError::ValidationError(format!(
                    "<properties>: unexpected element <{}>",
                    other
                )))
            }
        }
    }
    Ok(spec)
}

fn parse_group_node(node: Node, depth: usize) -> SpecResult<PropertyGroup> {
    if depth > MAX_NESTING_DEPTH {
        return Err(SpecError::MaxNestingDepthExceeded {
            max_depth: MAX_NESTING_DEPTH,
        });
    }

    let mut group = PropertyGroup {
        caption: node.attribute("caption").unwrap_or_default().to_string(),
        ..PropertyGroup::default()
    };
    for child in element_children(node) {
        match child.tag_name().name() {
            "property" => group.properties.push(parse_property_node(child, depth)?),
            "propertyGroup" => group.groups.push(parse_group_node(child, depth + 1)?),
            "systemProperty" => {}
            other => {
                return Err(SpecError::ValidationError(format!(
                    "<propertyGroup caption=\"{}\">: unexpected element <{}>",
                    group.caption, other
                )))
            }
        }
    }
    Ok(group)
}

fn parse_property_node(node: Node, depth: usize) -> SpecResult<PropertyNode> {
    let key = required_attribute(node, "key")?.to_string();
    let type_name = required_attribute(node, "type")?;
    let property_type =
        PropertyType::parse(type_name).ok_or_else(|| SpecError::UnknownPropertyType {
            key: key.clone(),
            type_name: type_name.to_string(),
        })?;

    let mut property = PropertyNode::new(key, property_type);
    property.is_list = bool_attribute(node, "isList");
    property.required = bool_attribute(node, "required");
    property.default_value = node.attribute("defaultValue").map(str::to_string);
    property.data_source_ref = node.attribute("dataSource").map(str::to_string);

    for child in element_children(node) {
        match child.tag_name().name() {
            "caption" => property.caption = child.text().unwrap_or_default().trim().to_string(),
            "description" => {
                let text = child.text().unwrap_or_default().trim();
                if !text.is_empty() {
                    property.description = Some(text.to_string());
                }
            }
            "enumerationValues" => {
                for value in element_children(child) {
                    property.options.push(EnumerationOption {
                        key: required_attribute(value, "key")?.to_string(),
                        caption: value.text().unwrap_or_default().trim().to_string(),
                    });
                }
            }
            "attributeTypes" => {
                for attr in element_children(child) {
                    property
                        .attribute_types
                        .push(required_attribute(attr, "name")?.to_string());
                }
            }
            "properties" => {
                // Nested tree of an object property. Loose properties get an untitled group.
                let nested = parse_properties_node(child, depth + 1)?;
                if !nested.properties.is_empty() {
                    property
                        .nested_groups
                        .push(PropertyGroup::new("", nested.properties));
                }
                property.nested_groups.extend(nested.groups);
            }
            // Editor-only metadata.
            "returnType" | "associationTypes" | "selectionTypes" | "actionVariables" => {}
            other => {
                return Err(SpecError::ValidationError(format!(
                    "<property key=\"{}\">: unexpected element <{}>",
                    property.key, other
                )))
            }
        }
    }

    Ok(property)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_widget() {
        let xml = r#"
<widget id="com.example.Badge" pluginWidget="true" xmlns="http://www.mendix.com/widget/1.0/">
  <name>Badge</name>
  <description>Shows a badge</description>
  <properties>
    <propertyGroup caption="General">
      <property key="label" type="string">
        <caption>Label</caption>
        <description />
      </property>
    </propertyGroup>
  </properties>
</widget>"#;
        let def = parse_widget_xml(xml).unwrap();
        assert_eq!(def.id, "com.example.Badge");
        assert_eq!(def.component_name(), "Badge");
        assert_eq!(def.description.as_deref(), Some("Shows a badge"));
        let label = def.spec.find("label").unwrap();
        assert_eq!(label.caption, "Label");
        assert_eq!(label.description, None);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let xml = r#"<properties><property key="x" type="color"><caption>X</caption></property></properties>"#;
        let err = parse_spec_xml(xml).unwrap_err();
        assert!(matches!(err, SpecError::UnknownPropertyType { .. }));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let xml = r#"<properties><property type="string"/></properties>"#;
        let err = parse_spec_xml(xml).unwrap_err();
        assert_eq!(
            err,
            SpecError::MissingAttribute {
                element: "property".into(),
                attribute: "key".into()
            }
        );
    }

    #[test]
    fn test_parse_spec_detects_format() {
        assert!(parse_spec(r#"[{"key":"a","type":"string"}]"#).is_ok());
        assert!(parse_spec("properties:\n  - key: a\n    type: boolean\n").is_ok());
        assert!(parse_spec(r#"<properties><property key="a" type="string"/></properties>"#).is_ok());
        assert_eq!(parse_spec("   ").unwrap_err(), SpecError::EmptySpec);
    }
}
