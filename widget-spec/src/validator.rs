use crate::error::{SpecError, SpecResult};
use crate::property::{PropertyNode, PropertySpec, PropertyType};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

pub const MAX_NESTING_DEPTH: usize = 20;

fn key_pattern() -> &'static Regex {
    static KEY: OnceLock<Regex> = OnceLock::new();
    KEY.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

/// Validate a whole specification: top-level properties, then every object subtree.
pub fn validate_spec(spec: &PropertySpec) -> SpecResult<()> {
    validate_scope(&spec.flatten(), &HashSet::new(), 0)
}

/// Validate one flat property list (top level or one object's nested tree).
/// Datasources of enclosing scopes stay visible to nested properties.
fn validate_scope(
    properties: &[&PropertyNode],
    enclosing: &HashSet<String>,
    depth: usize,
) -> SpecResult<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(SpecError::MaxNestingDepthExceeded {
            max_depth: MAX_NESTING_DEPTH,
        });
    }

    let mut seen = HashSet::new();
    for property in properties {
        validate_key(&property.key)?;
        if !seen.insert(property.key.as_str()) {
            return Err(SpecError::DuplicateKey {
                key: property.key.clone(),
            });
        }
    }

    let mut datasources = enclosing.clone();
    datasources.extend(
        properties
            .iter()
            .filter(|p| p.property_type == PropertyType::Datasource)
            .map(|p| p.key.clone()),
    );

    for property in properties {
        validate_property(property, &datasources)?;
        if property.property_type == PropertyType::Object {
            let nested = property.nested_properties();
            if nested.is_empty() {
                return Err(SpecError::MissingNestedProperties {
                    key: property.key.clone(),
                });
            }
            validate_scope(&nested, &datasources, depth + 1)?;
        }
    }
    Ok(())
}

fn validate_key(key: &str) -> SpecResult<()> {
    if key_pattern().is_match(key) {
        Ok(())
    } else {
        Err(SpecError::InvalidKey {
            key: key.to_string(),
        })
    }
}

fn validate_property(property: &PropertyNode, datasources: &HashSet<String>) -> SpecResult<()> {
    if let Some(ref ds) = property.data_source_ref {
        if !datasources.contains(ds) {
            return Err(SpecError::UnknownDataSource {
                key: property.key.clone(),
                data_source: ds.clone(),
            });
        }
    }

    if property.property_type == PropertyType::Enumeration {
        if property.options.is_empty() {
            return Err(SpecError::EmptyEnumeration {
                key: property.key.clone(),
            });
        }
        let mut seen = HashSet::new();
        for option in &property.options {
            if !seen.insert(option.key.as_str()) {
                return Err(SpecError::DuplicateEnumerationValue {
                    key: property.key.clone(),
                    value: option.key.clone(),
                });
            }
        }
        if let Some(ref default) = property.default_value {
            if !seen.contains(default.as_str()) {
                return Err(SpecError::ValidationError(format!(
                    "Default value '{}' of enumeration '{}' is not one of its values",
                    default, property.key
                )));
            }
        }
    }

    Ok(())
}
