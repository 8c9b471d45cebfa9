use pretty_assertions::assert_eq;
use std::fs;
use std::path::PathBuf;
use widget_spec::{
    parse_spec, parse_spec_json, parse_widget_xml, with_defaults, PropertySpec, PropertyType,
    PropertyValueMap, SpecError,
};

fn fixture(filename: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("fixtures");
    path.push(filename);
    fs::read_to_string(&path).unwrap()
}

#[test]
fn test_datagrid_definition() {
    let def = parse_widget_xml(&fixture("datagrid.xml")).unwrap();
    assert_eq!(def.id, "com.example.widget.MiniGrid");
    assert_eq!(def.name, "Mini grid");
    assert_eq!(def.component_name(), "MiniGrid");

    let keys: Vec<_> = def.spec.flatten().iter().map(|p| p.key.clone()).collect();
    assert_eq!(keys, vec!["ds", "columns", "density", "showHeader", "emptyText"]);
    assert_eq!(def.spec.datasource_keys(), vec!["ds".to_string()]);
}

#[test]
fn test_datagrid_object_columns() {
    let def = parse_widget_xml(&fixture("datagrid.xml")).unwrap();
    let columns = def.spec.find("columns").unwrap();
    assert!(columns.is_object_list());

    let nested = columns.nested_properties();
    assert_eq!(nested.len(), 2);
    assert_eq!(nested[0].property_type, PropertyType::TextTemplate);
    assert_eq!(nested[1].data_source_ref.as_deref(), Some("ds"));
    assert_eq!(nested[1].attribute_types, vec!["String", "Integer"]);
}

#[test]
fn test_datagrid_enumeration_and_defaults() {
    let def = parse_widget_xml(&fixture("datagrid.xml")).unwrap();
    let density = def.spec.find("density").unwrap();
    let option_keys: Vec<_> = density.options.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(option_keys, vec!["compact", "normal"]);

    let values = with_defaults(&def.spec, &PropertyValueMap::new());
    assert_eq!(values["density"], serde_json::json!("normal"));
    assert_eq!(values["showHeader"], serde_json::json!(true));
    assert!(!values.contains_key("emptyText"));
}

#[test]
fn test_badge_json_spec() {
    let spec = parse_spec(&fixture("badge.json")).unwrap();
    assert_eq!(spec.groups.len(), 1);
    assert_eq!(spec.find("onClick").unwrap().property_type, PropertyType::Action);
}

#[test]
fn test_rating_yaml_spec() {
    let spec = parse_spec(&fixture("rating.yaml")).unwrap();
    assert_eq!(spec.flatten().len(), 3);
    assert_eq!(spec.find("readOnlyStyle").unwrap().options.len(), 2);
}

#[test]
fn test_duplicate_key_fixture() {
    let err = parse_spec(&fixture("duplicate-key.json")).unwrap_err();
    assert_eq!(err, SpecError::DuplicateKey { key: "label".into() });
}

#[test]
fn test_unknown_datasource_fixture() {
    let err = parse_widget_xml(&fixture("unknown-datasource.xml")).unwrap_err();
    assert_eq!(
        err,
        SpecError::UnknownDataSource {
            key: "name".into(),
            data_source: "missing".into()
        }
    );
}

#[test]
fn test_spec_serializes_to_grouped_form() {
    let spec = parse_spec_json(r#"[{"key":"label","type":"string"}]"#).unwrap();
    let json = serde_json::to_value(&spec).unwrap();
    assert_eq!(json["properties"][0]["key"], "label");
    assert_eq!(json["propertyGroups"], serde_json::json!([]));

    let back: PropertySpec = serde_json::from_value(json).unwrap();
    assert_eq!(back, spec);
}

#[test]
fn test_malformed_inputs() {
    assert!(matches!(parse_spec("[{"), Err(SpecError::JsonError(_))));
    assert!(matches!(parse_spec("<widget"), Err(SpecError::XmlError(_))));
    assert!(matches!(
        parse_spec(r#"[{"key":"a","type":"colour"}]"#),
        Err(SpecError::JsonError(_))
    ));
}
