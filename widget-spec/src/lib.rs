//! # Widget property specifications
//!
//! Static description of a pluggable widget's configurable inputs, as declared
//! in its widget definition XML or supplied as JSON/YAML by the desktop manager.
//!
//! ## Example
//! ```ignore
//! use widget_spec::parse_widget_xml;
//!
//! let xml = r#"
//! <widget id="com.example.Badge">
//!   <name>Badge</name>
//!   <properties>
//!     <propertyGroup caption="General">
//!       <property key="label" type="string"><caption>Label</caption></property>
//!     </propertyGroup>
//!   </properties>
//! </widget>
//! "#;
//!
//! let def = parse_widget_xml(xml).expect("valid widget definition");
//! assert_eq!(def.component_name(), "Badge");
//! ```

pub mod error;
pub mod parser;
pub mod property;
pub mod validator;
pub mod values;

pub use error::{SpecError, SpecResult};
pub use parser::{
    parse_spec, parse_spec_json, parse_spec_xml, parse_spec_yaml, parse_widget_xml,
    WidgetDefinition,
};
pub use property::{EnumerationOption, PropertyGroup, PropertyNode, PropertySpec, PropertyType};
pub use validator::validate_spec;
pub use values::{merge_datasource_commit, parse_values_json, with_defaults, PropertyValueMap};
