use thiserror::Error;

pub type SpecResult<T> = Result<T, SpecError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error("XML parse error: {0}")]
    XmlError(String),

    #[error("JSON parse error: {0}")]
    JsonError(String),

    #[error("YAML parse error: {0}")]
    YamlError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Empty specification: no properties found")]
    EmptySpec,

    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    #[error("Unknown property type '{type_name}' for property '{key}'")]
    UnknownPropertyType { key: String, type_name: String },

    #[error("Invalid property key '{key}': keys must start with a letter or '_' and contain only letters, digits and '_'")]
    InvalidKey { key: String },

    #[error("Duplicate property key '{key}': keys must be unique within their property list")]
    DuplicateKey { key: String },

    #[error("Property '{key}' references data source '{data_source}', which is not a datasource property in the same scope")]
    UnknownDataSource { key: String, data_source: String },

    #[error("Enumeration property '{key}' must declare at least one value")]
    EmptyEnumeration { key: String },

    #[error("Duplicate enumeration value '{value}' in property '{key}'")]
    DuplicateEnumerationValue { key: String, value: String },

    #[error("Object property '{key}' must declare nested properties")]
    MissingNestedProperties { key: String },

    #[error("Maximum nesting depth ({max_depth}) exceeded")]
    MaxNestingDepthExceeded { max_depth: usize },

    #[error("Property values must be a JSON object, got {found}")]
    InvalidValueMap { found: String },
}

impl From<roxmltree::Error> for SpecError {
    fn from(err: roxmltree::Error) -> Self {
        SpecError::XmlError(err.to_string())
    }
}

impl From<serde_json::Error> for SpecError {
    fn from(err: serde_json::Error) -> Self {
        SpecError::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for SpecError {
    fn from(err: serde_yaml::Error) -> Self {
        SpecError::YamlError(err.to_string())
    }
}
