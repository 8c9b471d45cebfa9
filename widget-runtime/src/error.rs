use serde::{Deserialize, Serialize};
use thiserror::Error;
use widget_spec::SpecError;

pub type SandboxResult<T> = Result<T, SandboxError>;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Component '{name}' not found: the bundle registered nothing under that name or id '{id}'")]
    ComponentNotFound { name: String, id: String },

    #[error("Bundle evaluation failed: {0}")]
    BundleEvaluation(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    #[error("Specification error: {0}")]
    Spec(#[from] SpecError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start sandbox thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Sandbox is closed")]
    SandboxClosed,
}

impl SandboxError {
    /// Class reported to the host and shown on the error panel.
    pub fn kind(&self) -> FailureKind {
        match self {
            SandboxError::ComponentNotFound { .. } => FailureKind::ComponentNotFound,
            SandboxError::BundleEvaluation(_) => FailureKind::BundleEvaluation,
            _ => FailureKind::Render,
        }
    }
}

/// Failure classes that are contained inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    ComponentNotFound,
    BundleEvaluation,
    Render,
}

impl FailureKind {
    pub fn title(&self) -> &'static str {
        match self {
            FailureKind::ComponentNotFound => "Component not found",
            FailureKind::BundleEvaluation => "Bundle failed to load",
            FailureKind::Render => "Widget failed to render",
        }
    }
}

/// Errors of the mock data API, delivered to the bundle's own `error` callback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MockDataError {
    #[error("Object with guid '{guid}' not found")]
    ObjectNotFound { guid: String },

    #[error("Datasource '{key}' holds malformed JSON: {reason}")]
    MalformedDatasource { key: String, reason: String },

    #[error("No datasource is registered for entity '{entity}'")]
    UnknownEntity { entity: String },
}
