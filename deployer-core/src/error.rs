use std::path::PathBuf;
use thiserror::Error;

use crate::state::DeploymentStatus;

/// Global error type for the deployer.
#[derive(Error, Debug)]
pub enum DeployerError {
    /// The version identifier does not have the `<name>-<x.y.z>[-arm64][-local]` shape.
    #[error("Invalid version format '{0}': expected <name>-<major>.<minor>.<patch>[-arm64][-local]")]
    InvalidVersionFormat(String),

    /// A well-formed identifier that the registry does not know.
    #[error("Version '{0}' not found in registry")]
    VersionNotFound(String),

    /// The version exists but has no such configuration key.
    #[error("Configuration key '{key}' not found for version '{version}'")]
    ConfigKeyNotFound { version: String, key: String },

    /// The registry file itself could not be understood.
    #[error("Version registry error: {0}")]
    Registry(String),

    /// One or more required tools are unavailable after resolution.
    #[error("Missing tools: {}", .0.join(", "))]
    DependencyMissing(Vec<String>),

    /// Installing a portable copy of a tool failed.
    #[error("Failed to install {tool}: {reason}")]
    InstallFailed { tool: String, reason: String },

    /// No state document exists in the deployment directory.
    #[error("No deployment state found in {0}")]
    StateNotFound(PathBuf),

    /// A state document exists but is not a valid deployment state.
    #[error("Deployment state in {dir} is corrupt: {source}")]
    StateCorrupt {
        dir: PathBuf,
        source: serde_json::Error,
    },

    /// The requested lifecycle change is not allowed from the current status.
    #[error("Cannot move deployment from '{from}' to '{to}'")]
    InvalidTransition {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    /// Querying the provisioning engine for its outputs failed.
    #[error("Provisioning engine query failed: {0}")]
    EngineQueryFailed(String),

    /// A provisioning engine command exited unsuccessfully.
    #[error("Provisioning engine command '{command}' failed with exit code {code:?}")]
    EngineCommandFailed { command: String, code: Option<i32> },

    /// Settings could not be loaded.
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// Underlying IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure outside of state loading.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse the TOML registry.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml_edit::TomlError),

    /// Download failure while fetching a portable tool.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized Result type for deployer operations.
pub type Result<T> = std::result::Result<T, DeployerError>;
