use deployer_core::DeployerError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the `exasol` command line.
#[derive(Error, Debug)]
pub enum CliError {
    /// No state document in the target directory.
    #[error("No deployment found in {0}; run 'exasol init' first")]
    NoDeployment(PathBuf),

    /// Failure inside the deployer subsystem.
    #[error(transparent)]
    Deployer(DeployerError),

    /// The operator declined a confirmation prompt.
    #[error("{0} aborted")]
    Aborted(&'static str),

    /// Terminal or output failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to render JSON output.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DeployerError> for CliError {
    fn from(err: DeployerError) -> Self {
        match err {
            DeployerError::StateNotFound(dir) => CliError::NoDeployment(dir),
            other => CliError::Deployer(other),
        }
    }
}

/// A specialized Result type for CLI commands.
pub type Result<T> = std::result::Result<T, CliError>;
