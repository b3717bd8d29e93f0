//! Persisted lifecycle state of one deployment.
//!
//! Each deployment directory holds a single `.exasol.json` document. Writes go
//! to a temporary file in the same directory which is then renamed over the
//! target, so readers only ever see the previous or the complete new document.

use crate::error::{DeployerError, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// File name of the state document inside a deployment directory.
pub const STATE_FILE: &str = ".exasol.json";

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// No state document exists yet. Never persisted.
    #[serde(skip)]
    Uninitialized,
    Initialized,
    Deployed,
    Stopped,
    Destroyed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Uninitialized => "uninitialized",
            DeploymentStatus::Initialized => "initialized",
            DeploymentStatus::Deployed => "deployed",
            DeploymentStatus::Stopped => "stopped",
            DeploymentStatus::Destroyed => "destroyed",
        }
    }

    /// Whether a command may move a deployment from `self` to `to`.
    ///
    /// `initialized` can only be (re)entered from nothing or from a destroyed
    /// deployment; `destroyed` is terminal otherwise.
    pub fn can_transition_to(&self, to: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (self, to),
            (Uninitialized, Initialized)
                | (Destroyed, Initialized)
                | (Initialized, Deployed)
                | (Deployed, Deployed)
                | (Deployed, Stopped)
                | (Stopped, Deployed)
                | (Initialized, Destroyed)
                | (Deployed, Destroyed)
                | (Stopped, Destroyed)
        )
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub status: DeploymentStatus,
    pub db_version: String,
    pub architecture: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Provider-specific fields, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeploymentState {
    /// Number of cluster nodes recorded at init time (defaults to 1).
    pub fn node_count(&self) -> u32 {
        self.extra
            .get("cluster_size")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }
}

/// Reads and writes deployment state documents.
pub struct DeploymentStore;

impl DeploymentStore {
    pub fn state_path(deployment_dir: &Path) -> PathBuf {
        deployment_dir.join(STATE_FILE)
    }

    /// Loads the state of `deployment_dir`.
    pub fn load(deployment_dir: &Path) -> Result<DeploymentState> {
        let path = Self::state_path(deployment_dir);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DeployerError::StateNotFound(deployment_dir.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|source| DeployerError::StateCorrupt {
            dir: deployment_dir.to_path_buf(),
            source,
        })
    }

    /// Writes `state` atomically.
    pub fn save(deployment_dir: &Path, state: &DeploymentState) -> Result<()> {
        fs::create_dir_all(deployment_dir)?;
        let path = Self::state_path(deployment_dir);
        let json = serde_json::to_string_pretty(state)?;

        // Unique per writer, and in the target directory so the rename never
        // crosses filesystems.
        let mut temp_file = tempfile::Builder::new()
            .prefix(".exasol.json.")
            .suffix(".tmp")
            .tempfile_in(deployment_dir)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(&path).map_err(|e| e.error)?;

        debug!("Saved state '{}' to {}", state.status, path.display());
        Ok(())
    }

    /// Status of `deployment_dir`; `Uninitialized` when no state exists.
    pub fn current_status(deployment_dir: &Path) -> Result<DeploymentStatus> {
        match Self::load(deployment_dir) {
            Ok(state) => Ok(state.status),
            Err(DeployerError::StateNotFound(_)) => Ok(DeploymentStatus::Uninitialized),
            Err(e) => Err(e),
        }
    }

    /// Records a freshly initialized deployment.
    pub fn create(
        deployment_dir: &Path,
        db_version: &str,
        architecture: &str,
        extra: Map<String, Value>,
    ) -> Result<DeploymentState> {
        Self::check_transition(deployment_dir, DeploymentStatus::Initialized)?;

        let now = Utc::now();
        let state = DeploymentState {
            status: DeploymentStatus::Initialized,
            db_version: db_version.to_string(),
            architecture: architecture.to_string(),
            created_at: now,
            updated_at: now,
            extra,
        };
        Self::save(deployment_dir, &state)?;
        info!("Initialized deployment in {}", deployment_dir.display());
        Ok(state)
    }

    /// Fails unless the deployment may move to `to` from its current status.
    pub fn check_transition(deployment_dir: &Path, to: DeploymentStatus) -> Result<DeploymentStatus> {
        let from = Self::current_status(deployment_dir)?;
        if from.can_transition_to(to) {
            Ok(from)
        } else {
            Err(DeployerError::InvalidTransition { from, to })
        }
    }

    /// Loads, modifies and saves the state, bumping `updated_at`.
    ///
    /// `created_at` is restored after `f` runs so it can never change.
    pub fn update<F>(deployment_dir: &Path, f: F) -> Result<DeploymentState>
    where
        F: FnOnce(&mut DeploymentState),
    {
        let mut state = Self::load(deployment_dir)?;
        let created_at = state.created_at;
        f(&mut state);
        state.created_at = created_at;
        state.updated_at = Utc::now().max(state.updated_at);
        Self::save(deployment_dir, &state)?;
        Ok(state)
    }

    /// Moves an existing deployment to `to`.
    pub fn transition(deployment_dir: &Path, to: DeploymentStatus) -> Result<DeploymentState> {
        if to == DeploymentStatus::Initialized {
            return Err(DeployerError::InvalidTransition {
                from: Self::current_status(deployment_dir)?,
                to,
            });
        }
        let from = Self::check_transition(deployment_dir, to)?;
        let state = Self::update(deployment_dir, |state| state.status = to)?;
        info!("Deployment status: {} -> {}", from, to);
        Ok(state)
    }
}
