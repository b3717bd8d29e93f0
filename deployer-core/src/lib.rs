//! # Deployer Core Library
//!
//! Environment and deployment state handling for the `exasol` cluster deployer.
//!
//! ## Modules
//! - `versions`: Version identifier validation and the version registry.
//! - `deps`: Resolution and portable installation of required tools.
//! - `state`: Atomic persistence of a deployment's lifecycle state.
//! - `status`: Merges persisted state with live provisioning-engine outputs.
//! - `progress`: Percentage estimation from streamed command output.
//! - `engine`: Subprocess adapter for the provisioning engine.
//! - `settings`: Layered deployer configuration.

pub mod deps;
pub mod engine;
pub mod error;
pub mod progress;
pub mod settings;
pub mod state;
pub mod status;
pub mod versions;

pub use deps::{DependencyReport, DependencyResolver, ToolRequirement, ToolResolution};
pub use engine::{ProvisioningEngine, TofuEngine};
pub use error::{DeployerError, Result};
pub use progress::{estimate_total, Operation, ProgressContext};
pub use settings::DeployerSettings;
pub use state::{DeploymentState, DeploymentStatus, DeploymentStore};
pub use status::{compute_status, StatusView};
pub use versions::{validate_format, VersionIdentifier, VersionRegistry};
