//! Deployer settings.
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `EXASOL_DEPLOYER_*` environment variables.

use crate::deps::{ArchiveKind, ToolRequirement, ToolSource};
use crate::error::Result;
use config::{Config, Environment, File};
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "EXASOL_DEPLOYER";

fn default_share_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join("exasol-deployer")
}

fn default_engine_tool() -> String {
    "OpenTofu".to_string()
}

fn default_tools() -> Vec<ToolRequirement> {
    vec![
        ToolRequirement::new("jq", "jq", "jq").with_source(ToolSource::new(
            "https://github.com/jqlang/jq/releases/download/jq-1.7.1/jq-linux-{arch}",
            ArchiveKind::Raw,
        )),
        ToolRequirement::new("OpenTofu", "tofu", "tofu").with_source(
            ToolSource::new(
                "https://github.com/opentofu/opentofu/releases/download/v1.8.8/tofu_1.8.8_linux_{arch}.tar.gz",
                ArchiveKind::TarGz,
            )
            .with_member("tofu"),
        ),
    ]
}

/// Runtime settings of the deployer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerSettings {
    /// Root of the deployer-owned tree holding portable tools.
    #[serde(default = "default_share_dir")]
    pub share_dir: PathBuf,

    /// Version registry to use instead of the built-in one.
    #[serde(default)]
    pub versions_file: Option<PathBuf>,

    /// Logical name of the tool acting as provisioning engine.
    #[serde(default = "default_engine_tool")]
    pub engine_tool: String,

    /// Install missing tools into the portable tree before every command.
    #[serde(default)]
    pub auto_install_dependencies: bool,

    /// Tools every command requires.
    #[serde(default = "default_tools")]
    pub tools: Vec<ToolRequirement>,
}

impl Default for DeployerSettings {
    fn default() -> Self {
        Self {
            share_dir: default_share_dir(),
            versions_file: None,
            engine_tool: default_engine_tool(),
            auto_install_dependencies: false,
            tools: default_tools(),
        }
    }
}

impl DeployerSettings {
    /// Default location of the settings file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("exasol-deployer").join("settings.toml"))
    }

    /// Loads settings from `path` (or the default location) and the environment.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        let file = path.map(Path::to_path_buf).or_else(Self::default_path);
        if let Some(file) = file {
            debug!("Reading settings from {}", file.display());
            builder = builder.add_source(File::from(file.as_path()).required(path.is_some()));
        }

        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Directory holding one subdirectory per portable tool.
    pub fn portable_root(&self) -> PathBuf {
        self.share_dir.join("tools")
    }
}
