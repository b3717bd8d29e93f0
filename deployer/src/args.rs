use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Provision and manage analytic database clusters.
#[derive(Parser, Debug)]
#[command(name = "exasol")]
#[command(about = "Provision and manage Exasol database clusters", long_about = None)]
pub struct Cli {
    /// Settings file (default: $XDG_CONFIG_HOME/exasol-deployer/settings.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Location of the deployment being managed.
#[derive(Args, Debug, Clone)]
pub struct DeploymentArgs {
    /// Directory holding the deployment state and engine files.
    #[arg(long, default_value = ".")]
    pub deployment_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check required tools, optionally installing portable copies.
    Dependencies {
        /// Install missing tools into the portable tree.
        #[arg(long)]
        install: bool,
    },
    /// List known database versions.
    Versions {
        /// Print the configuration of one version.
        #[arg(long, value_name = "VERSION")]
        show: Option<String>,
    },
    /// Initialize a new deployment directory.
    Init {
        #[command(flatten)]
        target: DeploymentArgs,

        /// Cloud provider to deploy to.
        #[arg(long)]
        cloud_provider: String,

        /// Database version (default: the registry default).
        #[arg(long)]
        db_version: Option<String>,

        /// Number of nodes.
        #[arg(long, default_value_t = 1)]
        cluster_size: u32,

        /// Instance type (default: taken from the version configuration).
        #[arg(long)]
        instance_type: Option<String>,

        /// Cloud region.
        #[arg(long)]
        region: Option<String>,
    },
    /// Create the cluster resources.
    Deploy {
        #[command(flatten)]
        target: DeploymentArgs,
    },
    /// Power on a stopped cluster.
    Start {
        #[command(flatten)]
        target: DeploymentArgs,
    },
    /// Power off a running cluster.
    Stop {
        #[command(flatten)]
        target: DeploymentArgs,
    },
    /// Tear down all cluster resources.
    Destroy {
        #[command(flatten)]
        target: DeploymentArgs,

        /// Skip the confirmation prompt.
        #[arg(long)]
        auto_approve: bool,
    },
    /// Show deployment status as JSON.
    Status {
        #[command(flatten)]
        target: DeploymentArgs,

        /// Include live details from the provisioning engine.
        #[arg(long)]
        show_details: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_status_with_details() {
        let cli = Cli::parse_from(["exasol", "status", "--deployment-dir", "/tmp/d", "--show-details"]);
        match cli.command {
            Commands::Status {
                target,
                show_details,
            } => {
                assert_eq!(target.deployment_dir, PathBuf::from("/tmp/d"));
                assert!(show_details);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn init_defaults() {
        let cli = Cli::parse_from(["exasol", "init", "--cloud-provider", "aws"]);
        match cli.command {
            Commands::Init {
                target,
                cluster_size,
                db_version,
                ..
            } => {
                assert_eq!(target.deployment_dir, PathBuf::from("."));
                assert_eq!(cluster_size, 1);
                assert!(db_version.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
