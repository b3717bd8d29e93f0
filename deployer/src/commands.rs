//! Command implementations.
//!
//! Every command resolves the required tools first and stops before touching
//! the deployment if any are missing. Mutating commands validate the lifecycle
//! transition, run the provisioning engine with progress output, and only then
//! record the new status.

use crate::args::Commands;
use crate::error::{CliError, Result};
use deployer_core::engine::ProvisioningEngine;
use deployer_core::progress::StepProgress;
use deployer_core::versions::VersionRegistry;
use deployer_core::{
    compute_status, estimate_total, validate_format, DependencyReport, DependencyResolver,
    DeployerSettings, DeploymentStatus, DeploymentStore, Operation, ProgressContext, TofuEngine,
    VersionIdentifier,
};
use log::{debug, info};
use serde_json::{json, Map, Value};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Variables handed to the infrastructure templates.
const TFVARS_FILE: &str = "variables.auto.tfvars.json";

/// Executes one parsed command.
pub fn dispatch(command: Commands, settings: &DeployerSettings) -> Result<()> {
    match command {
        Commands::Dependencies { install } => dependencies(settings, install),
        Commands::Versions { show } => {
            require_dependencies(settings)?;
            versions(settings, show.as_deref())
        }
        Commands::Init {
            target,
            cloud_provider,
            db_version,
            cluster_size,
            instance_type,
            region,
        } => {
            let report = require_dependencies(settings)?;
            let request = InitRequest {
                cloud_provider,
                db_version,
                cluster_size,
                instance_type,
                region,
            };
            init(settings, &engine_for(settings, &report), &target.deployment_dir, request)
        }
        Commands::Deploy { target } => {
            let report = require_dependencies(settings)?;
            deploy(&engine_for(settings, &report), &target.deployment_dir)
        }
        Commands::Start { target } => {
            let report = require_dependencies(settings)?;
            power(&engine_for(settings, &report), &target.deployment_dir, Power::On)
        }
        Commands::Stop { target } => {
            let report = require_dependencies(settings)?;
            power(&engine_for(settings, &report), &target.deployment_dir, Power::Off)
        }
        Commands::Destroy {
            target,
            auto_approve,
        } => {
            let report = require_dependencies(settings)?;
            let dir = &target.deployment_dir;
            DeploymentStore::check_transition(dir, DeploymentStatus::Destroyed)?;
            if !auto_approve && !confirm_destroy(dir)? {
                return Err(CliError::Aborted("destroy"));
            }
            destroy(&engine_for(settings, &report), dir)
        }
        Commands::Status {
            target,
            show_details,
        } => {
            let report = require_dependencies(settings)?;
            status(&engine_for(settings, &report), &target.deployment_dir, show_details)
        }
    }
}

fn resolver(settings: &DeployerSettings) -> DependencyResolver {
    DependencyResolver::new(settings.portable_root())
}

fn ensure(settings: &DeployerSettings, install: bool) -> DependencyReport {
    let report = resolver(settings).ensure(&settings.tools, install);
    for tool in report.tools() {
        debug!("{}: {:?}", tool.name, tool.resolution);
    }
    report
}

fn require_dependencies(settings: &DeployerSettings) -> Result<DependencyReport> {
    Ok(ensure(settings, settings.auto_install_dependencies).into_result()?)
}

/// Dependencies-only mode.
fn dependencies(settings: &DeployerSettings, install: bool) -> Result<()> {
    let report = ensure(settings, install || settings.auto_install_dependencies);
    for tool in report.tools() {
        match tool.resolution.path() {
            Some(path) => info!("{} -> {}", tool.name, path.display()),
            None => info!("{} -> missing", tool.name),
        }
    }
    println!("{}", report.message());
    report.into_result()?;
    Ok(())
}

fn engine_for(settings: &DeployerSettings, report: &DependencyReport) -> TofuEngine {
    let binary = report
        .path_of(&settings.engine_tool)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("tofu"));
    TofuEngine::new(binary)
}

fn load_registry(settings: &DeployerSettings) -> Result<VersionRegistry> {
    let registry = match &settings.versions_file {
        Some(path) => VersionRegistry::load(path)?,
        None => VersionRegistry::builtin()?,
    };
    Ok(registry)
}

fn versions(settings: &DeployerSettings, show: Option<&str>) -> Result<()> {
    let registry = load_registry(settings)?;

    if let Some(id) = show {
        validate_format(id)?;
        for (key, value) in registry.get_version_config(id)?.iter() {
            println!("{key}={value}");
        }
        return Ok(());
    }

    for id in registry.list_all() {
        if id == registry.default_identifier() {
            println!("{id} (default)");
        } else {
            println!("{id}");
        }
    }
    Ok(())
}

/// Parameters of `exasol init`.
#[derive(Debug, Clone)]
pub struct InitRequest {
    pub cloud_provider: String,
    pub db_version: Option<String>,
    pub cluster_size: u32,
    pub instance_type: Option<String>,
    pub region: Option<String>,
}

fn init(
    settings: &DeployerSettings,
    engine: &dyn ProvisioningEngine,
    dir: &Path,
    request: InitRequest,
) -> Result<()> {
    let registry = load_registry(settings)?;
    let db_version = request
        .db_version
        .unwrap_or_else(|| registry.default_identifier().to_string());

    let identifier: VersionIdentifier = db_version.parse()?;
    let version_config = registry.get_version_config(&db_version)?;
    let architecture = version_config
        .get("ARCHITECTURE")
        .unwrap_or(identifier.architecture().as_str())
        .to_string();
    let instance_type = match request.instance_type {
        Some(instance_type) => Some(instance_type),
        None => version_config.get("DEFAULT_INSTANCE_TYPE").map(str::to_string),
    };

    DeploymentStore::check_transition(dir, DeploymentStatus::Initialized)?;
    fs::create_dir_all(dir)?;

    let mut extra = Map::new();
    extra.insert("cloud_provider".into(), json!(request.cloud_provider));
    extra.insert("cluster_size".into(), json!(request.cluster_size.max(1)));
    if let Some(instance_type) = &instance_type {
        extra.insert("instance_type".into(), json!(instance_type));
    }
    if let Some(region) = &request.region {
        extra.insert("region".into(), json!(region));
    }

    let mut tfvars = extra.clone();
    tfvars.insert("db_version".into(), json!(db_version));
    tfvars.insert("architecture".into(), json!(architecture));
    for (key, value) in version_config.iter() {
        tfvars
            .entry(key.to_lowercase())
            .or_insert_with(|| json!(value));
    }
    fs::write(
        dir.join(TFVARS_FILE),
        serde_json::to_string_pretty(&Value::Object(tfvars))?,
    )?;

    let total = estimate_total(Operation::Init, request.cluster_size);
    let mut progress = ProgressContext::new(total);
    run_step(engine, dir, &["init", "-input=false"], &mut progress, total)?;

    DeploymentStore::create(dir, &db_version, &architecture, extra)?;
    println!(
        "Initialized {} deployment of {} in {}",
        request.cloud_provider,
        db_version,
        dir.display()
    );
    Ok(())
}

fn deploy(engine: &dyn ProvisioningEngine, dir: &Path) -> Result<()> {
    DeploymentStore::check_transition(dir, DeploymentStatus::Deployed)?;
    let nodes = DeploymentStore::load(dir)?.node_count();

    let total = estimate_total(Operation::Deploy, nodes);
    let mut progress = ProgressContext::new(total);
    run_step(engine, dir, &["apply", "-auto-approve", "-input=false"], &mut progress, total)?;

    DeploymentStore::transition(dir, DeploymentStatus::Deployed)?;
    println!("Deployment complete");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Power {
    On,
    Off,
}

fn power(engine: &dyn ProvisioningEngine, dir: &Path, power: Power) -> Result<()> {
    let (target, operation, state_var) = match power {
        Power::On => (DeploymentStatus::Deployed, Operation::Start, "power_state=running"),
        Power::Off => (DeploymentStatus::Stopped, Operation::Stop, "power_state=stopped"),
    };

    let from = DeploymentStore::check_transition(dir, target)?;
    if power == Power::On && from != DeploymentStatus::Stopped {
        // `deployed -> deployed` is a re-apply, which is `deploy`'s job.
        return Err(deployer_core::DeployerError::InvalidTransition { from, to: target }.into());
    }
    let nodes = DeploymentStore::load(dir)?.node_count();

    let total = estimate_total(operation, nodes);
    let mut progress = ProgressContext::new(total);
    run_step(
        engine,
        dir,
        &["apply", "-auto-approve", "-input=false", "-var", state_var],
        &mut progress,
        total,
    )?;

    DeploymentStore::transition(dir, target)?;
    println!("Cluster {}", if power == Power::On { "started" } else { "stopped" });
    Ok(())
}

fn destroy(engine: &dyn ProvisioningEngine, dir: &Path) -> Result<()> {
    DeploymentStore::check_transition(dir, DeploymentStatus::Destroyed)?;
    let nodes = DeploymentStore::load(dir)?.node_count();

    let total = estimate_total(Operation::Destroy, nodes);
    let mut progress = ProgressContext::new(total);
    run_step(engine, dir, &["destroy", "-auto-approve", "-input=false"], &mut progress, total)?;

    DeploymentStore::transition(dir, DeploymentStatus::Destroyed)?;
    println!("Deployment destroyed");
    Ok(())
}

fn status(engine: &dyn ProvisioningEngine, dir: &Path, show_details: bool) -> Result<()> {
    let view = compute_status(dir, show_details, engine)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Runs one engine invocation as a step of `progress`, echoing its output with
/// a percentage prefix.
fn run_step(
    engine: &dyn ProvisioningEngine,
    dir: &Path,
    args: &[&str],
    progress: &mut ProgressContext,
    estimated_lines: u64,
) -> Result<u64> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut step: StepProgress<'_> = progress.begin_step(estimated_lines);

    let mut write_error = None;
    engine.run(dir, &args, &mut |line| {
        if write_error.is_none() {
            if let Err(e) = writeln!(out, "{}", step.prefix(line)).and_then(|_| out.flush()) {
                write_error = Some(e);
            }
        }
    })?;

    if let Some(e) = write_error {
        return Err(e.into());
    }
    Ok(step.finish())
}

fn confirm_destroy(dir: &Path) -> Result<bool> {
    print!(
        "This will destroy all resources of the deployment in {}. Type 'yes' to continue: ",
        dir.display()
    );
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == "yes")
}
