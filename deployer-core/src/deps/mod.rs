//! Required-tool resolution.
//!
//! Every tool can be satisfied either by a system installation found on the
//! search path or by a portable copy under the deployer's own tree
//! (`<portable_root>/<subdir>/<binary>`). Resolution is recomputed on every call;
//! nothing is cached, so removing a copy is noticed on the next check.

pub mod installer;

pub use installer::{HttpInstaller, Installer};

use crate::error::{DeployerError, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

/// How a downloaded artifact is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// The download is the executable itself.
    Raw,
    /// A gzip-compressed tarball containing the executable.
    TarGz,
}

/// Where a portable copy of a tool is fetched from.
///
/// `{arch}` in the URL is replaced with the release architecture of the host
/// (`amd64` or `arm64`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSource {
    url: String,
    archive: ArchiveKind,
    /// Path of the executable inside an archive.
    #[serde(default)]
    member: Option<String>,
}

impl ToolSource {
    pub fn new(url: impl Into<String>, archive: ArchiveKind) -> Self {
        Self {
            url: url.into(),
            archive,
            member: None,
        }
    }

    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    pub fn url(&self) -> String {
        let arch = match env::consts::ARCH {
            "aarch64" => "arm64",
            _ => "amd64",
        };
        self.url.replace("{arch}", arch)
    }

    pub fn archive(&self) -> ArchiveKind {
        self.archive
    }

    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }
}

/// A tool the deployer needs, identified by its logical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequirement {
    /// Logical name used in reports, e.g. `OpenTofu`.
    name: String,
    /// Executable name looked up on the search path, e.g. `tofu`.
    binary: String,
    /// Subdirectory of the portable tree holding the executable.
    subdir: String,
    /// Arguments that make the tool print its version.
    #[serde(default = "default_version_args")]
    version_args: Vec<String>,
    #[serde(default)]
    source: Option<ToolSource>,
}

impl ToolRequirement {
    pub fn new(
        name: impl Into<String>,
        binary: impl Into<String>,
        subdir: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            binary: binary.into(),
            subdir: subdir.into(),
            version_args: default_version_args(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: ToolSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_version_args(mut self, args: Vec<String>) -> Self {
        self.version_args = args;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn version_args(&self) -> &[String] {
        &self.version_args
    }

    pub fn source(&self) -> Option<&ToolSource> {
        self.source.as_ref()
    }

    /// Fixed location of the portable copy.
    pub fn portable_path(&self, portable_root: &Path) -> PathBuf {
        portable_root.join(&self.subdir).join(&self.binary)
    }
}

/// Outcome of resolving one requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResolution {
    SystemFound(PathBuf),
    PortableFound(PathBuf),
    Missing,
}

impl ToolResolution {
    pub fn is_satisfied(&self) -> bool {
        !matches!(self, ToolResolution::Missing)
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ToolResolution::SystemFound(path) | ToolResolution::PortableFound(path) => Some(path),
            ToolResolution::Missing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub name: String,
    pub resolution: ToolResolution,
}

/// Resolution of every required tool, in requirement order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyReport {
    tools: Vec<ResolvedTool>,
}

impl DependencyReport {
    pub fn tools(&self) -> &[ResolvedTool] {
        &self.tools
    }

    pub fn all_satisfied(&self) -> bool {
        self.tools.iter().all(|t| t.resolution.is_satisfied())
    }

    /// Logical names of unsatisfied tools.
    pub fn missing(&self) -> Vec<String> {
        self.tools
            .iter()
            .filter(|t| !t.resolution.is_satisfied())
            .map(|t| t.name.clone())
            .collect()
    }

    /// Path the named tool resolved to, if any.
    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .and_then(|t| t.resolution.path())
    }

    /// Operator-facing summary.
    pub fn message(&self) -> String {
        if self.all_satisfied() {
            "Required dependencies are available".to_string()
        } else {
            format!("Missing tools: {}", self.missing().join(", "))
        }
    }

    /// Turns an unsatisfied report into [`DeployerError::DependencyMissing`].
    pub fn into_result(self) -> Result<Self> {
        if self.all_satisfied() {
            Ok(self)
        } else {
            Err(DeployerError::DependencyMissing(self.missing()))
        }
    }
}

/// Resolves tools against the search path and the portable tree.
pub struct DependencyResolver {
    portable_root: PathBuf,
    search_path: Option<OsString>,
    installer: Box<dyn Installer>,
}

impl DependencyResolver {
    /// Resolver searching the process `PATH` and installing over HTTP.
    pub fn new(portable_root: impl Into<PathBuf>) -> Self {
        Self {
            portable_root: portable_root.into(),
            search_path: None,
            installer: Box::new(HttpInstaller),
        }
    }

    /// Overrides the search path (defaults to the `PATH` environment variable).
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    pub fn with_installer(mut self, installer: Box<dyn Installer>) -> Self {
        self.installer = installer;
        self
    }

    pub fn portable_root(&self) -> &Path {
        &self.portable_root
    }

    /// Resolves every requirement without touching the filesystem.
    pub fn check(&self, requirements: &[ToolRequirement]) -> DependencyReport {
        DependencyReport {
            tools: requirements
                .iter()
                .map(|req| ResolvedTool {
                    name: req.name().to_string(),
                    resolution: self.resolve(req),
                })
                .collect(),
        }
    }

    /// Resolves every requirement, installing portable copies of missing tools
    /// when `install_if_missing` is set.
    ///
    /// A tool satisfied by the system is never installed portably. A failed
    /// installation leaves that tool `Missing` and does not stop the others.
    pub fn ensure(
        &self,
        requirements: &[ToolRequirement],
        install_if_missing: bool,
    ) -> DependencyReport {
        let mut report = self.check(requirements);
        if !install_if_missing {
            return report;
        }

        for (req, resolved) in requirements.iter().zip(report.tools.iter_mut()) {
            if resolved.resolution != ToolResolution::Missing {
                continue;
            }

            match self.install(req) {
                Ok(()) => {
                    resolved.resolution = self.resolve(req);
                    info!("Installed portable {}", req.name());
                }
                Err(e) => warn!("Could not install {}: {}", req.name(), e),
            }
        }

        report
    }

    fn resolve(&self, req: &ToolRequirement) -> ToolResolution {
        if let Some(path) = self.find_on_path(req.binary()) {
            debug!("{} found on system at {}", req.name(), path.display());
            return ToolResolution::SystemFound(path);
        }

        let portable = req.portable_path(&self.portable_root);
        if is_executable(&portable) {
            debug!("{} found in portable tree at {}", req.name(), portable.display());
            return ToolResolution::PortableFound(portable);
        }

        debug!("{} not found", req.name());
        ToolResolution::Missing
    }

    fn find_on_path(&self, binary: &str) -> Option<PathBuf> {
        let search_path = self.search_path.clone().or_else(|| env::var_os("PATH"))?;
        let cwd = env::current_dir().ok()?;
        which::which_in(binary, Some(search_path), cwd).ok()
    }

    fn install(&self, req: &ToolRequirement) -> Result<()> {
        let dest = req.portable_path(&self.portable_root);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        info!("Installing portable {} into {}", req.name(), dest.display());
        self.installer.install(req, &dest)?;
        make_executable(&dest)?;

        if let Err(e) = verify_runs(req, &dest) {
            // Leave nothing behind that a later check would mistake for a working copy.
            let _ = fs::remove_file(&dest);
            return Err(e);
        }
        Ok(())
    }
}

fn verify_runs(req: &ToolRequirement, path: &Path) -> Result<()> {
    let status = Command::new(path)
        .args(req.version_args())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| DeployerError::InstallFailed {
            tool: req.name().to_string(),
            reason: format!("installed binary does not execute: {e}"),
        })?;

    if !status.success() {
        return Err(DeployerError::InstallFailed {
            tool: req.name().to_string(),
            reason: format!("version check exited with {status}"),
        });
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
