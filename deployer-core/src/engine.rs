//! Adapter for the provisioning engine (OpenTofu).
//!
//! The engine is an external process. Long-running commands stream their
//! standard output line by line to a callback; `output -json` is parsed into a
//! JSON document for the status aggregator.

use crate::error::{DeployerError, Result};
use log::{debug, info};
use serde_json::Value;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// The operations the deployer needs from a provisioning engine.
pub trait ProvisioningEngine {
    /// Structured outputs of the deployment in `dir` (`output -json`).
    fn output_json(&self, dir: &Path) -> Result<Value>;

    /// Runs the engine with `args` in `dir`, handing every stdout line to
    /// `on_line` as soon as it is read.
    fn run(&self, dir: &Path, args: &[String], on_line: &mut dyn FnMut(&str)) -> Result<()>;
}

/// Runs an OpenTofu-compatible binary.
#[derive(Debug, Clone)]
pub struct TofuEngine {
    binary: PathBuf,
}

impl TofuEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn describe(&self, args: &[String]) -> String {
        let mut command = self.binary.display().to_string();
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }
        command
    }
}

impl ProvisioningEngine for TofuEngine {
    fn output_json(&self, dir: &Path) -> Result<Value> {
        debug!("Querying engine outputs in {}", dir.display());
        let output = Command::new(&self.binary)
            .args(["output", "-json"])
            .current_dir(dir)
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                DeployerError::EngineQueryFailed(format!(
                    "cannot run {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeployerError::EngineQueryFailed(format!(
                "'output -json' exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| DeployerError::EngineQueryFailed(format!("unparseable output: {e}")))
    }

    fn run(&self, dir: &Path, args: &[String], on_line: &mut dyn FnMut(&str)) -> Result<()> {
        let command = self.describe(args);
        info!("Running: {}", command);

        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let streamed = match child.stdout.take() {
            Some(stdout) => stream_lines(stdout, on_line),
            None => Ok(()),
        };

        // Reap the child even when reading its output failed.
        let status = child.wait()?;
        streamed?;
        if !status.success() {
            return Err(DeployerError::EngineCommandFailed {
                command,
                code: status.code(),
            });
        }
        Ok(())
    }
}

/// Hands every line of `reader` to `on_line`, replacing invalid UTF-8.
fn stream_lines<R: Read>(reader: R, on_line: &mut dyn FnMut(&str)) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        on_line(&String::from_utf8_lossy(&buf));
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn fake_engine(dir: &Path, body: &str) -> TofuEngine {
        let path = dir.join("tofu");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        TofuEngine::new(path)
    }

    #[test]
    fn parses_output_json() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(
            dir.path(),
            r#"echo '{"summary":{"value":"ok"},"instance_details":{"value":{}}}'"#,
        );
        let value = engine.output_json(dir.path()).unwrap();
        assert_eq!(value["summary"]["value"], "ok");
    }

    #[test]
    fn failing_or_garbled_output_is_query_failure() {
        let dir = tempfile::tempdir().unwrap();
        let failing = fake_engine(dir.path(), "echo boom >&2; exit 1");
        assert!(matches!(
            failing.output_json(dir.path()),
            Err(DeployerError::EngineQueryFailed(_))
        ));

        let other = tempfile::tempdir().unwrap();
        let garbled = fake_engine(other.path(), "echo 'No outputs found'");
        assert!(matches!(
            garbled.output_json(other.path()),
            Err(DeployerError::EngineQueryFailed(_))
        ));

        let missing = TofuEngine::new(dir.path().join("nope"));
        assert!(matches!(
            missing.output_json(dir.path()),
            Err(DeployerError::EngineQueryFailed(_))
        ));
    }

    #[test]
    fn run_streams_lines_and_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(dir.path(), "echo one; echo two; echo \"$1\"");
        let mut lines = Vec::new();
        engine
            .run(dir.path(), &["apply".to_string()], &mut |l| lines.push(l.to_string()))
            .unwrap();
        assert_eq!(lines, vec!["one", "two", "apply"]);

        let other = tempfile::tempdir().unwrap();
        let failing = fake_engine(other.path(), "echo partial; exit 2");
        let err = failing
            .run(other.path(), &[], &mut |_| {})
            .unwrap_err();
        assert!(matches!(
            err,
            DeployerError::EngineCommandFailed { code: Some(2), .. }
        ));
    }

    #[test]
    fn invalid_utf8_output_does_not_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(dir.path(), r"printf 'ok\n\377\376 bad\nafter'");
        let mut lines = Vec::new();
        engine
            .run(dir.path(), &[], &mut |l| lines.push(l.to_string()))
            .unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "ok");
        assert!(lines[1].starts_with('\u{FFFD}'));
        assert!(lines[1].ends_with(" bad"));
        assert_eq!(lines[2], "after");
    }
}
