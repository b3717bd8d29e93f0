#![cfg(unix)]

use predicates::prelude::*;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::{tempdir, TempDir};

const FAKE_TOFU: &str = r#"#!/bin/sh
case "$1" in
  output)
    echo '{"instance_details":{"sensitive":false,"value":{"n11":{"public_ip":"98.84.105.66"}}},"summary":{"sensitive":false,"value":"1 node"}}'
    ;;
  *)
    echo "tofu $*"
    echo "done"
    ;;
esac
"#;

/// Isolated environment: private PATH, settings dir and share dir.
struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let root = tempdir().expect("tmpdir");
        for dir in ["bin", "config", "share", "deployment"] {
            fs::create_dir_all(root.path().join(dir)).expect("mkdir");
        }
        Self { root }
    }

    fn with_tools() -> Self {
        let sandbox = Self::new();
        sandbox.tool("jq", "#!/bin/sh\necho jq-1.7.1\n");
        sandbox.tool("tofu", FAKE_TOFU);
        sandbox
    }

    fn tool(&self, name: &str, script: &str) {
        let path = self.bin_dir().join(name);
        fs::write(&path, script).expect("write tool");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    fn bin_dir(&self) -> PathBuf {
        self.root.path().join("bin")
    }

    fn deployment(&self) -> PathBuf {
        self.root.path().join("deployment")
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("exasol").expect("binary");
        cmd.env("PATH", self.bin_dir())
            .env("XDG_CONFIG_HOME", self.root.path().join("config"))
            .env("EXASOL_DEPLOYER_SHARE_DIR", self.root.path().join("share"))
            .env_remove("RUST_LOG");
        cmd
    }

    fn in_deployment(&self, args: &[&str]) -> assert_cmd::Command {
        let mut cmd = self.cmd();
        cmd.args(args).arg("--deployment-dir").arg(self.deployment());
        cmd
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("json")
}

#[test]
fn missing_tools_stop_every_command() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .arg("dependencies")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Missing tools: jq, OpenTofu"));

    sandbox
        .in_deployment(&["init", "--cloud-provider", "aws"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing tools"));
    assert!(!sandbox.deployment().join(".exasol.json").exists());
}

#[test]
fn system_tools_satisfy_dependencies() {
    let sandbox = Sandbox::with_tools();

    sandbox
        .cmd()
        .arg("dependencies")
        .assert()
        .success()
        .stdout(predicate::str::contains("Required dependencies are available"));
}

#[test]
fn versions_lists_registry_in_order() {
    let sandbox = Sandbox::with_tools();

    sandbox
        .cmd()
        .arg("versions")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("exasol-2025.1.4 (default)\n"))
        .stdout(predicate::str::contains("exasol-2025.1.4-arm64-local"));

    sandbox
        .cmd()
        .args(["versions", "--show", "exasol-2025.1.4-arm64"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ARCHITECTURE=arm64"));

    sandbox
        .cmd()
        .args(["versions", "--show", "exasol-2025.1.4-x86_64"])
        .assert()
        .failure();
}

#[test]
fn init_then_status() {
    let sandbox = Sandbox::with_tools();

    sandbox
        .in_deployment(&["init", "--cloud-provider", "aws", "--cluster-size", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("% | tofu init"));

    let state = read_json(&sandbox.deployment().join(".exasol.json"));
    assert_eq!(state["status"], "initialized");
    assert_eq!(state["db_version"], "exasol-2025.1.4");
    assert_eq!(state["cluster_size"], 2);

    let tfvars = read_json(&sandbox.deployment().join("variables.auto.tfvars.json"));
    assert_eq!(tfvars["cloud_provider"], "aws");
    assert_eq!(tfvars["instance_type"], "r6i.xlarge");

    let output = sandbox
        .in_deployment(&["status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let status: serde_json::Value = serde_json::from_slice(&output).expect("status json");
    assert_eq!(status["status"], "initialized");
    assert!(status.get("details").is_none());
}

#[test]
fn status_details_come_from_engine_outputs() {
    let sandbox = Sandbox::with_tools();
    sandbox
        .in_deployment(&["init", "--cloud-provider", "aws"])
        .assert()
        .success();
    sandbox.in_deployment(&["deploy"]).assert().success();

    let output = sandbox
        .in_deployment(&["status", "--show-details"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let status: serde_json::Value = serde_json::from_slice(&output).expect("status json");
    assert_eq!(status["status"], "deployed");
    assert_eq!(status["details"]["instance_count"], 1);
    assert_eq!(
        status["details"]["instance_details"]["n11"]["public_ip"],
        "98.84.105.66"
    );
    assert!(status["details"].get("summary").is_none());
}

#[test]
fn lifecycle_rejects_out_of_order_commands() {
    let sandbox = Sandbox::with_tools();

    sandbox
        .in_deployment(&["status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("run 'exasol init' first"));

    sandbox
        .in_deployment(&["init", "--cloud-provider", "aws"])
        .assert()
        .success();
    sandbox
        .in_deployment(&["stop"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("initialized"));

    sandbox.in_deployment(&["deploy"]).assert().success();
    sandbox.in_deployment(&["stop"]).assert().success();
    sandbox.in_deployment(&["start"]).assert().success();

    sandbox
        .in_deployment(&["destroy"])
        .write_stdin("no\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("destroy aborted"));
    sandbox
        .in_deployment(&["destroy", "--auto-approve"])
        .assert()
        .success();

    let state = read_json(&sandbox.deployment().join(".exasol.json"));
    assert_eq!(state["status"], "destroyed");
}

#[test]
fn missing_tools_are_reported_with_logging_off() {
    let sandbox = Sandbox::new();

    sandbox
        .in_deployment(&["status"])
        .env("RUST_LOG", "off")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing tools: jq, OpenTofu"));
}

#[test]
fn destroy_checks_lifecycle_before_prompting() {
    let sandbox = Sandbox::with_tools();

    sandbox
        .in_deployment(&["destroy"])
        .write_stdin("yes\n")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Type 'yes'").not())
        .stderr(predicate::str::contains("'uninitialized' to 'destroyed'"));
}

/// Serves `body` to a single HTTP request and returns the URL.
fn serve_once(body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut chunk).expect("read request");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
        }
        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(header.as_bytes()).expect("write header");
        stream.write_all(body).expect("write body");
    });
    format!("http://{addr}/jq")
}

#[test]
fn dependencies_install_fetches_missing_tools() {
    let sandbox = Sandbox::new();
    sandbox.tool("tofu", FAKE_TOFU);
    let url = serve_once(b"#!/bin/sh\necho jq-1.7.1\n");

    let settings = sandbox.root.path().join("settings.toml");
    fs::write(
        &settings,
        format!(
            r#"
[[tools]]
name = "jq"
binary = "jq"
subdir = "jq"

[tools.source]
url = "{url}"
archive = "raw"

[[tools]]
name = "OpenTofu"
binary = "tofu"
subdir = "tofu"
"#
        ),
    )
    .expect("write settings");

    sandbox
        .cmd()
        .arg("--config")
        .arg(&settings)
        .args(["dependencies", "--install"])
        .env("NO_PROXY", "127.0.0.1")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy")
        .assert()
        .success()
        .stdout(predicate::str::contains("Required dependencies are available"));

    let installed = sandbox.root.path().join("share/tools/jq/jq");
    assert!(installed.is_file());
    let mode = fs::metadata(&installed).expect("metadata").permissions().mode();
    assert_ne!(mode & 0o111, 0, "portable jq is executable");

    // The portable copy now satisfies a plain check.
    sandbox
        .cmd()
        .arg("--config")
        .arg(&settings)
        .arg("dependencies")
        .assert()
        .success();
}

