//! Structured database version identifiers.
//!
//! An identifier names a deployable release, its CPU architecture and whether it
//! is a locally built package: `exasol-2025.1.4`, `exasol-2025.1.4-arm64`,
//! `exasol-2025.1.4-local`, `exasol-2025.1.4-arm64-local`.
//!
//! The default architecture is implicit. An explicit `-x86_64` suffix is rejected
//! so that every release has exactly one spelling.

use crate::error::{DeployerError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref VERSION_PATTERN: Regex =
        Regex::new(r"^([A-Za-z][A-Za-z0-9_]*)-(\d+\.\d+\.\d+)(-arm64)?(-local)?$")
            .expect("version pattern is a valid regex");
}

/// CPU architecture a release is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "arm64")]
    Arm64,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated version identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionIdentifier {
    name: String,
    version: String,
    arm64: bool,
    local: bool,
}

impl VersionIdentifier {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dotted release number, e.g. `2025.1.4`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn architecture(&self) -> Architecture {
        if self.arm64 {
            Architecture::Arm64
        } else {
            Architecture::X86_64
        }
    }

    pub fn is_local(&self) -> bool {
        self.local
    }
}

impl FromStr for VersionIdentifier {
    type Err = DeployerError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = VERSION_PATTERN
            .captures(s)
            .ok_or_else(|| DeployerError::InvalidVersionFormat(s.to_string()))?;

        Ok(Self {
            name: caps[1].to_string(),
            version: caps[2].to_string(),
            arm64: caps.get(3).is_some(),
            local: caps.get(4).is_some(),
        })
    }
}

impl fmt::Display for VersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)?;
        if self.arm64 {
            f.write_str("-arm64")?;
        }
        if self.local {
            f.write_str("-local")?;
        }
        Ok(())
    }
}

/// Checks that `identifier` is a well-formed version identifier.
pub fn validate_format(identifier: &str) -> Result<()> {
    identifier.parse::<VersionIdentifier>().map(|_| ())
}

/// Field selectors understood by [`parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionField {
    /// First dash-delimited segment.
    DbVersion,
    /// Everything after the first dash.
    Architecture,
    /// `"true"` when the identifier carries the `-arm64` suffix.
    Arm64,
    /// `"true"` when the identifier carries the `-local` suffix.
    Local,
}

impl FromStr for VersionField {
    type Err = DeployerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "db_version" => Ok(VersionField::DbVersion),
            "architecture" => Ok(VersionField::Architecture),
            "arm64" => Ok(VersionField::Arm64),
            "local" => Ok(VersionField::Local),
            other => Err(DeployerError::Registry(format!(
                "unknown version field '{other}'"
            ))),
        }
    }
}

/// Extracts one field from an identifier by splitting on the first dash.
///
/// The labels follow the historical field names used by the deployment scripts:
/// the leading name comes back as `DbVersion` and the remainder (release number
/// plus any suffixes) as `Architecture`. Callers wanting the semantic values
/// should use [`VersionIdentifier`] instead.
pub fn parse(identifier: &str, field: VersionField) -> String {
    let (head, rest) = identifier.split_once('-').unwrap_or((identifier, ""));
    match field {
        VersionField::DbVersion => head.to_string(),
        VersionField::Architecture => rest.to_string(),
        VersionField::Arm64 => has_suffix_segment(rest, "arm64").to_string(),
        VersionField::Local => has_suffix_segment(rest, "local").to_string(),
    }
}

fn has_suffix_segment(rest: &str, flag: &str) -> bool {
    rest.split('-').skip(1).any(|segment| segment == flag)
}
