//! Registry of known database versions and their configuration.
//!
//! The registry is a TOML document with a top-level `default` key naming the
//! default version and one table per version identifier:
//!
//! ```toml
//! default = "exasol-2025.1.4"
//!
//! ["exasol-2025.1.4"]
//! ARCHITECTURE = "x86_64"
//! DEFAULT_INSTANCE_TYPE = "r6i.xlarge"
//! ```
//!
//! Tables are kept in document order so `list_all` matches the file.

use super::identifier::validate_format;
use crate::error::{DeployerError, Result};
use log::debug;
use std::fs;
use std::path::Path;
use toml_edit::{Document, Item, Value};

const BUILTIN_REGISTRY: &str = include_str!("../../versions.toml");

/// Key/value configuration of one version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionConfig {
    entries: Vec<(String, String)>,
}

impl VersionConfig {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All known versions plus the designated default.
#[derive(Debug, Clone)]
pub struct VersionRegistry {
    default: String,
    versions: Vec<(String, VersionConfig)>,
}

impl VersionRegistry {
    /// The registry compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_REGISTRY)
    }

    /// Loads a registry file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading version registry from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses registry content.
    pub fn parse(content: &str) -> Result<Self> {
        let doc = content.parse::<Document>()?;

        let mut default = None;
        let mut versions = Vec::new();

        for (key, item) in doc.iter() {
            match item {
                Item::Value(value) if key == "default" => {
                    let name = value.as_str().ok_or_else(|| {
                        DeployerError::Registry("'default' must be a string".to_string())
                    })?;
                    default = Some(name.to_string());
                }
                Item::Table(table) => {
                    validate_format(key).map_err(|_| {
                        DeployerError::Registry(format!("invalid version identifier '{key}'"))
                    })?;

                    let mut entries = Vec::new();
                    for (config_key, config_item) in table.iter() {
                        let value = config_item.as_value().ok_or_else(|| {
                            DeployerError::Registry(format!(
                                "'{key}.{config_key}' must be a plain value"
                            ))
                        })?;
                        entries.push((config_key.to_string(), render_value(key, config_key, value)?));
                    }
                    versions.push((key.to_string(), VersionConfig { entries }));
                }
                _ => {
                    return Err(DeployerError::Registry(format!(
                        "unexpected top-level entry '{key}'"
                    )))
                }
            }
        }

        let default = default
            .ok_or_else(|| DeployerError::Registry("missing 'default' version".to_string()))?;
        if !versions.iter().any(|(name, _)| *name == default) {
            return Err(DeployerError::Registry(format!(
                "default version '{default}' is not defined"
            )));
        }

        Ok(Self { default, versions })
    }

    pub fn exists(&self, identifier: &str) -> bool {
        self.versions.iter().any(|(name, _)| name == identifier)
    }

    /// Full configuration of one version.
    pub fn get_version_config(&self, identifier: &str) -> Result<&VersionConfig> {
        self.versions
            .iter()
            .find(|(name, _)| name == identifier)
            .map(|(_, config)| config)
            .ok_or_else(|| DeployerError::VersionNotFound(identifier.to_string()))
    }

    /// One configuration value of a known version.
    pub fn get_config(&self, identifier: &str, key: &str) -> Result<&str> {
        self.get_version_config(identifier)?
            .get(key)
            .ok_or_else(|| DeployerError::ConfigKeyNotFound {
                version: identifier.to_string(),
                key: key.to_string(),
            })
    }

    pub fn default_identifier(&self) -> &str {
        &self.default
    }

    /// Identifiers in registry order.
    pub fn list_all(&self) -> Vec<&str> {
        self.versions.iter().map(|(name, _)| name.as_str()).collect()
    }
}

fn render_value(version: &str, key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.value().clone()),
        Value::Integer(i) => Ok(i.value().to_string()),
        Value::Float(f) => Ok(f.value().to_string()),
        Value::Boolean(b) => Ok(b.value().to_string()),
        _ => Err(DeployerError::Registry(format!(
            "'{version}.{key}' must be a string, number or boolean"
        ))),
    }
}

/// Looks up one value in the built-in registry.
pub fn get_version_config(identifier: &str, key: &str) -> Result<String> {
    VersionRegistry::builtin()?
        .get_config(identifier, key)
        .map(str::to_string)
}

/// Default version of the built-in registry.
pub fn get_default_version() -> Result<String> {
    Ok(VersionRegistry::builtin()?.default_identifier().to_string())
}

/// All versions of the built-in registry.
pub fn list_versions() -> Result<Vec<String>> {
    Ok(VersionRegistry::builtin()?
        .list_all()
        .into_iter()
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default = "db-1.2.3"

["db-1.0.0"]
ARCHITECTURE = "x86_64"

["db-1.2.3"]
ARCHITECTURE = "x86_64"
NODE_DISK_GB = 100

["db-1.2.3-arm64"]
ARCHITECTURE = "arm64"
"#;

    #[test]
    fn builtin_registry_scenario() {
        assert_eq!(
            get_version_config("exasol-2025.1.4", "ARCHITECTURE").unwrap(),
            "x86_64"
        );
        assert_eq!(get_default_version().unwrap(), "exasol-2025.1.4");
        assert!(list_versions()
            .unwrap()
            .contains(&"exasol-2025.1.4".to_string()));
    }

    #[test]
    fn builtin_architectures_match_identifiers() {
        let registry = VersionRegistry::builtin().unwrap();
        for id in registry.list_all() {
            let parsed: crate::versions::VersionIdentifier = id.parse().unwrap();
            assert_eq!(
                registry.get_config(id, "ARCHITECTURE").unwrap(),
                parsed.architecture().as_str(),
                "{id}"
            );
        }
    }

    #[test]
    fn keeps_registry_order() {
        let registry = VersionRegistry::parse(SAMPLE).unwrap();
        assert_eq!(
            registry.list_all(),
            vec!["db-1.0.0", "db-1.2.3", "db-1.2.3-arm64"]
        );
        assert_eq!(registry.default_identifier(), "db-1.2.3");
    }

    #[test]
    fn renders_non_string_values() {
        let registry = VersionRegistry::parse(SAMPLE).unwrap();
        assert_eq!(registry.get_config("db-1.2.3", "NODE_DISK_GB").unwrap(), "100");
    }

    #[test]
    fn lookups_fail_with_not_found() {
        let registry = VersionRegistry::parse(SAMPLE).unwrap();
        assert!(!registry.exists("db-9.9.9"));
        assert!(matches!(
            registry.get_config("db-9.9.9", "ARCHITECTURE"),
            Err(DeployerError::VersionNotFound(_))
        ));
        assert!(matches!(
            registry.get_config("db-1.0.0", "MISSING"),
            Err(DeployerError::ConfigKeyNotFound { .. })
        ));
        // Malformed ids are simply unknown here; format checks happen earlier.
        assert!(matches!(
            registry.get_config("not a version", "ARCHITECTURE"),
            Err(DeployerError::VersionNotFound(_))
        ));
    }

    #[test]
    fn rejects_bad_registries() {
        let no_default = "[\"db-1.0.0\"]\nARCHITECTURE = \"x86_64\"\n";
        assert!(matches!(
            VersionRegistry::parse(no_default),
            Err(DeployerError::Registry(_))
        ));

        let dangling_default = "default = \"db-2.0.0\"\n[\"db-1.0.0\"]\nA = \"b\"\n";
        assert!(VersionRegistry::parse(dangling_default).is_err());

        let bad_key = "default = \"db-1.0.0\"\n[\"db-1.0.0\"]\nA = \"b\"\n[\"db-1.0.0-x86_64\"]\nA = \"b\"\n";
        assert!(VersionRegistry::parse(bad_key).is_err());
    }
}
