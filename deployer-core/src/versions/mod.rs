pub mod identifier;
pub mod registry;

pub use identifier::{parse, validate_format, Architecture, VersionField, VersionIdentifier};
pub use registry::{
    get_default_version, get_version_config, list_versions, VersionConfig, VersionRegistry,
};
