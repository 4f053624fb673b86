//! Configuration management for the schema compiler
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-dsl.toml)
//! - Environment variables (SCHEMA_DSL__*)
//!
//! ## Example config file (schema-dsl.toml):
//! ```toml
//! [package]
//! name = "schema.generated"
//! file_name = "accounts"
//!
//! [defaults]
//! syncable = true
//! versioned = false
//! tombstone_ttl_hours = 1440
//!
//! [assembly]
//! unexported_references = "reject"
//!
//! [output]
//! format = "compact"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::assemble::{AssemblyOptions, ReferencePolicy, DEFAULT_PACKAGE_NAME};
use crate::types::SchemaDefaults;

/// Main configuration for the compiler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub package: PackageConfig,

    /// Schema-wide defaults for item types and key paths
    #[serde(default)]
    pub defaults: SchemaDefaults,

    #[serde(default)]
    pub assembly: AssemblyConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Package naming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Base package name
    #[serde(default = "default_package_name")]
    pub name: String,

    /// Appended to the package name so unrelated schemas do not collide
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Package assembly behavior
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default)]
    pub unexported_references: ReferencePolicy,
}

/// Response encoding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

fn default_package_name() -> String {
    DEFAULT_PACKAGE_NAME.to_string()
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name: default_package_name(),
            file_name: None,
        }
    }
}

impl CompilerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "schema-dsl.toml",
            ".schema-dsl.toml",
            "config/schema-dsl.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "schema-dsl", "schema-dsl") {
            let xdg_config = config_dir.config_dir().join("schema-dsl.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Load from environment variables (SCHEMA_DSL__*)
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_DSL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Effective package name: `<name>.<file_name>` when a file name is set
    pub fn package_name(&self) -> String {
        match self.package.file_name.as_deref() {
            Some(file_name) if !file_name.is_empty() => {
                format!("{}.{}", self.package.name, file_name)
            }
            _ => self.package.name.clone(),
        }
    }

    /// Assembly inputs derived from this configuration
    pub fn assembly_options(&self) -> AssemblyOptions {
        AssemblyOptions {
            package_name: self.package_name(),
            file_name: self.package.file_name.clone().unwrap_or_default(),
            defaults: self.defaults.clone(),
            policy: self.assembly.unexported_references,
        }
    }
}
