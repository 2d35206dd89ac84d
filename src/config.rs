//! Configuration management for the FML mapper
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (fml-mapper.toml)
//! - Environment variables (FML_*)
//!
//! ## Example config file (fml-mapper.toml):
//! ```toml
//! [schemas]
//! path = "./definitions"
//! skip_prefixes = ["target/", ".git/"]
//!
//! [template]
//! map_url_base = "http://example.org/fhir/StructureMap/"
//! main_group_name = "Main"
//! indent = 2
//! max_depth = 64
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::graph::LoadConfig;

/// Main configuration for the mapper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Where schema definitions are read from
    #[serde(default)]
    pub schemas: SchemaSourceConfig,

    /// Program output settings
    #[serde(default)]
    pub template: TemplateConfig,
}

/// Schema source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSourceConfig {
    /// Directory of StructureDefinition / ValueSet JSON files
    #[serde(default = "default_schema_path")]
    pub path: PathBuf,

    /// Skip files under these relative prefixes
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,

    /// Only load files under these relative prefixes (empty = all)
    #[serde(default)]
    pub include_prefixes: Vec<String>,
}

/// FML output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Prefix for the `map` url when the snapshot does not carry one
    #[serde(default = "default_map_url_base")]
    pub map_url_base: String,

    /// Name of the top-level group
    #[serde(default = "default_main_group_name")]
    pub main_group_name: String,

    /// Spaces per nesting level
    #[serde(default = "default_indent")]
    pub indent: usize,

    /// Deepest rule nesting the emitter accepts
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

// Default value functions
fn default_schema_path() -> PathBuf {
    PathBuf::from("definitions")
}

fn default_skip_prefixes() -> Vec<String> {
    LoadConfig::default().skip_prefixes
}

fn default_map_url_base() -> String {
    "http://example.org/fhir/StructureMap/".to_string()
}

fn default_main_group_name() -> String {
    "Main".to_string()
}

fn default_indent() -> usize {
    2
}

fn default_max_depth() -> usize {
    64
}

impl Default for SchemaSourceConfig {
    fn default() -> Self {
        Self {
            path: default_schema_path(),
            skip_prefixes: default_skip_prefixes(),
            include_prefixes: Vec::new(),
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            map_url_base: default_map_url_base(),
            main_group_name: default_main_group_name(),
            indent: default_indent(),
            max_depth: default_max_depth(),
        }
    }
}

impl SchemaSourceConfig {
    /// Loader filters for this source
    pub fn load_config(&self) -> LoadConfig {
        LoadConfig {
            skip_prefixes: self.skip_prefixes.clone(),
            include_prefixes: self.include_prefixes.clone(),
        }
    }
}

impl MapperConfig {
    /// Load configuration, layering a specific file over the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["fml-mapper.toml", ".fml-mapper.toml", "config/fml-mapper.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("org", "fhir", "fml-mapper") {
            let xdg_config = config_dir.config_dir().join("fml-mapper.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // FML_TEMPLATE__MAX_DEPTH=32 etc.
        builder = builder.add_source(
            Environment::with_prefix("FML")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Schema directory (resolves relative paths against the working directory)
    pub fn schema_path(&self) -> PathBuf {
        if self.schemas.path.is_absolute() {
            self.schemas.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.schemas.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = MapperConfig::default();
        assert_eq!(config.template.main_group_name, "Main");
        assert_eq!(config.template.indent, 2);
        assert!(config.schemas.skip_prefixes.contains(&"target/".to_string()));
    }

    #[test]
    fn test_serialize_config() {
        let config = MapperConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[schemas]"));
        assert!(toml_str.contains("[template]"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[template]\nindent = 4\n").unwrap();

        let config = MapperConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.template.indent, 4);
        assert_eq!(config.template.max_depth, 64);
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        // no other test in this binary reads map_url_base
        std::env::set_var("FML_TEMPLATE__MAP_URL_BASE", "urn:maps:");
        let config = MapperConfig::load_from(None);
        std::env::remove_var("FML_TEMPLATE__MAP_URL_BASE");

        assert_eq!(config.unwrap().template.map_url_base, "urn:maps:");
    }

    #[test]
    fn test_save_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = MapperConfig::default();
        config.template.main_group_name = "PatientToObservation".to_string();
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = MapperConfig::load_from(path.to_str()).unwrap();
        assert_eq!(loaded.template, config.template);
    }
}
