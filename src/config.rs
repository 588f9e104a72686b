//! Configuration management for the normalization engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-ast.toml)
//! - Environment variables (SCHEMA_AST__*)
//!
//! ## Example config file (schema-ast.toml):
//! ```toml
//! [resolver]
//! max_depth = 5
//! max_files = 50
//! max_expansions = 10000
//!
//! [cache]
//! enabled = true
//! max_age_hours = 24
//! compression_threshold = 102400
//!
//! [fetch]
//! timeout_secs = 30
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// External reference budgets
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Schema cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Network fetch settings
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Hard limits applied to external `$ref` resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum nesting of external documents
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum number of distinct external documents fetched per parse
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Maximum number of `$ref` expansions per parse
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,
}

/// Schema cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Use the cache for external fetches
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for the file-backed store (defaults to the XDG cache dir)
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Age after which an entry is stale
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    /// Serialized size above which entries are compressed
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,

    /// Namespace prefix for storage keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Soft budget for the whole store, in bytes
    #[serde(default = "default_size_budget")]
    pub size_budget: usize,
}

/// Fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout for HTTP fetches
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with HTTP fetches
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

// Default value functions
fn default_max_depth() -> usize {
    5
}

fn default_max_files() -> usize {
    50
}

fn default_max_expansions() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_max_age_hours() -> u64 {
    24
}

fn default_compression_threshold() -> usize {
    100 * 1024
}

fn default_key_prefix() -> String {
    "schema_cache_".to_string()
}

fn default_size_budget() -> usize {
    50 * 1024 * 1024
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("schema-ast/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_files: default_max_files(),
            max_expansions: default_max_expansions(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            max_age_hours: default_max_age_hours(),
            compression_threshold: default_compression_threshold(),
            key_prefix: default_key_prefix(),
            size_budget: default_size_budget(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours * 60 * 60)
    }

    /// Resolve the cache directory, falling back to the platform cache dir
    pub fn directory(&self) -> Option<PathBuf> {
        self.directory.clone().or_else(|| {
            directories::ProjectDirs::from("dev", "schema-ast", "schema-ast")
                .map(|dirs| dirs.cache_dir().join("schemas"))
        })
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, optionally adding a required config file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "schema-ast.toml",
            ".schema-ast.toml",
            "config/schema-ast.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "schema-ast", "schema-ast") {
            let xdg_config = config_dir.config_dir().join("schema-ast.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMA_AST__RESOLVER__MAX_DEPTH=8 etc.
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_AST")
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.resolver.max_depth, 5);
        assert_eq!(config.resolver.max_files, 50);
        assert_eq!(config.resolver.max_expansions, 10_000);
        assert_eq!(config.cache.compression_threshold, 102_400);
        assert_eq!(config.cache.max_age(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_serialize_config() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[resolver]"));
        assert!(toml_str.contains("[cache]"));
        assert!(toml_str.contains("[fetch]"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: EngineConfig = toml::from_str("[resolver]\nmax_depth = 9\n").unwrap();
        assert_eq!(config.resolver.max_depth, 9);
        assert_eq!(config.resolver.max_files, 50);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema-ast.toml");
        let mut config = EngineConfig::default();
        config.fetch.timeout_secs = 7;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = EngineConfig::load_from(path.to_str()).unwrap();
        assert_eq!(loaded.fetch.timeout_secs, 7);
    }
}
