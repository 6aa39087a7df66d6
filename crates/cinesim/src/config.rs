//! Configuration file support for cinesim.
//!
//! All cinesim data is stored in a `.cinesim/` directory:
//! - `.cinesim/config.toml` - Configuration file
//! - `.cinesim/movies.jsonl` - Movie table (default location)
//! - `.cinesim/logs/` - Log files, when file logging is enabled
//!
//! Config discovery searches for `.cinesim/config.toml` starting from the current
//! directory and walking up to parent directories.

use std::path::{Path, PathBuf};

/// The cinesim data directory name.
pub const CINESIM_DIR: &str = ".cinesim";
/// The config file name within the cinesim directory.
pub const CONFIG_FILE: &str = "config.toml";

use anyhow::{Context, Result};
use cinesim_core::{DEFAULT_TOP_K, DispatchConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Catalog settings.
    pub catalog: CatalogConfig,
    /// Similarity search settings.
    pub search: SearchConfig,
    /// Store watching settings.
    pub watch: WatchConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Catalog configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Number of components in every embedding.
    pub dimension: usize,
    /// Path to the movie table.
    pub store: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            dimension: 387,
            // Relative to .cinesim/ directory
            store: PathBuf::from("movies.jsonl"),
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results per selected movie.
    pub top_k: usize,
    /// Maximum concurrent queries.
    pub max_workers: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let dispatch = DispatchConfig::default();
        Self {
            top_k: DEFAULT_TOP_K,
            max_workers: dispatch.max_workers,
        }
    }
}

/// Watch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce for store change events in milliseconds.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write logs to `.cinesim/logs/` instead of stderr.
    pub to_file: bool,
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find and load configuration from current or parent directories.
    pub fn find_and_load() -> Result<Option<(Self, PathBuf)>> {
        let current = std::env::current_dir()?;
        Self::find_and_load_from(&current)
    }

    /// Find and load configuration starting from a specific directory.
    ///
    /// Looks for `.cinesim/config.toml` in the directory and its parents.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let cinesim_dir = dir.join(CINESIM_DIR);
            let config_path = cinesim_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                // Return the .cinesim directory, not the config file
                return Ok(Some((config, cinesim_dir)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Resolve the store path relative to the .cinesim directory.
    pub fn resolve_store_path(&self, cinesim_dir: Option<&Path>) -> PathBuf {
        if self.catalog.store.is_absolute() {
            self.catalog.store.clone()
        } else if let Some(dir) = cinesim_dir {
            dir.join(&self.catalog.store)
        } else {
            PathBuf::from(CINESIM_DIR).join(&self.catalog.store)
        }
    }

    /// Dispatcher settings from the `[search]` section.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::default()
            .with_top_k(self.search.top_k)
            .with_max_workers(self.search.max_workers)
    }

    /// Get the config file path for a given .cinesim directory.
    pub fn config_path(cinesim_dir: &Path) -> PathBuf {
        cinesim_dir.join(CONFIG_FILE)
    }
}

/// Configuration validation error.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigValidationError {}

impl Config {
    /// Validate the configuration.
    ///
    /// Returns a list of validation errors if any are found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.catalog.dimension == 0 {
            errors.push(ConfigValidationError {
                field: "catalog.dimension".to_string(),
                message: "Embedding dimension must be at least 1.".to_string(),
            });
        }

        if self.catalog.store.as_os_str().is_empty() {
            errors.push(ConfigValidationError {
                field: "catalog.store".to_string(),
                message: "Store path cannot be empty.".to_string(),
            });
        }

        if self.search.top_k == 0 {
            errors.push(ConfigValidationError {
                field: "search.top_k".to_string(),
                message: "top_k must be at least 1.".to_string(),
            });
        }

        if self.search.max_workers == 0 {
            errors.push(ConfigValidationError {
                field: "search.max_workers".to_string(),
                message: "max_workers must be at least 1.".to_string(),
            });
        } else if self.search.max_workers > Semaphore::MAX_PERMITS {
            errors.push(ConfigValidationError {
                field: "search.max_workers".to_string(),
                message: format!("max_workers must be at most {}.", Semaphore::MAX_PERMITS),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.catalog.dimension, 387);
        assert_eq!(config.catalog.store, PathBuf::from("movies.jsonl"));
        assert_eq!(config.search.top_k, 5);
        assert!(config.search.max_workers >= 1);
        assert_eq!(config.watch.debounce_ms, 300);
        assert!(!config.logging.to_file);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[catalog]
dimension = 2
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.catalog.dimension, 2);
        // Defaults should still apply
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.catalog.store, PathBuf::from("movies.jsonl"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[catalog]
dimension = 128
store = "/srv/movies.jsonl"

[search]
top_k = 10
max_workers = 3

[watch]
debounce_ms = 50

[logging]
to_file = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.catalog.dimension, 128);
        assert_eq!(config.catalog.store, PathBuf::from("/srv/movies.jsonl"));
        assert_eq!(config.search.top_k, 10);
        assert_eq!(config.search.max_workers, 3);
        assert_eq!(config.watch.debounce_ms, 50);
        assert!(config.logging.to_file);

        let dispatch = config.dispatch_config();
        assert_eq!(dispatch.top_k, 10);
        assert_eq!(dispatch.max_workers, 3);
    }

    #[test]
    fn test_resolve_store_path() {
        let config = Config::default();
        let cinesim_dir = PathBuf::from("/project/.cinesim");
        let resolved = config.resolve_store_path(Some(&cinesim_dir));
        assert_eq!(resolved, PathBuf::from("/project/.cinesim/movies.jsonl"));

        assert_eq!(
            config.resolve_store_path(None),
            PathBuf::from(".cinesim/movies.jsonl")
        );

        let mut absolute = Config::default();
        absolute.catalog.store = PathBuf::from("/data/m.jsonl");
        assert_eq!(
            absolute.resolve_store_path(Some(&cinesim_dir)),
            PathBuf::from("/data/m.jsonl")
        );
    }

    #[test]
    fn test_validate_zero_values() {
        let mut config = Config::default();
        config.catalog.dimension = 0;
        config.search.top_k = 0;
        config.search.max_workers = 0;

        let errors = config.validate();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["catalog.dimension", "search.top_k", "search.max_workers"]
        );
    }

    #[test]
    fn test_validate_oversized_max_workers() {
        // Fits a TOML integer but exceeds what the worker pool can hold
        let config: Config =
            toml::from_str("[search]\nmax_workers = 4611686018427387904\n").unwrap();
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "search.max_workers");
    }

    #[test]
    fn test_find_and_load_walks_up() {
        let root = tempdir().unwrap();
        let cinesim_dir = root.path().join(CINESIM_DIR);
        std::fs::create_dir_all(&cinesim_dir).unwrap();
        std::fs::write(
            Config::config_path(&cinesim_dir),
            "[search]\ntop_k = 7\n",
        )
        .unwrap();

        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, found) = Config::find_and_load_from(&nested).unwrap().unwrap();
        assert_eq!(config.search.top_k, 7);
        assert_eq!(found, cinesim_dir);
    }

    #[test]
    fn test_default_roundtrips_through_toml() {
        let rendered = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.catalog.dimension, 387);
        assert_eq!(parsed.search.top_k, 5);
    }
}
