//! credstore configuration file handling
//!
//! Provides default configuration generation and loading for the operator CLI.
//! Configuration files are TOML format and stored adjacent to the database.
//!
//! Every section is optional; omitted knobs fall back to the library defaults
//! in [`credstore::auth::options`].

use credstore::auth::options::{
    DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL, DEFAULT_QUEUE_TICK, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_DELAY,
};
use credstore::auth::AuthStateOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default collection (table) name
const DEFAULT_COLLECTION: &str = "auth_state";

/// Operator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredstoreConfig {
    /// Document store location
    pub store: StoreConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Document store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,

    /// Collection holding the auth state of one identity
    #[serde(default = "default_collection")]
    pub collection: String,
}

/// Record cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_size")]
    pub size: usize,

    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
}

/// Write queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Total attempts per write, the first one included
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL.as_millis() as u64
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

fn default_tick_ms() -> u64 {
    DEFAULT_QUEUE_TICK.as_millis() as u64
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: default_cache_size(),
            ttl_ms: default_cache_ttl_ms(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl CredstoreConfig {
    /// Create a new configuration with the given database path
    pub fn new(path: PathBuf) -> Self {
        Self {
            store: StoreConfig {
                path,
                collection: default_collection(),
            },
            cache: CacheConfig::default(),
            queue: QueueConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Library options for the auth state store
    pub fn auth_options(&self) -> AuthStateOptions {
        AuthStateOptions::default()
            .with_cache_size(self.cache.size)
            .with_cache_ttl(Duration::from_millis(self.cache.ttl_ms))
            .with_retry_attempts(self.queue.retry_attempts)
            .with_retry_delay(Duration::from_millis(self.queue.retry_delay_ms))
            .with_queue_tick(Duration::from_millis(self.queue.tick_ms))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: CredstoreConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    #[allow(dead_code)]
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        write_creating_parent(path, &contents)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(db_path: &Path) -> String {
        format!(
            r#"# credstore configuration
#
# Unset values fall back to built-in defaults.

[store]
# SQLite database holding the auth state documents
path = "{db_path}"

# Collection (table) for this identity; one collection per identity
collection = "{collection}"

[cache]
# Maximum cached records
size = {cache_size}

# Entry lifetime in milliseconds; expired entries are swept on this interval
ttl_ms = {ttl_ms}

[queue]
# Total attempts per write, the first one included
retry_attempts = {retry_attempts}

# Constant pause between attempts, milliseconds
retry_delay_ms = {retry_delay_ms}

# How often the queue picks the next write, milliseconds
tick_ms = {tick_ms}

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "{level}"
"#,
            db_path = db_path.display(),
            collection = DEFAULT_COLLECTION,
            cache_size = default_cache_size(),
            ttl_ms = default_cache_ttl_ms(),
            retry_attempts = default_retry_attempts(),
            retry_delay_ms = default_retry_delay_ms(),
            tick_ms = default_tick_ms(),
            level = DEFAULT_LOG_LEVEL,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        db_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        write_creating_parent(config_path, &Self::generate_default_toml(db_path))
    }

    /// Load the config at `config_path`, writing a default one first if missing
    pub fn load_or_create(
        config_path: &Path,
        db_path: &Path,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if !config_path.exists() {
            Self::create_default(config_path, db_path)?;
        }
        Self::load(config_path)
    }
}

fn write_creating_parent(path: &Path, contents: &str) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    fs::write(path, contents)
        .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

    Ok(())
}

/// Get the default config file path based on the database path
///
/// - Database: ~/.local/share/credstore/auth.db
/// - Config: ~/.local/share/credstore/config.toml
pub fn default_config_path(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .unwrap_or(db_path)
        .join("config.toml")
}

/// Get the default database path
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("credstore")
        .join("auth.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let db_path = PathBuf::from("/data/credstore/auth.db");
        let config = CredstoreConfig::new(db_path.clone());

        assert_eq!(config.store.path, db_path);
        assert_eq!(config.store.collection, "auth_state");
        assert_eq!(config.cache.size, 100);
        assert_eq!(config.queue.retry_attempts, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = CredstoreConfig::new(PathBuf::from("/data/credstore/auth.db"));
        config.queue.retry_attempts = 5;
        config.save(&config_path).unwrap();

        let loaded = CredstoreConfig::load(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_create_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");
        let db_path = temp_dir.path().join("auth.db");

        CredstoreConfig::create_default(&config_path, &db_path).unwrap();
        assert!(config_path.exists());

        // Generated file parses back to the defaults
        let config = CredstoreConfig::load(&config_path).unwrap();
        assert_eq!(config, CredstoreConfig::new(db_path));
    }

    #[test]
    fn test_load_or_create_keeps_existing() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[store]\npath = \"/tmp/a.db\"\ncollection = \"alice\"\n",
        )
        .unwrap();

        let config =
            CredstoreConfig::load_or_create(&config_path, Path::new("/tmp/other.db")).unwrap();
        assert_eq!(config.store.collection, "alice");
    }

    #[test]
    fn test_default_config_path() {
        let db_path = PathBuf::from("/data/credstore/auth.db");
        let config_path = default_config_path(&db_path);
        assert_eq!(config_path, PathBuf::from("/data/credstore/config.toml"));
    }

    #[test]
    fn test_load_config_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        // Write minimal config (only required fields)
        let minimal_config = r#"
[store]
path = "/tmp/auth.db"

[queue]
retry_attempts = 4
"#;
        fs::write(&config_path, minimal_config).unwrap();

        let config = CredstoreConfig::load(&config_path).unwrap();

        assert_eq!(config.store.collection, "auth_state");
        assert_eq!(config.queue.retry_attempts, 4);
        assert_eq!(config.queue.retry_delay_ms, 1000);
        assert_eq!(config.cache.ttl_ms, 300_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_auth_options_from_config() {
        let mut config = CredstoreConfig::new(PathBuf::from("/tmp/auth.db"));
        config.cache.size = 10;
        config.queue.tick_ms = 50;

        let options = config.auth_options();
        assert_eq!(options.cache_size, 10);
        assert_eq!(options.queue_tick, Duration::from_millis(50));
        assert_eq!(options.retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = CredstoreConfig::load(&temp_dir.path().join("absent.toml"));
        assert!(result.is_err());
    }
}
