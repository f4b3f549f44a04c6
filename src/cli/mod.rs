use clap::{Args, Parser, Subcommand};
use credstore::auth::AuthStateStore;
use credstore::store::SqliteCollection;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config;
pub mod init;
pub mod keys;
pub mod status;
pub mod version;

use config::{default_config_path, default_db_path, CredstoreConfig};

#[derive(Parser)]
#[command(name = "credstore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for persisted signal-protocol auth state", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where the auth state lives
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreArgs {
    /// Path to config file (default: adjacent to the database)
    #[arg(long)]
    pub config: Option<String>,

    /// Path to the SQLite database (overrides the config file)
    #[arg(long)]
    pub db_path: Option<String>,

    /// Collection holding the identity (overrides the config file)
    #[arg(long)]
    pub collection: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create (or load) the identity and persist its credentials
    Init {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show the stored identity
    Status {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print one key record as JSON
    GetKey {
        /// Key category, e.g. pre-key, session, app-state-sync-key
        category: String,

        /// Record id within the category
        id: String,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Delete one key record
    RemoveKey {
        category: String,

        id: String,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Init { store } => {
            let config = resolve_config(&store, true)?;
            init_logging(&config.logging.level);
            init::execute(&config).await
        }
        Commands::Status { store } => {
            let config = resolve_config(&store, false)?;
            init_logging(&config.logging.level);
            status::execute(&config).await
        }
        Commands::GetKey {
            category,
            id,
            store,
        } => {
            let config = resolve_config(&store, false)?;
            init_logging(&config.logging.level);
            keys::get(&config, &category, &id).await
        }
        Commands::RemoveKey {
            category,
            id,
            store,
        } => {
            let config = resolve_config(&store, false)?;
            init_logging(&config.logging.level);
            keys::remove(&config, &category, &id).await
        }
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

/// Load the config file (creating a default one when `create` is set) and
/// apply command-line overrides.
pub fn resolve_config(
    args: &StoreArgs,
    create: bool,
) -> Result<CredstoreConfig, Box<dyn std::error::Error>> {
    let db_path = args
        .db_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_db_path);
    let config_path = args
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| default_config_path(&db_path));

    let mut config = if create {
        CredstoreConfig::load_or_create(&config_path, &db_path)?
    } else if config_path.exists() {
        CredstoreConfig::load(&config_path)?
    } else {
        CredstoreConfig::new(db_path.clone())
    };

    if args.db_path.is_some() {
        config.store.path = db_path;
    }
    if let Some(collection) = &args.collection {
        config.store.collection = collection.clone();
    }

    Ok(config)
}

/// Open the configured collection and load the auth state from it.
pub async fn open_state(
    config: &CredstoreConfig,
) -> Result<AuthStateStore, Box<dyn std::error::Error>> {
    let collection = SqliteCollection::open(&config.store.path, &config.store.collection).await?;
    let state = AuthStateStore::initialize(collection, config.auth_options()).await?;
    Ok(state)
}

/// Install the stderr log subscriber. `RUST_LOG` takes precedence over `level`.
fn init_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["credstore", "init", "--db-path", "/tmp/auth.db"]);

        match cli.command {
            Commands::Init { store } => {
                assert_eq!(store.db_path, Some("/tmp/auth.db".to_string()));
                assert_eq!(store.config, None);
                assert_eq!(store.collection, None);
            }
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_cli_parse_status_defaults() {
        let cli = Cli::parse_from(["credstore", "status"]);

        match cli.command {
            Commands::Status { store } => assert_eq!(store, StoreArgs::default()),
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_cli_parse_get_key() {
        let cli = Cli::parse_from([
            "credstore",
            "get-key",
            "pre-key",
            "5",
            "--collection",
            "alice",
        ]);

        match cli.command {
            Commands::GetKey {
                category,
                id,
                store,
            } => {
                assert_eq!(category, "pre-key");
                assert_eq!(id, "5");
                assert_eq!(store.collection, Some("alice".to_string()));
            }
            _ => panic!("Expected GetKey command"),
        }
    }

    #[test]
    fn test_cli_parse_remove_key() {
        let cli = Cli::parse_from(["credstore", "remove-key", "session", "123.0"]);

        match cli.command {
            Commands::RemoveKey { category, id, .. } => {
                assert_eq!(category, "session");
                assert_eq!(id, "123.0");
            }
            _ => panic!("Expected RemoveKey command"),
        }
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["credstore", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn test_get_key_requires_id() {
        assert!(Cli::try_parse_from(["credstore", "get-key", "pre-key"]).is_err());
    }

    #[test]
    fn test_resolve_config_creates_default_on_init() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("auth.db");
        let args = StoreArgs {
            db_path: Some(db_path.display().to_string()),
            ..StoreArgs::default()
        };

        let config = resolve_config(&args, true).unwrap();
        assert_eq!(config.store.path, db_path);
        assert!(temp_dir.path().join("config.toml").exists());
    }

    #[test]
    fn test_resolve_config_applies_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("custom.toml");
        std::fs::write(
            &config_path,
            "[store]\npath = \"/tmp/from-file.db\"\ncollection = \"bob\"\n",
        )
        .unwrap();

        let args = StoreArgs {
            config: Some(config_path.display().to_string()),
            db_path: None,
            collection: Some("carol".to_string()),
        };

        let config = resolve_config(&args, false).unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/from-file.db"));
        assert_eq!(config.store.collection, "carol");
    }

    #[test]
    fn test_resolve_config_without_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("auth.db");
        let args = StoreArgs {
            db_path: Some(db_path.display().to_string()),
            ..StoreArgs::default()
        };

        let config = resolve_config(&args, false).unwrap();
        assert_eq!(config.store.collection, "auth_state");
        assert!(!temp_dir.path().join("config.toml").exists());
    }
}
