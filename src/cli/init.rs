use super::config::CredstoreConfig;
use super::open_state;

/// Create the identity if the collection has none, and persist its credentials.
///
/// Running it against an initialized collection only reports the existing
/// identity; stored credentials are never replaced.
pub async fn execute(config: &CredstoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = open_state(config).await?;

    if state.was_created() {
        let saved = state.save_creds().await;
        state.shutdown().await;
        saved?;
        println!("✅ Created new identity");
    } else {
        state.shutdown().await;
        println!("Identity already initialized");
    }

    let creds = state.creds();
    let creds = creds.read().await;
    println!("  Database: {}", config.store.path.display());
    println!("  Collection: {}", config.store.collection);
    println!("  Registration ID: {}", creds.registration_id);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use credstore::auth::{AuthStateStore, CREDS_ID};
    use credstore::store::{DocumentCollection, SqliteCollection};
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> CredstoreConfig {
        CredstoreConfig::new(dir.path().join("auth.db"))
    }

    #[tokio::test]
    async fn test_init_persists_credentials() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);

        execute(&config).await.unwrap();

        let collection = SqliteCollection::open(&config.store.path, &config.store.collection)
            .await
            .unwrap();
        let stored = collection.find_one(CREDS_ID).await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);

        execute(&config).await.unwrap();
        let first = {
            let state = open_state(&config).await.unwrap();
            let id = state.creds().read().await.registration_id;
            assert!(!state.was_created());
            state.shutdown().await;
            id
        };

        execute(&config).await.unwrap();
        let collection = SqliteCollection::open(&config.store.path, &config.store.collection)
            .await
            .unwrap();
        let state = AuthStateStore::initialize(collection, config.auth_options())
            .await
            .unwrap();
        assert_eq!(state.creds().read().await.registration_id, first);
        state.shutdown().await;
    }
}
