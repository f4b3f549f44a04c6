//! Key record inspection commands.

use super::config::CredstoreConfig;
use super::open_state;
use credstore::auth::{record_id, KeyCategory, SignalKeyStore};
use credstore::serialization::encode;

/// Print one key record as JSON (in its stored, tagged form).
pub async fn get(
    config: &CredstoreConfig,
    category: &str,
    id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let category = KeyCategory::from(category);
    let state = open_state(config).await?;
    let mut records = state.keys().get(&category, &[id.to_string()]).await;
    state.shutdown().await;

    match records.remove(id).flatten() {
        Some(record) => {
            let json = serde_json::to_string_pretty(&encode(&record.into_value()))?;
            println!("{}", json);
            Ok(())
        }
        None => Err(format!("No record '{}'", record_id(&category, id)).into()),
    }
}

/// Delete one key record.
pub async fn remove(
    config: &CredstoreConfig,
    category: &str,
    id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let record = record_id(&KeyCategory::from(category), id);
    let state = open_state(config).await?;
    let removed = state.try_remove(&record).await;
    state.shutdown().await;
    removed?;

    println!("Removed {}", record);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use credstore::auth::KeyRecordSet;
    use credstore::serialization::Value;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    async fn seed(config: &CredstoreConfig) {
        let state = open_state(config).await.unwrap();
        let mut records = KeyRecordSet::new();
        records.insert(
            KeyCategory::PreKey,
            BTreeMap::from([("5".to_string(), Some(Value::from(vec![1u8, 2, 3])))]),
        );
        state.keys().set(records).await.unwrap();
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_get_and_remove_key() {
        let temp_dir = TempDir::new().unwrap();
        let config = CredstoreConfig::new(temp_dir.path().join("auth.db"));
        seed(&config).await;

        get(&config, "pre-key", "5").await.unwrap();
        remove(&config, "pre-key", "5").await.unwrap();
        assert!(get(&config, "pre-key", "5").await.is_err());
    }

    #[tokio::test]
    async fn test_get_missing_key_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config = CredstoreConfig::new(temp_dir.path().join("auth.db"));

        assert!(get(&config, "session", "absent").await.is_err());
    }
}
