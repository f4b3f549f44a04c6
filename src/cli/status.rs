use super::config::CredstoreConfig;
use super::open_state;

/// Show the stored identity
///
/// Reports the credential bundle's bookkeeping fields. A missing database is
/// reported as uninitialized without being created. An existing database is
/// opened normally, which may create the collection's table.
pub async fn execute(config: &CredstoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("📊 credstore status");
    println!();
    println!("  Database: {}", config.store.path.display());
    println!("  Collection: {}", config.store.collection);

    if !config.store.path.exists() {
        println!("  ❌ No database (run `credstore init`)");
        return Ok(());
    }

    let state = open_state(config).await?;
    let initialized = !state.was_created();
    state.shutdown().await;

    if !initialized {
        println!("  ❌ No identity stored (run `credstore init`)");
        return Ok(());
    }

    let creds = state.creds();
    let creds = creds.read().await;
    println!("  ✅ Identity stored");
    println!("  Registration ID: {}", creds.registration_id);
    println!("  Registered: {}", creds.registered);
    println!("  Next pre-key ID: {}", creds.next_pre_key_id);
    println!(
        "  First unuploaded pre-key ID: {}",
        creds.first_unuploaded_pre_key_id
    );
    println!("  Device ID: {}", creds.device_id);
    println!("  Created at: {} ms", creds.created_at);

    Ok(())
}
