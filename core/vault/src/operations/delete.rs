//! Vault deletion.

use tracing::info;

use super::Collaborators;
use keyvault_common::DisplayableError;
use keyvault_store::VaultListing;

/// Remove every key of the vault's key system, then its listing.
///
/// Failures are returned as a [`DisplayableError`] for the caller to show.
/// Items that belonged to the vault stay in the index, unreadable.
pub async fn delete_vault(c: &Collaborators, vault: &VaultListing) -> Result<(), DisplayableError> {
    let id = vault.key_system_identifier();

    c.keys.delete_keys_for_vault(id).await.map_err(|e| {
        DisplayableError::new(format!("Could not delete keys of vault '{}': {}", vault.name(), e))
    })?;
    c.mutator.delete_item(&vault.uuid).await.map_err(|e| {
        DisplayableError::new(format!("Could not delete vault '{}': {}", vault.name(), e))
    })?;

    info!(key_system_identifier = %id, "Vault deleted");
    Ok(())
}
