//! Moving an item out of its vault.

use tracing::debug;

use super::Collaborators;
use keyvault_common::{Error, Result};
use keyvault_store::DecryptedItem;

/// Move an item out of its vault, back under the user's personal key.
///
/// # Errors
/// - `NotInVault` if the item has no key system
pub async fn remove_item_from_vault(c: &Collaborators, item: &DecryptedItem) -> Result<DecryptedItem> {
    let Some(id) = &item.key_system_identifier else {
        return Err(Error::NotInVault(item.uuid.to_string()));
    };

    if item.is_file() {
        c.files.move_file_out_of_vault(item).await?;
    }

    let updated = c
        .mutator
        .change_item(
            &item.uuid,
            Box::new(|item| {
                item.key_system_identifier = None;
                item.shared_vault_uuid = None;
            }),
        )
        .await?;

    debug!(key_system_identifier = %id, uuid = %item.uuid, "Item removed from vault");
    Ok(updated)
}
