//! Moving items into a vault.

use tracing::debug;

use super::Collaborators;
use keyvault_common::{Error, Result};
use keyvault_store::{ContentType, DecryptedItem, VaultListing};

/// Move items into a vault.
///
/// Attached files are re-encrypted first, then each item is re-tagged with
/// the vault's key system (and shared vault, if any).
///
/// # Errors
/// - `LockedVault` if the vault has no primary items key
/// - `InvalidOperation` for vault listings and for items that belong to a
///   different vault
pub async fn add_items_to_vault(
    c: &Collaborators,
    vault: &VaultListing,
    items: &[DecryptedItem],
) -> Result<Vec<DecryptedItem>> {
    let id = vault.key_system_identifier();

    if c.keys.primary_items_key(id).await.is_none() {
        return Err(Error::LockedVault(vault.name().to_string()));
    }
    for item in items {
        if item.content_type == ContentType::VaultListing {
            return Err(Error::InvalidOperation(format!(
                "Vault listing {} cannot be placed in a vault",
                item.uuid
            )));
        }
        if item.key_system_identifier.as_ref().is_some_and(|other| other != id) {
            return Err(Error::InvalidOperation(format!(
                "Item {} belongs to another vault",
                item.uuid
            )));
        }
    }

    let mut moved = Vec::with_capacity(items.len());
    for item in items {
        if item.is_file() {
            c.files.move_file_to_vault(item, vault).await?;
        }

        let key_system_identifier = id.clone();
        let shared_vault_uuid = vault.shared_vault_uuid().map(str::to_string);
        let updated = c
            .mutator
            .change_item(
                &item.uuid,
                Box::new(move |item| {
                    item.key_system_identifier = Some(key_system_identifier);
                    item.shared_vault_uuid = shared_vault_uuid;
                }),
            )
            .await?;

        debug!(key_system_identifier = %id, uuid = %item.uuid, "Item added to vault");
        moved.push(updated);
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::create_vault;
    use crate::test_support::{randomized, user_inputted, Harness};
    use keyvault_store::{FileMove, ItemIndex, KeyStorageMode, KeyStore};

    #[tokio::test]
    async fn test_add_note_and_file() {
        let harness = Harness::new();
        let c = &harness.collaborators;
        let vault = create_vault(c, randomized("Work", KeyStorageMode::Synced)).await.unwrap();
        let id = vault.key_system_identifier();
        let note = harness.insert(DecryptedItem::note("n", "")).await;
        let file = harness.insert(DecryptedItem::file("f.pdf", "remote-1", 42)).await;

        let moved = add_items_to_vault(c, &vault, &[note.clone(), file.clone()]).await.unwrap();

        assert!(moved.iter().all(|item| item.key_system_identifier.as_ref() == Some(id)));
        assert_eq!(c.index.items_in_key_system(id).await.len(), 2);
        assert_eq!(
            harness.files.moves().await,
            vec![FileMove::IntoVault {
                file: file.uuid,
                key_system_identifier: id.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn test_locked_vault_rejected_before_changes() {
        let harness = Harness::new();
        let c = &harness.collaborators;
        let vault = create_vault(c, user_inputted("Secrets", "pw", KeyStorageMode::Local))
            .await
            .unwrap();
        c.keys.clear_keys_for_vault(&vault).await.unwrap();
        let file = harness.insert(DecryptedItem::file("f", "r", 1)).await;

        let result = add_items_to_vault(c, &vault, &[file.clone()]).await;

        assert!(matches!(result, Err(Error::LockedVault(_))));
        assert!(harness.files.moves().await.is_empty());
        assert!(!c.index.find_item(&file.uuid).await.unwrap().is_in_vault());
    }

    #[tokio::test]
    async fn test_item_from_other_vault_rejected() {
        let harness = Harness::new();
        let c = &harness.collaborators;
        let a = create_vault(c, randomized("A", KeyStorageMode::Synced)).await.unwrap();
        let b = create_vault(c, randomized("B", KeyStorageMode::Synced)).await.unwrap();
        let note = harness.insert(DecryptedItem::note("n", "")).await;
        let in_a = add_items_to_vault(c, &a, &[note]).await.unwrap().remove(0);

        let result = add_items_to_vault(c, &b, &[in_a]).await;
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
    }

    #[tokio::test]
    async fn test_listing_cannot_be_added() {
        let harness = Harness::new();
        let c = &harness.collaborators;
        let a = create_vault(c, randomized("A", KeyStorageMode::Synced)).await.unwrap();
        let b = create_vault(c, randomized("B", KeyStorageMode::Synced)).await.unwrap();
        let b_item = c.index.find_item(&b.uuid).await.unwrap();

        let result = add_items_to_vault(c, &a, &[b_item]).await;
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
    }
}
