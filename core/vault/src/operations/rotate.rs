//! Root key rotation.

use tracing::info;

use super::{store_root_key, Collaborators};
use keyvault_common::{Error, Result, SensitiveBytes};
use keyvault_store::{ItemContent, KeyPasswordType, VaultListing};

/// Input for [`rotate_root_key`].
#[derive(Debug, Clone)]
pub struct RotateRootKeyInput {
    pub vault: VaultListing,
    /// Tags the new items key when the vault is shared.
    pub shared_vault_uuid: Option<String>,
    /// Derive the new root key from this password; generate a random one
    /// when absent.
    pub user_inputted_password: Option<SensitiveBytes>,
}

/// Replace a vault's root key.
///
/// # Preconditions
/// - The vault's current root key is available
///
/// # Postconditions
/// - A new root key with fresh parameters is stored under the vault's
///   storage mode and becomes primary
/// - Existing decrypted items keys are re-wrapped under the new root key
/// - A new primary items key exists
/// - The listing carries the new root key parameters
///
/// # Errors
/// - `LockedVault` if the current root key is not available
/// - `InvalidInput` for an empty password
pub async fn rotate_root_key(c: &Collaborators, input: RotateRootKeyInput) -> Result<VaultListing> {
    let vault = &input.vault;
    let id = vault.key_system_identifier();

    if c.keys.primary_root_key(id).await.is_none() {
        return Err(Error::LockedVault(vault.name().to_string()));
    }
    if input
        .user_inputted_password
        .as_ref()
        .is_some_and(SensitiveBytes::is_empty)
    {
        return Err(Error::InvalidInput("Vault password cannot be empty".to_string()));
    }

    let storage_mode = vault.key_storage_mode();
    let root_key = match &input.user_inputted_password {
        Some(password) => {
            let params = c.keys.create_root_key_params(id, KeyPasswordType::UserInputted);
            c.keys
                .derive_user_inputted_root_key(&params, password, storage_mode)
                .await?
        }
        None => {
            let params = c.keys.create_root_key_params(id, KeyPasswordType::Randomized);
            c.keys.create_randomized_root_key(params, storage_mode)
        }
    };
    let new_params = root_key.key_params.clone();

    store_root_key(c.keys.as_ref(), root_key.clone()).await?;
    let rewrapped = c.keys.rewrap_items_keys(id, &root_key).await?;
    c.keys
        .create_items_key(&root_key, input.shared_vault_uuid.clone())
        .await?;

    let password_type = new_params.password_type;
    let item = c
        .mutator
        .change_item(
            &vault.uuid,
            Box::new(move |item| {
                if let ItemContent::VaultListing(content) = &mut item.content {
                    content.root_key_params = new_params;
                }
            }),
        )
        .await?;

    info!(
        key_system_identifier = %id,
        password_type = ?password_type,
        rewrapped,
        "Rotated vault root key"
    );
    VaultListing::try_from(&item)
}
