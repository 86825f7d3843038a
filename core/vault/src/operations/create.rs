//! Vault creation.

use tracing::info;

use super::{store_root_key, Collaborators};
use keyvault_common::{Error, KeySystemIdentifier, Result, SensitiveBytes};
use keyvault_store::{
    DecryptedItem, ItemContent, KeyPasswordType, KeyStorageMode, VaultListing, VaultListingContent,
};

/// Input for [`create_vault`].
#[derive(Debug, Clone)]
pub struct CreateVaultInput {
    pub name: String,
    pub description: Option<String>,
    /// Present for `UserInputted` vaults; absent for `Randomized` ones.
    pub user_inputted_password: Option<SensitiveBytes>,
    pub storage_mode: KeyStorageMode,
}

/// Create a vault with a fresh key system.
///
/// # Preconditions
/// - `name` is not blank
/// - A supplied password is not empty
///
/// # Postconditions
/// - The root key is stored (persisted if `Synced`, held in memory otherwise)
/// - A primary items key wrapped by the root key exists
/// - The listing is committed last
///
/// # Errors
/// - `InvalidInput` for a blank name or empty password
/// - Key store and mutator failures
pub async fn create_vault(c: &Collaborators, input: CreateVaultInput) -> Result<VaultListing> {
    if input.name.trim().is_empty() {
        return Err(Error::InvalidInput("Vault name cannot be empty".to_string()));
    }
    if input
        .user_inputted_password
        .as_ref()
        .is_some_and(SensitiveBytes::is_empty)
    {
        return Err(Error::InvalidInput("Vault password cannot be empty".to_string()));
    }

    let key_system_identifier = KeySystemIdentifier::generate();
    let password_type = match input.user_inputted_password {
        Some(_) => KeyPasswordType::UserInputted,
        None => KeyPasswordType::Randomized,
    };
    let params = c.keys.create_root_key_params(&key_system_identifier, password_type);

    let root_key = match &input.user_inputted_password {
        Some(password) => {
            c.keys
                .derive_user_inputted_root_key(&params, password, input.storage_mode)
                .await?
        }
        None => c.keys.create_randomized_root_key(params, input.storage_mode),
    };
    let root_key_params = root_key.key_params.clone();

    store_root_key(c.keys.as_ref(), root_key.clone()).await?;
    c.keys.create_items_key(&root_key, None).await?;

    let content = VaultListingContent {
        key_system_identifier: key_system_identifier.clone(),
        name: input.name,
        description: input.description,
        key_storage_mode: input.storage_mode,
        root_key_params,
        sharing: None,
    };
    let item = c
        .mutator
        .insert_item(DecryptedItem::new(ItemContent::VaultListing(content)))
        .await?;

    info!(
        key_system_identifier = %key_system_identifier,
        password_type = ?password_type,
        storage_mode = ?input.storage_mode,
        "Vault created"
    );
    VaultListing::try_from(&item)
}
