//! Changing a vault's password type and key storage mode.

use tracing::info;

use super::rotate::{rotate_root_key, RotateRootKeyInput};
use super::Collaborators;
use keyvault_common::{Error, Result, SensitiveBytes};
use keyvault_store::{ItemContent, KeyPasswordType, KeyStorageMode, VaultListing};

/// Password type a vault switches to.
#[derive(Debug, Clone)]
pub enum NewPasswordType {
    Randomized,
    UserInputted { password: SensitiveBytes },
}

impl NewPasswordType {
    pub fn password_type(&self) -> KeyPasswordType {
        match self {
            NewPasswordType::Randomized => KeyPasswordType::Randomized,
            NewPasswordType::UserInputted { .. } => KeyPasswordType::UserInputted,
        }
    }

    fn into_password(self) -> Option<SensitiveBytes> {
        match self {
            NewPasswordType::Randomized => None,
            NewPasswordType::UserInputted { password } => Some(password),
        }
    }
}

/// Requested key option changes for a vault. At least one must be set.
#[derive(Debug, Clone)]
pub struct ChangeVaultKeyOptions {
    pub vault: VaultListing,
    pub new_password_type: Option<NewPasswordType>,
    pub new_storage_mode: Option<KeyStorageMode>,
}

fn validate(options: &ChangeVaultKeyOptions) -> Result<()> {
    let vault = &options.vault;

    if options.new_password_type.is_none() && options.new_storage_mode.is_none() {
        return Err(Error::InvalidInput("No key option change requested".to_string()));
    }
    if let Some(new_type) = &options.new_password_type {
        if new_type.password_type() == vault.key_password_type() {
            return Err(Error::InvalidOperation(format!(
                "Vault '{}' already uses password type {:?}",
                vault.name(),
                vault.key_password_type()
            )));
        }
    }
    if let Some(mode) = options.new_storage_mode {
        if mode == vault.key_storage_mode() {
            return Err(Error::InvalidOperation(format!(
                "Vault '{}' already uses storage mode {:?}",
                vault.name(),
                mode
            )));
        }
        if vault.is_shared_vault_listing() && mode.is_non_persistent() {
            return Err(Error::InvalidOperation(format!(
                "Shared vault '{}' must keep a synced root key",
                vault.name()
            )));
        }
    }
    Ok(())
}

/// Switch a vault's password type and/or key storage mode.
///
/// A password type change rotates the root key, storing the new one under
/// the target storage mode. A storage mode change alone re-stores the
/// current root key under the new mode. Leaving `Synced` drops the
/// persisted copy. The listing is updated last.
///
/// # Errors
/// - `InvalidInput` if nothing is requested
/// - `InvalidOperation` if a requested value is already in effect, or a
///   shared vault would leave `Synced`
/// - `LockedVault` if the current root key is not available
pub async fn change_vault_key_options(
    c: &Collaborators,
    options: ChangeVaultKeyOptions,
) -> Result<VaultListing> {
    validate(&options)?;

    let ChangeVaultKeyOptions {
        vault,
        new_password_type,
        new_storage_mode,
    } = options;
    let id = vault.key_system_identifier().clone();
    let current_mode = vault.key_storage_mode();
    let target_mode = new_storage_mode.unwrap_or(current_mode);

    let Some(root_key) = c.keys.primary_root_key(&id).await else {
        return Err(Error::LockedVault(vault.name().to_string()));
    };

    let mut updated = vault.clone();
    if let Some(new_type) = new_password_type {
        let mut rotating = vault.clone();
        rotating.content.key_storage_mode = target_mode;
        updated = rotate_root_key(
            c,
            RotateRootKeyInput {
                vault: rotating,
                shared_vault_uuid: vault.shared_vault_uuid().map(str::to_string),
                user_inputted_password: new_type.into_password(),
            },
        )
        .await?;
    } else if target_mode.is_non_persistent() {
        c.keys
            .intake_non_persistent_root_key(root_key, target_mode)
            .await?;
    } else {
        c.keys
            .persist_root_key(root_key.with_storage_mode(KeyStorageMode::Synced))
            .await?;
    }

    if target_mode != current_mode {
        if current_mode == KeyStorageMode::Synced {
            c.keys.remove_persisted_root_key(&id).await?;
        }
        let item = c
            .mutator
            .change_item(
                &vault.uuid,
                Box::new(move |item| {
                    if let ItemContent::VaultListing(content) = &mut item.content {
                        content.key_storage_mode = target_mode;
                    }
                }),
            )
            .await?;
        updated = VaultListing::try_from(&item)?;
    }

    info!(
        key_system_identifier = %id,
        password_type = ?updated.key_password_type(),
        storage_mode = ?updated.key_storage_mode(),
        "Changed vault key options"
    );
    Ok(updated)
}
