//! Key-system key types and the key store interface.

use async_trait::async_trait;

use crate::listing::{KeyPasswordType, KeyStorageMode, RootKeyParams, VaultListing};
use keyvault_common::{ItemId, KeySystemIdentifier, Result, SensitiveBytes};
use keyvault_crypto::KeyMaterial;

/// Root secret of a key system.
///
/// Debug output never includes the key material.
#[derive(Debug, Clone)]
pub struct KeySystemRootKey {
    pub key_params: RootKeyParams,
    pub storage_mode: KeyStorageMode,
    material: KeyMaterial,
}

impl KeySystemRootKey {
    pub fn new(key_params: RootKeyParams, storage_mode: KeyStorageMode, material: KeyMaterial) -> Self {
        Self {
            key_params,
            storage_mode,
            material,
        }
    }

    pub fn key_system_identifier(&self) -> &KeySystemIdentifier {
        &self.key_params.key_system_identifier
    }

    pub fn password_type(&self) -> KeyPasswordType {
        self.key_params.password_type
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Same key material, held under a different storage mode.
    pub fn with_storage_mode(&self, storage_mode: KeyStorageMode) -> Self {
        Self {
            key_params: self.key_params.clone(),
            storage_mode,
            material: self.material.clone(),
        }
    }
}

/// Symmetric key encrypting the items of one key system.
#[derive(Debug, Clone)]
pub struct KeySystemItemsKey {
    pub uuid: ItemId,
    pub key_system_identifier: KeySystemIdentifier,
    pub shared_vault_uuid: Option<String>,
    material: KeyMaterial,
}

impl KeySystemItemsKey {
    pub fn new(
        uuid: ItemId,
        key_system_identifier: KeySystemIdentifier,
        shared_vault_uuid: Option<String>,
        material: KeyMaterial,
    ) -> Self {
        Self {
            uuid,
            key_system_identifier,
            shared_vault_uuid,
            material,
        }
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }
}

/// Holds decrypted key-system key material.
///
/// Implementations announce root and items key mutations on the change
/// feed with content types `KeySystemRootKey` / `KeySystemItemsKey`.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Most recent root key available for the key system.
    async fn primary_root_key(&self, id: &KeySystemIdentifier) -> Option<KeySystemRootKey>;

    /// Most recent decrypted items key for the key system.
    async fn primary_items_key(&self, id: &KeySystemIdentifier) -> Option<KeySystemItemsKey>;

    /// Fresh public parameters for a new root key.
    fn create_root_key_params(
        &self,
        id: &KeySystemIdentifier,
        password_type: KeyPasswordType,
    ) -> RootKeyParams;

    /// Generate a random root key. Nothing is stored.
    fn create_randomized_root_key(
        &self,
        params: RootKeyParams,
        storage_mode: KeyStorageMode,
    ) -> KeySystemRootKey;

    /// Derive a root key from a password and public parameters. Nothing is
    /// stored.
    async fn derive_user_inputted_root_key(
        &self,
        params: &RootKeyParams,
        password: &SensitiveBytes,
        storage_mode: KeyStorageMode,
    ) -> Result<KeySystemRootKey>;

    /// Store a root key as persisted, synchronized key material.
    async fn persist_root_key(&self, key: KeySystemRootKey) -> Result<()>;

    /// Drop the persisted copies of a key system's root key.
    async fn remove_persisted_root_key(&self, id: &KeySystemIdentifier) -> Result<()>;

    /// Hold a root key in memory only, under a non-persistent mode.
    ///
    /// # Errors
    /// - `InvalidOperation` if `mode` is `Synced`
    async fn intake_non_persistent_root_key(
        &self,
        key: KeySystemRootKey,
        mode: KeyStorageMode,
    ) -> Result<()>;

    /// Revert the most recent non-persistent intake for the key system,
    /// restoring the key store to its state before that intake.
    async fn undo_intake(&self, id: &KeySystemIdentifier) -> Result<()>;

    /// Create a new items key wrapped by `root_key`; it becomes primary.
    async fn create_items_key(
        &self,
        root_key: &KeySystemRootKey,
        shared_vault_uuid: Option<String>,
    ) -> Result<KeySystemItemsKey>;

    /// Re-wrap every decrypted items key of the key system under `root_key`.
    /// Returns the number of keys re-wrapped.
    async fn rewrap_items_keys(
        &self,
        id: &KeySystemIdentifier,
        root_key: &KeySystemRootKey,
    ) -> Result<usize>;

    /// Drop in-memory key material for a vault. Persisted root keys and
    /// wrapped items keys stay behind as encrypted payloads.
    async fn clear_keys_for_vault(&self, vault: &VaultListing) -> Result<()>;

    /// Permanently remove every key of the key system.
    async fn delete_keys_for_vault(&self, id: &KeySystemIdentifier) -> Result<()>;

    /// Retry decrypting wrapped items keys that previously had no matching
    /// root key. Returns the number of keys decrypted.
    async fn decrypt_errored_payloads(&self) -> Result<usize>;
}
