//! In-memory key store.
//!
//! Root keys are kept per key system in intake order; the last one is
//! primary. Items keys are kept in creation order, each with its wrapped
//! form (sealed under a root key, bound to the key-system identifier) and,
//! when a matching root key is available, its decrypted material. An items
//! key without decrypted material is an errored payload until a root key
//! that opens it arrives.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::change::{ChangeKind, ChangeNotifier, ItemChange};
use crate::item::ContentType;
use crate::keys::{KeyStore, KeySystemItemsKey, KeySystemRootKey};
use crate::listing::{KeyPasswordType, KeyStorageMode, RootKeyParams, VaultListing};
use keyvault_common::{Error, ItemId, KeySystemIdentifier, Result, SensitiveBytes};
use keyvault_crypto::{derive_key, open, seal, KdfParams, KeyMaterial, Salt};

struct StoredItemsKey {
    uuid: ItemId,
    shared_vault_uuid: Option<String>,
    wrapped: Vec<u8>,
    decrypted: Option<KeyMaterial>,
}

#[derive(Default)]
struct KeyState {
    root_keys: HashMap<KeySystemIdentifier, Vec<KeySystemRootKey>>,
    items_keys: HashMap<KeySystemIdentifier, Vec<StoredItemsKey>>,
}

impl KeyState {
    /// Drop decrypted material of items keys that no remaining root key of
    /// the key system can open.
    fn relock_orphaned_items_keys(&mut self, id: &KeySystemIdentifier) -> usize {
        let roots: &[KeySystemRootKey] = self.root_keys.get(id).map(Vec::as_slice).unwrap_or(&[]);
        let Some(items_keys) = self.items_keys.get_mut(id) else {
            return 0;
        };

        let mut relocked = 0;
        for key in items_keys.iter_mut().filter(|key| key.decrypted.is_some()) {
            if unwrap_with_any(roots, &key.wrapped, id).is_none() {
                key.decrypted = None;
                relocked += 1;
            }
        }
        relocked
    }
}

fn unwrap_with_any(
    roots: &[KeySystemRootKey],
    wrapped: &[u8],
    id: &KeySystemIdentifier,
) -> Option<KeyMaterial> {
    roots.iter().rev().find_map(|root| {
        open(root.material(), wrapped, id.as_str().as_bytes())
            .ok()
            .and_then(|bytes| KeyMaterial::from_slice(&bytes).ok())
    })
}

/// Counts of key material held for one key system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyStoreSnapshot {
    pub persisted_root_keys: usize,
    pub non_persistent_root_keys: usize,
    pub decrypted_items_keys: usize,
    pub errored_items_keys: usize,
}

/// In-memory key store.
///
/// Useful for testing and development. "Persisted" root keys are simply
/// tagged `Synced`; nothing leaves the process.
pub struct MemoryKeyStore {
    state: RwLock<KeyState>,
    notifier: ChangeNotifier,
    kdf_params: KdfParams,
}

impl MemoryKeyStore {
    /// Create an empty key store announcing on `notifier`, deriving new
    /// user-inputted root keys with `kdf_params`.
    pub fn new(notifier: ChangeNotifier, kdf_params: KdfParams) -> Self {
        Self {
            state: RwLock::new(KeyState::default()),
            notifier,
            kdf_params,
        }
    }

    /// Key material counts for a key system.
    pub async fn snapshot(&self, id: &KeySystemIdentifier) -> KeyStoreSnapshot {
        let state = self.state.read().await;
        let mut snapshot = KeyStoreSnapshot::default();

        for root in state.root_keys.get(id).into_iter().flatten() {
            if root.storage_mode.is_non_persistent() {
                snapshot.non_persistent_root_keys += 1;
            } else {
                snapshot.persisted_root_keys += 1;
            }
        }
        for key in state.items_keys.get(id).into_iter().flatten() {
            if key.decrypted.is_some() {
                snapshot.decrypted_items_keys += 1;
            } else {
                snapshot.errored_items_keys += 1;
            }
        }
        snapshot
    }

    fn announce(&self, content_type: ContentType, kind: ChangeKind, id: &KeySystemIdentifier) {
        self.notifier.publish(ItemChange {
            content_type,
            kind,
            uuid: None,
            key_system_identifier: Some(id.clone()),
        });
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn primary_root_key(&self, id: &KeySystemIdentifier) -> Option<KeySystemRootKey> {
        self.state
            .read()
            .await
            .root_keys
            .get(id)
            .and_then(|keys| keys.last())
            .cloned()
    }

    async fn primary_items_key(&self, id: &KeySystemIdentifier) -> Option<KeySystemItemsKey> {
        let state = self.state.read().await;
        let primary = state.items_keys.get(id)?.iter().rev().find_map(|key| {
            key.decrypted.as_ref().map(|material| {
                KeySystemItemsKey::new(
                    key.uuid,
                    id.clone(),
                    key.shared_vault_uuid.clone(),
                    material.clone(),
                )
            })
        });
        primary
    }

    fn create_root_key_params(
        &self,
        id: &KeySystemIdentifier,
        password_type: KeyPasswordType,
    ) -> RootKeyParams {
        RootKeyParams {
            key_system_identifier: id.clone(),
            password_type,
            salt: Salt::generate(),
            kdf_params: self.kdf_params.clone(),
            created_at: Utc::now(),
        }
    }

    fn create_randomized_root_key(
        &self,
        params: RootKeyParams,
        storage_mode: KeyStorageMode,
    ) -> KeySystemRootKey {
        KeySystemRootKey::new(params, storage_mode, KeyMaterial::generate())
    }

    async fn derive_user_inputted_root_key(
        &self,
        params: &RootKeyParams,
        password: &SensitiveBytes,
        storage_mode: KeyStorageMode,
    ) -> Result<KeySystemRootKey> {
        if params.password_type != KeyPasswordType::UserInputted {
            return Err(Error::InvalidOperation(
                "Root key parameters are not for a user-inputted password".to_string(),
            ));
        }

        let salt = params.salt.clone();
        let kdf_params = params.kdf_params.clone();
        let password = password.clone();
        let material =
            tokio::task::spawn_blocking(move || derive_key(password.as_bytes(), &salt, &kdf_params))
                .await
                .map_err(|e| Error::Crypto(format!("Key derivation task failed: {}", e)))??;

        Ok(KeySystemRootKey::new(params.clone(), storage_mode, material))
    }

    async fn persist_root_key(&self, key: KeySystemRootKey) -> Result<()> {
        if key.storage_mode != KeyStorageMode::Synced {
            return Err(Error::InvalidOperation(format!(
                "Only synced root keys can be persisted, got {:?}",
                key.storage_mode
            )));
        }

        let id = key.key_system_identifier().clone();
        self.state
            .write()
            .await
            .root_keys
            .entry(id.clone())
            .or_default()
            .push(key);

        debug!(key_system_identifier = %id, "Persisted root key");
        self.announce(ContentType::KeySystemRootKey, ChangeKind::Inserted, &id);
        Ok(())
    }

    async fn remove_persisted_root_key(&self, id: &KeySystemIdentifier) -> Result<()> {
        let relocked = {
            let mut state = self.state.write().await;
            if let Some(keys) = state.root_keys.get_mut(id) {
                keys.retain(|key| key.storage_mode.is_non_persistent());
            }
            state.relock_orphaned_items_keys(id)
        };

        debug!(key_system_identifier = %id, relocked, "Removed persisted root key");
        self.announce(ContentType::KeySystemRootKey, ChangeKind::Removed, id);
        if relocked > 0 {
            self.announce(ContentType::KeySystemItemsKey, ChangeKind::Changed, id);
        }
        Ok(())
    }

    async fn intake_non_persistent_root_key(
        &self,
        key: KeySystemRootKey,
        mode: KeyStorageMode,
    ) -> Result<()> {
        if !mode.is_non_persistent() {
            return Err(Error::InvalidOperation(
                "Synced root keys must be persisted, not taken in".to_string(),
            ));
        }

        let id = key.key_system_identifier().clone();
        let key = key.with_storage_mode(mode);
        self.state
            .write()
            .await
            .root_keys
            .entry(id.clone())
            .or_default()
            .push(key);

        debug!(key_system_identifier = %id, mode = ?mode, "Took in non-persistent root key");
        self.announce(ContentType::KeySystemRootKey, ChangeKind::Inserted, &id);
        Ok(())
    }

    async fn undo_intake(&self, id: &KeySystemIdentifier) -> Result<()> {
        let relocked = {
            let mut state = self.state.write().await;
            let keys = state
                .root_keys
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("No root keys for {}", id)))?;
            let position = keys
                .iter()
                .rposition(|key| key.storage_mode.is_non_persistent())
                .ok_or_else(|| Error::NotFound(format!("No root key intake to undo for {}", id)))?;
            keys.remove(position);
            if keys.is_empty() {
                state.root_keys.remove(id);
            }
            state.relock_orphaned_items_keys(id)
        };

        debug!(key_system_identifier = %id, relocked, "Undid root key intake");
        self.announce(ContentType::KeySystemRootKey, ChangeKind::Removed, id);
        if relocked > 0 {
            self.announce(ContentType::KeySystemItemsKey, ChangeKind::Changed, id);
        }
        Ok(())
    }

    async fn create_items_key(
        &self,
        root_key: &KeySystemRootKey,
        shared_vault_uuid: Option<String>,
    ) -> Result<KeySystemItemsKey> {
        let id = root_key.key_system_identifier().clone();
        let material = KeyMaterial::generate();
        let wrapped = seal(root_key.material(), material.as_bytes(), id.as_str().as_bytes())?;
        let uuid = ItemId::new();

        self.state
            .write()
            .await
            .items_keys
            .entry(id.clone())
            .or_default()
            .push(StoredItemsKey {
                uuid,
                shared_vault_uuid: shared_vault_uuid.clone(),
                wrapped,
                decrypted: Some(material.clone()),
            });

        debug!(key_system_identifier = %id, uuid = %uuid, "Created items key");
        self.notifier.publish(ItemChange {
            content_type: ContentType::KeySystemItemsKey,
            kind: ChangeKind::Inserted,
            uuid: Some(uuid),
            key_system_identifier: Some(id.clone()),
        });
        Ok(KeySystemItemsKey::new(uuid, id, shared_vault_uuid, material))
    }

    async fn rewrap_items_keys(
        &self,
        id: &KeySystemIdentifier,
        root_key: &KeySystemRootKey,
    ) -> Result<usize> {
        let rewrapped = {
            let mut state = self.state.write().await;
            let mut rewrapped = 0;
            for key in state.items_keys.get_mut(id).into_iter().flatten() {
                if let Some(material) = &key.decrypted {
                    key.wrapped = seal(root_key.material(), material.as_bytes(), id.as_str().as_bytes())?;
                    rewrapped += 1;
                }
            }
            rewrapped
        };

        debug!(key_system_identifier = %id, rewrapped, "Re-wrapped items keys");
        if rewrapped > 0 {
            self.announce(ContentType::KeySystemItemsKey, ChangeKind::Changed, id);
        }
        Ok(rewrapped)
    }

    async fn clear_keys_for_vault(&self, vault: &VaultListing) -> Result<()> {
        let id = vault.key_system_identifier();
        let relocked = {
            let mut state = self.state.write().await;
            if let Some(keys) = state.root_keys.get_mut(id) {
                keys.retain(|key| !key.storage_mode.is_non_persistent());
                if keys.is_empty() {
                    state.root_keys.remove(id);
                }
            }
            state.relock_orphaned_items_keys(id)
        };

        info!(key_system_identifier = %id, relocked, "Cleared key material for vault");
        self.announce(ContentType::KeySystemRootKey, ChangeKind::Removed, id);
        if relocked > 0 {
            self.announce(ContentType::KeySystemItemsKey, ChangeKind::Changed, id);
        }
        Ok(())
    }

    async fn delete_keys_for_vault(&self, id: &KeySystemIdentifier) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.root_keys.remove(id);
            state.items_keys.remove(id);
        }

        info!(key_system_identifier = %id, "Deleted all keys for vault");
        self.announce(ContentType::KeySystemRootKey, ChangeKind::Removed, id);
        self.announce(ContentType::KeySystemItemsKey, ChangeKind::Removed, id);
        Ok(())
    }

    async fn decrypt_errored_payloads(&self) -> Result<usize> {
        let decrypted_per_system = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let mut decrypted_per_system = Vec::new();

            for (id, items_keys) in state.items_keys.iter_mut() {
                let roots: &[KeySystemRootKey] =
                    state.root_keys.get(id).map(Vec::as_slice).unwrap_or(&[]);
                if roots.is_empty() {
                    continue;
                }

                let mut decrypted = 0;
                for key in items_keys.iter_mut().filter(|key| key.decrypted.is_none()) {
                    if let Some(material) = unwrap_with_any(roots, &key.wrapped, id) {
                        key.decrypted = Some(material);
                        decrypted += 1;
                    }
                }
                if decrypted > 0 {
                    decrypted_per_system.push((id.clone(), decrypted));
                }
            }
            decrypted_per_system
        };

        let total = decrypted_per_system.iter().map(|(_, count)| count).sum();
        for (id, count) in &decrypted_per_system {
            debug!(key_system_identifier = %id, count, "Decrypted errored items keys");
            self.announce(ContentType::KeySystemItemsKey, ChangeKind::Changed, id);
        }
        Ok(total)
    }
}
