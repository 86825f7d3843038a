//! Vault manager: the public vault API and the lock-state cache owner.

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock, Weak};

use icu_collator::{Collator, CollatorOptions};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::config::VaultManagerConfig;
use crate::events::VaultEvent;
use crate::lock_cache::{LockCache, LockState};
use crate::operations::{
    self, ChangeVaultKeyOptions, Collaborators, CreateVaultInput, RotateRootKeyInput,
};
use keyvault_common::{Error, KeySystemIdentifier, Result, SensitiveBytes};
use keyvault_store::{
    ChangeSubscription, ContentType, DecryptedItem, ItemContent, KeyPasswordType, KeyStorageMode,
    Notification, VaultListing,
};
use keyvault_sync::Synchronizer;

/// Content types whose mutations can change a vault's lock state.
const OBSERVED_CONTENT_TYPES: [ContentType; 3] = [
    ContentType::KeySystemItemsKey,
    ContentType::KeySystemRootKey,
    ContentType::VaultListing,
];

thread_local! {
    static NAME_COLLATOR: Option<Collator> =
        Collator::try_new(&Default::default(), CollatorOptions::new()).ok();
}

/// Order vault names with root-locale collation: accents and case only
/// break ties between equal base letters, and lowercase sorts first.
/// Falls back to code point order if no collation data is available.
pub(crate) fn compare_vault_names(a: &str, b: &str) -> Ordering {
    NAME_COLLATOR.with(|collator| match collator {
        Some(collator) => collator.compare(a, b),
        None => a.cmp(b),
    })
}

/// Vault manager.
///
/// Checks lock and ownership preconditions, runs the vault use cases,
/// synchronizes after every successful mutation and broadcasts
/// [`VaultEvent`]s. A background observer recomputes lock states whenever
/// key material or vault listings change; it stops when the manager is
/// dropped or [`shutdown`](Self::shutdown) is called.
pub struct VaultManager {
    collaborators: Collaborators,
    synchronizer: Arc<dyn Synchronizer>,
    config: VaultManagerConfig,
    locks: LockCache,
    events: broadcast::Sender<VaultEvent>,
    observer: OnceLock<AbortHandle>,
}

impl VaultManager {
    /// Create a manager and start its observer.
    ///
    /// # Postconditions
    /// - The lock state of every existing vault has been computed
    /// - Later key and listing mutations trigger a recompute
    ///
    /// # Errors
    /// - Failures listing the existing vaults
    pub async fn new(
        collaborators: Collaborators,
        synchronizer: Arc<dyn Synchronizer>,
        config: VaultManagerConfig,
    ) -> Result<Arc<Self>> {
        let locks = LockCache::new(LockState::from_locked(config.assume_locked_until_computed));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let manager = Arc::new(Self {
            collaborators,
            synchronizer,
            config,
            locks,
            events,
            observer: OnceLock::new(),
        });

        // Subscribe first so nothing committed during the initial pass is missed.
        let subscription = manager
            .collaborators
            .index
            .subscribe(&OBSERVED_CONTENT_TYPES);
        manager.recompute_all_vaults_locking_state().await?;

        let task = tokio::spawn(Self::observe(Arc::downgrade(&manager), subscription));
        let _ = manager.observer.set(task.abort_handle());

        info!(
            vaults = manager.locks.len(),
            fail_closed = manager.config.assume_locked_until_computed,
            "Vault manager started"
        );
        Ok(manager)
    }

    async fn observe(manager: Weak<Self>, mut subscription: ChangeSubscription) {
        while let Some(notification) = subscription.recv().await {
            let Some(manager) = manager.upgrade() else {
                break;
            };

            match notification {
                Notification::Change(change) => {
                    debug!(content_type = ?change.content_type, kind = ?change.kind, "Recomputing vault lock states");
                }
                Notification::Missed(missed) => {
                    warn!(missed, "Vault observer fell behind, recomputing all lock states");
                }
            }

            if let Err(e) = manager.recompute_all_vaults_locking_state().await {
                warn!(error = %e, "Failed to recompute vault lock states");
            }
        }
        debug!("Vault observer stopped");
    }

    /// Stop the background observer. Lock states are no longer refreshed
    /// automatically afterwards.
    pub fn shutdown(&self) {
        if let Some(observer) = self.observer.get() {
            observer.abort();
        }
    }

    /// Receive lifecycle events emitted from now on.
    ///
    /// Besides explicit locks, unlocks and rotations, a vault's first
    /// computed state is reported when it differs from the default posture.
    /// With the fail-closed default every vault created unlocked therefore
    /// produces one [`VaultEvent::Unlocked`].
    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &VaultManagerConfig {
        &self.config
    }

    fn emit(&self, event: VaultEvent) {
        debug!(
            key_system_identifier = %event.vault().key_system_identifier(),
            event = event.kind(),
            "Vault event"
        );
        let _ = self.events.send(event);
    }

    async fn sync(&self) -> Result<()> {
        self.synchronizer.sync().await
    }

    /// All vaults ordered by name.
    pub async fn vaults(&self) -> Result<Vec<VaultListing>> {
        let mut vaults = operations::list_vaults(self.collaborators.index.as_ref()).await?;
        vaults.sort_by(|a, b| compare_vault_names(a.name(), b.name()));
        Ok(vaults)
    }

    /// Vaults whose cached state is locked, ordered by name.
    pub async fn locked_vaults(&self) -> Result<Vec<VaultListing>> {
        Ok(self
            .vaults()
            .await?
            .into_iter()
            .filter(|vault| self.is_vault_locked(vault))
            .collect())
    }

    pub async fn vault(&self, id: &KeySystemIdentifier) -> Result<Option<VaultListing>> {
        operations::get_vault(self.collaborators.index.as_ref(), id).await
    }

    /// # Errors
    /// - `NotFound` if no vault uses this key system
    pub async fn vault_or_fail(&self, id: &KeySystemIdentifier) -> Result<VaultListing> {
        self.vault(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Vault {}", id)))
    }

    /// Cached lock state. Vaults never computed report the configured
    /// default posture.
    pub fn is_vault_locked(&self, vault: &VaultListing) -> bool {
        self.locks.state(vault.key_system_identifier()).is_locked()
    }

    pub fn is_item_in_vault(&self, item: &DecryptedItem) -> bool {
        item.is_in_vault()
    }

    /// The vault an item belongs to, if any.
    pub async fn item_vault(&self, item: &DecryptedItem) -> Result<Option<VaultListing>> {
        match &item.key_system_identifier {
            Some(id) => self.vault(id).await,
            None => Ok(None),
        }
    }

    /// Derive a vault's lock state from the key store: unlocked iff both
    /// its root key and a primary items key are present.
    pub async fn compute_vault_lock_state(&self, vault: &VaultListing) -> LockState {
        let keys = &self.collaborators.keys;
        let id = vault.key_system_identifier();

        let has_root_key = keys.primary_root_key(id).await.is_some();
        let has_items_key = keys.primary_items_key(id).await.is_some();
        LockState::from_locked(!(has_root_key && has_items_key))
    }

    /// Cache a computed state, emitting an event when it differs from the
    /// effective cached one. Callers hold the vault's guard.
    fn record_lock_state(&self, vault: &VaultListing, state: LockState) {
        let previous = self
            .locks
            .set(vault.key_system_identifier(), state)
            .unwrap_or(self.locks.default_state());

        if previous != state {
            debug!(key_system_identifier = %vault.key_system_identifier(), state = ?state, "Vault lock state changed");
            self.emit(match state {
                LockState::Locked => VaultEvent::Locked(vault.clone()),
                LockState::Unlocked => VaultEvent::Unlocked(vault.clone()),
            });
        }
    }

    /// Recompute one vault under its guard. The listing is read again once
    /// the guard is held, so a vault deleted meanwhile is skipped.
    async fn refresh_lock_state(&self, id: &KeySystemIdentifier) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let Some(vault) = self.vault(id).await? else {
            debug!(key_system_identifier = %id, "Vault gone, lock state not recorded");
            return Ok(());
        };
        let state = self.compute_vault_lock_state(&vault).await;
        self.record_lock_state(&vault, state);
        Ok(())
    }

    /// Recompute and cache the lock state of every vault, emitting events
    /// for transitions.
    pub async fn recompute_all_vaults_locking_state(&self) -> Result<()> {
        for vault in operations::list_vaults(self.collaborators.index.as_ref()).await? {
            self.refresh_lock_state(vault.key_system_identifier()).await?;
        }
        Ok(())
    }

    /// Drop a non-synced vault's key material from memory.
    ///
    /// # Errors
    /// - `InvalidOperation` if the vault's root key is `Synced`
    pub async fn lock_non_persistent_vault(&self, vault: &VaultListing) -> Result<()> {
        if vault.key_storage_mode() == KeyStorageMode::Synced {
            return Err(Error::InvalidOperation(format!(
                "Vault '{}' has a synced root key and cannot be locked",
                vault.name()
            )));
        }

        let id = vault.key_system_identifier();
        let _guard = self.locks.acquire(id).await;
        self.collaborators.keys.clear_keys_for_vault(vault).await?;
        self.locks.set(id, LockState::Locked);
        self.emit(VaultEvent::Locked(vault.clone()));

        info!(key_system_identifier = %id, "Vault locked");
        Ok(())
    }

    /// Try to unlock a non-synced, password-protected vault.
    ///
    /// Returns `false` for a wrong password, leaving the key store as it
    /// was. Unlocking a vault that is already unlocked is a no-op returning
    /// `true`.
    ///
    /// # Errors
    /// - `InvalidOperation` if the vault is not `UserInputted` or is `Synced`
    /// - `InvalidInput` for an empty password
    pub async fn unlock_non_persistent_vault(
        &self,
        vault: &VaultListing,
        password: &SensitiveBytes,
    ) -> Result<bool> {
        if vault.key_password_type() != KeyPasswordType::UserInputted {
            return Err(Error::InvalidOperation(format!(
                "Vault '{}' has no user password",
                vault.name()
            )));
        }
        let mode = vault.key_storage_mode();
        if mode == KeyStorageMode::Synced {
            return Err(Error::InvalidOperation(format!(
                "Vault '{}' has a synced root key and is never locked",
                vault.name()
            )));
        }
        if password.is_empty() {
            return Err(Error::InvalidInput("Vault password cannot be empty".to_string()));
        }

        let id = vault.key_system_identifier();
        let keys = &self.collaborators.keys;
        let _guard = self.locks.acquire(id).await;

        if self.compute_vault_lock_state(vault).await == LockState::Unlocked {
            self.record_lock_state(vault, LockState::Unlocked);
            debug!(key_system_identifier = %id, "Vault already unlocked");
            return Ok(true);
        }

        let candidate = keys
            .derive_user_inputted_root_key(vault.root_key_params(), password, mode)
            .await?;
        keys.intake_non_persistent_root_key(candidate, mode).await?;
        keys.decrypt_errored_payloads().await?;

        if self.compute_vault_lock_state(vault).await.is_locked() {
            keys.undo_intake(id).await?;
            info!(key_system_identifier = %id, "Vault unlock rejected");
            return Ok(false);
        }

        self.locks.set(id, LockState::Unlocked);
        self.emit(VaultEvent::Unlocked(vault.clone()));
        info!(key_system_identifier = %id, "Vault unlocked");
        Ok(true)
    }

    /// Create a vault whose root key is generated randomly.
    ///
    /// The new vault's lock state is computed before returning. Under the
    /// fail-closed default this broadcasts [`VaultEvent::Unlocked`] for it.
    pub async fn create_randomized_vault(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        storage_mode: KeyStorageMode,
    ) -> Result<VaultListing> {
        self.create_vault(CreateVaultInput {
            name: name.into(),
            description,
            user_inputted_password: None,
            storage_mode,
        })
        .await
    }

    /// Create a vault whose root key is derived from a user password.
    ///
    /// Emits the same first-state event as
    /// [`create_randomized_vault`](Self::create_randomized_vault).
    pub async fn create_user_inputted_password_vault(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        password: SensitiveBytes,
        storage_mode: KeyStorageMode,
    ) -> Result<VaultListing> {
        self.create_vault(CreateVaultInput {
            name: name.into(),
            description,
            user_inputted_password: Some(password),
            storage_mode,
        })
        .await
    }

    async fn create_vault(&self, input: CreateVaultInput) -> Result<VaultListing> {
        let vault = operations::create_vault(&self.collaborators, input).await?;
        self.refresh_lock_state(vault.key_system_identifier()).await?;
        self.sync().await?;
        Ok(vault)
    }

    /// Delete a personal vault.
    ///
    /// Returns `false` when deletion failed; the failure is logged.
    ///
    /// # Errors
    /// - `WrongVaultKind` for shared vaults
    /// - Sync failures after a successful deletion
    pub async fn delete_vault(&self, vault: &VaultListing) -> Result<bool> {
        Self::ensure_personal(vault, "deleted")?;

        let id = vault.key_system_identifier();
        let deleted = {
            let _guard = self.locks.acquire(id).await;
            let deleted = operations::delete_vault(&self.collaborators, vault).await;
            if deleted.is_ok() {
                self.locks.forget(id);
            }
            deleted
        };

        if let Err(e) = deleted {
            warn!(key_system_identifier = %id, error = %e, "Vault deletion failed");
            return Ok(false);
        }

        self.sync().await?;
        Ok(true)
    }

    /// Rename a personal vault and replace its description. Allowed while
    /// locked.
    ///
    /// # Errors
    /// - `WrongVaultKind` for shared vaults
    /// - `InvalidInput` for a blank name
    pub async fn change_vault_name_and_description(
        &self,
        vault: &VaultListing,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<VaultListing> {
        Self::ensure_personal(vault, "renamed")?;
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("Vault name cannot be empty".to_string()));
        }

        let item = self
            .collaborators
            .mutator
            .change_item(
                &vault.uuid,
                Box::new(move |item| {
                    if let ItemContent::VaultListing(content) = &mut item.content {
                        content.name = name;
                        content.description = description;
                    }
                }),
            )
            .await?;

        self.sync().await?;
        VaultListing::try_from(&item)
    }

    /// Rotate the root key of a vault with a randomized password.
    ///
    /// # Errors
    /// - `LockedVault` if the vault is locked
    /// - `InvalidOperation` for password-protected vaults; use
    ///   [`rotate_vault_root_key_with_password`](Self::rotate_vault_root_key_with_password)
    pub async fn rotate_vault_root_key(&self, vault: &VaultListing) -> Result<VaultListing> {
        self.ensure_unlocked(vault)?;
        if vault.key_password_type() == KeyPasswordType::UserInputted {
            return Err(Error::InvalidOperation(format!(
                "Vault '{}' needs its password to rotate the root key",
                vault.name()
            )));
        }
        self.rotate(vault, None).await
    }

    /// Rotate the root key of a password-protected vault, deriving the new
    /// root key from `password`.
    ///
    /// # Errors
    /// - `LockedVault` if the vault is locked
    /// - `InvalidOperation` for randomized vaults
    pub async fn rotate_vault_root_key_with_password(
        &self,
        vault: &VaultListing,
        password: SensitiveBytes,
    ) -> Result<VaultListing> {
        self.ensure_unlocked(vault)?;
        if vault.key_password_type() != KeyPasswordType::UserInputted {
            return Err(Error::InvalidOperation(format!(
                "Vault '{}' has no user password; change its options instead",
                vault.name()
            )));
        }
        self.rotate(vault, Some(password)).await
    }

    async fn rotate(
        &self,
        vault: &VaultListing,
        user_inputted_password: Option<SensitiveBytes>,
    ) -> Result<VaultListing> {
        let rotated = {
            let _guard = self.locks.acquire(vault.key_system_identifier()).await;
            let rotated = operations::rotate_root_key(
                &self.collaborators,
                RotateRootKeyInput {
                    vault: vault.clone(),
                    shared_vault_uuid: vault.shared_vault_uuid().map(str::to_string),
                    user_inputted_password,
                },
            )
            .await?;
            let state = self.compute_vault_lock_state(&rotated).await;
            self.record_lock_state(&rotated, state);
            rotated
        };

        self.emit(VaultEvent::RootKeyRotated(rotated.clone()));
        self.sync().await?;
        Ok(rotated)
    }

    /// Change a personal vault's password type and/or key storage mode.
    ///
    /// Emits [`VaultEvent::RootKeyRotated`] when the password type changes.
    ///
    /// # Errors
    /// - `WrongVaultKind` for shared vaults
    /// - `LockedVault` if the vault is locked
    /// - Validation errors of the change
    pub async fn change_vault_options(&self, options: ChangeVaultKeyOptions) -> Result<VaultListing> {
        Self::ensure_personal(&options.vault, "reconfigured")?;
        self.ensure_unlocked(&options.vault)?;
        let rotates = options.new_password_type.is_some();

        let updated = {
            let _guard = self.locks.acquire(options.vault.key_system_identifier()).await;
            let updated = operations::change_vault_key_options(&self.collaborators, options).await?;
            let state = self.compute_vault_lock_state(&updated).await;
            self.record_lock_state(&updated, state);
            updated
        };

        if rotates {
            self.emit(VaultEvent::RootKeyRotated(updated.clone()));
        }
        self.sync().await?;
        Ok(updated)
    }

    /// Move an item into a vault, taking it out of its current vault first.
    ///
    /// # Errors
    /// - `LockedVault` if the target vault, or the item's current vault, is
    ///   locked. Checked before anything changes.
    pub async fn add_item_to_vault(
        &self,
        vault: &VaultListing,
        item: &DecryptedItem,
    ) -> Result<DecryptedItem> {
        self.ensure_unlocked(vault)?;

        let index = &self.collaborators.index;
        let mut current = index.find_item(&item.uuid).await?;
        let target = vault.key_system_identifier();

        match current.key_system_identifier.clone() {
            Some(id) if &id == target => return Ok(current),
            Some(id) => {
                if let Some(source) = self.vault(&id).await? {
                    self.ensure_unlocked(&source)?;
                }
                current = operations::remove_item_from_vault(&self.collaborators, &current).await?;
            }
            None => {}
        }

        operations::add_items_to_vault(&self.collaborators, vault, std::slice::from_ref(&current))
            .await?;
        self.sync().await?;
        index.find_item(&item.uuid).await
    }

    /// Move an item out of its vault.
    ///
    /// # Errors
    /// - `NotInVault` if the item has no vault
    /// - `LockedVault` if its vault is locked
    pub async fn remove_item_from_vault(&self, item: &DecryptedItem) -> Result<DecryptedItem> {
        let index = &self.collaborators.index;
        let current = index.find_item(&item.uuid).await?;

        let Some(id) = &current.key_system_identifier else {
            return Err(Error::NotInVault(current.uuid.to_string()));
        };
        if let Some(vault) = self.vault(id).await? {
            self.ensure_unlocked(&vault)?;
        }

        operations::remove_item_from_vault(&self.collaborators, &current).await?;
        self.sync().await?;
        index.find_item(&item.uuid).await
    }

    fn ensure_personal(vault: &VaultListing, action: &str) -> Result<()> {
        if vault.is_shared_vault_listing() {
            return Err(Error::WrongVaultKind(format!(
                "Shared vault '{}' must be {} through its shared vault",
                vault.name(),
                action
            )));
        }
        Ok(())
    }

    fn ensure_unlocked(&self, vault: &VaultListing) -> Result<()> {
        if self.is_vault_locked(vault) {
            return Err(Error::LockedVault(vault.name().to_string()));
        }
        Ok(())
    }
}

impl Drop for VaultManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
