//! Fixtures shared by unit tests.

use std::sync::Arc;

use crate::config::VaultManagerConfig;
use crate::manager::VaultManager;
use crate::operations::{Collaborators, CreateVaultInput};
use keyvault_common::SensitiveBytes;
use keyvault_crypto::KdfParams;
use keyvault_store::{
    ChangeNotifier, DecryptedItem, IndexMutator, KeyStorageMode, MemoryFiles, MemoryItemIndex,
    MemoryKeyStore,
};
use keyvault_sync::RecordingSynchronizer;

/// In-memory collaborators wired to one change feed.
pub(crate) struct Harness {
    pub keys: Arc<MemoryKeyStore>,
    pub index: Arc<MemoryItemIndex>,
    pub files: Arc<MemoryFiles>,
    pub sync: Arc<RecordingSynchronizer>,
    pub collaborators: Collaborators,
}

impl Harness {
    pub fn new() -> Self {
        let notifier = ChangeNotifier::default();
        let index = Arc::new(MemoryItemIndex::with_notifier(notifier.clone()));
        let keys = Arc::new(MemoryKeyStore::new(notifier, KdfParams::testing()));
        let files = Arc::new(MemoryFiles::new());
        let mutator = Arc::new(IndexMutator::new(index.clone()));

        let collaborators = Collaborators {
            keys: keys.clone(),
            index: index.clone(),
            mutator,
            files: files.clone(),
        };

        Self {
            keys,
            index,
            files,
            sync: Arc::new(RecordingSynchronizer::new()),
            collaborators,
        }
    }

    pub async fn manager(&self) -> Arc<VaultManager> {
        self.manager_with(VaultManagerConfig::default()).await
    }

    pub async fn manager_with(&self, config: VaultManagerConfig) -> Arc<VaultManager> {
        VaultManager::new(self.collaborators.clone(), self.sync.clone(), config)
            .await
            .unwrap()
    }

    pub async fn insert(&self, item: DecryptedItem) -> DecryptedItem {
        self.collaborators.mutator.insert_item(item).await.unwrap()
    }
}

pub(crate) fn randomized(name: &str, storage_mode: KeyStorageMode) -> CreateVaultInput {
    CreateVaultInput {
        name: name.to_string(),
        description: None,
        user_inputted_password: None,
        storage_mode,
    }
}

pub(crate) fn user_inputted(
    name: &str,
    password: &str,
    storage_mode: KeyStorageMode,
) -> CreateVaultInput {
    CreateVaultInput {
        name: name.to_string(),
        description: None,
        user_inputted_password: Some(SensitiveBytes::from(password)),
        storage_mode,
    }
}
