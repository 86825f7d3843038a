//! Shared setup for vault integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use keyvault_common::SensitiveBytes;
use keyvault_crypto::KdfParams;
use keyvault_store::{
    ChangeNotifier, DecryptedItem, IndexMutator, ItemIndex, KeyStorageMode, MemoryFiles,
    MemoryItemIndex, MemoryKeyStore, Mutator, VaultListing,
};
use keyvault_sync::{RecordingSynchronizer, SyncConfig, SyncScheduler, Synchronizer};
use keyvault_vault::{Collaborators, VaultEvent, VaultManager, VaultManagerConfig};
use tokio::sync::broadcast;

pub struct TestEnv {
    pub keys: Arc<MemoryKeyStore>,
    pub index: Arc<MemoryItemIndex>,
    pub mutator: Arc<IndexMutator>,
    pub files: Arc<MemoryFiles>,
    pub sync: Arc<RecordingSynchronizer>,
    pub manager: Arc<VaultManager>,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_config(VaultManagerConfig::default()).await
    }

    pub async fn with_config(config: VaultManagerConfig) -> Self {
        let sync = Arc::new(RecordingSynchronizer::new());
        Self::build(config, sync.clone(), sync).await
    }

    /// Environment whose manager syncs through a running [`SyncScheduler`].
    /// The worker pushes to `sync`, so injected failures reach the
    /// scheduler's retries.
    pub async fn scheduled(sync_config: &SyncConfig) -> (Self, SyncScheduler) {
        let transport = Arc::new(RecordingSynchronizer::new());
        let (scheduler, worker) = SyncScheduler::new(sync_config);

        let pushes = transport.clone();
        tokio::spawn(worker.run(move || {
            let pushes = pushes.clone();
            async move { pushes.sync().await.map(|()| 1) }
        }));

        let env = Self::build(
            VaultManagerConfig::default(),
            transport,
            Arc::new(scheduler.clone()),
        )
        .await;
        (env, scheduler)
    }

    async fn build(
        config: VaultManagerConfig,
        sync: Arc<RecordingSynchronizer>,
        synchronizer: Arc<dyn Synchronizer>,
    ) -> Self {
        let notifier = ChangeNotifier::default();
        let index = Arc::new(MemoryItemIndex::with_notifier(notifier.clone()));
        let keys = Arc::new(MemoryKeyStore::new(notifier, KdfParams::testing()));
        let mutator = Arc::new(IndexMutator::new(index.clone()));
        let files = Arc::new(MemoryFiles::new());

        let collaborators = Collaborators {
            keys: keys.clone(),
            index: index.clone(),
            mutator: mutator.clone(),
            files: files.clone(),
        };
        let manager = VaultManager::new(collaborators, synchronizer, config)
            .await
            .expect("manager starts");

        Self {
            keys,
            index,
            mutator,
            files,
            sync,
            manager,
        }
    }

    pub async fn password_vault(&self, name: &str, password: &str) -> VaultListing {
        self.manager
            .create_user_inputted_password_vault(
                name,
                None,
                SensitiveBytes::from(password),
                KeyStorageMode::Local,
            )
            .await
            .expect("vault created")
    }

    pub async fn randomized_vault(&self, name: &str, mode: KeyStorageMode) -> VaultListing {
        self.manager
            .create_randomized_vault(name, None, mode)
            .await
            .expect("vault created")
    }

    pub async fn note(&self, title: &str) -> DecryptedItem {
        self.mutator
            .insert_item(DecryptedItem::note(title, ""))
            .await
            .expect("note inserted")
    }

    pub async fn stored(&self, item: &DecryptedItem) -> DecryptedItem {
        self.index.find_item(&item.uuid).await.expect("item stored")
    }
}

pub async fn next_event(events: &mut broadcast::Receiver<VaultEvent>) -> VaultEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for vault event")
        .expect("event channel open")
}

/// Let the observer drain pending notifications.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
