//! Item index trait and in-memory implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::change::{ChangeKind, ChangeNotifier, ChangeSubscription, ItemChange};
use crate::item::{ContentType, DecryptedItem};
use keyvault_common::{Error, ItemId, KeySystemIdentifier, Result};

/// Read access to decrypted items.
#[async_trait]
pub trait ItemIndex: Send + Sync {
    /// All items of a content type, in insertion order.
    async fn items(&self, content_type: ContentType) -> Vec<DecryptedItem>;

    /// All items that belong to the given key system, in insertion order.
    async fn items_in_key_system(&self, key_system_identifier: &KeySystemIdentifier)
        -> Vec<DecryptedItem>;

    /// Look up an item by id.
    ///
    /// # Errors
    /// - `NotFound` if no item has this id
    async fn find_item(&self, uuid: &ItemId) -> Result<DecryptedItem>;

    /// Subscribe to mutations of the given content types.
    fn subscribe(&self, content_types: &[ContentType]) -> ChangeSubscription;
}

#[derive(Default)]
struct IndexState {
    order: Vec<ItemId>,
    items: HashMap<ItemId, DecryptedItem>,
}

/// In-memory item index.
///
/// Useful for testing and development. Updates keep an item's original
/// insertion position.
pub struct MemoryItemIndex {
    state: RwLock<IndexState>,
    notifier: ChangeNotifier,
}

impl MemoryItemIndex {
    /// Create an empty index with its own change feed.
    pub fn new() -> Self {
        Self::with_notifier(ChangeNotifier::default())
    }

    /// Create an empty index publishing on an existing change feed.
    pub fn with_notifier(notifier: ChangeNotifier) -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            notifier,
        }
    }

    /// The change feed this index publishes on.
    pub fn notifier(&self) -> ChangeNotifier {
        self.notifier.clone()
    }

    /// Insert or replace an item and announce it.
    pub async fn upsert(&self, item: DecryptedItem) {
        let change = {
            let mut state = self.state.write().await;
            let kind = if state.items.contains_key(&item.uuid) {
                ChangeKind::Changed
            } else {
                state.order.push(item.uuid);
                ChangeKind::Inserted
            };
            let change = ItemChange {
                content_type: item.content_type,
                kind,
                uuid: Some(item.uuid),
                key_system_identifier: item.key_system_identifier.clone(),
            };
            state.items.insert(item.uuid, item);
            change
        };
        self.notifier.publish(change);
    }

    /// Remove an item and announce it.
    ///
    /// # Errors
    /// - `NotFound` if no item has this id
    pub async fn remove(&self, uuid: &ItemId) -> Result<DecryptedItem> {
        let removed = {
            let mut state = self.state.write().await;
            let removed = state
                .items
                .remove(uuid)
                .ok_or_else(|| Error::NotFound(format!("Item {}", uuid)))?;
            state.order.retain(|id| id != uuid);
            removed
        };
        self.notifier.publish(ItemChange {
            content_type: removed.content_type,
            kind: ChangeKind::Removed,
            uuid: Some(removed.uuid),
            key_system_identifier: removed.key_system_identifier.clone(),
        });
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn collect<F>(&self, predicate: F) -> Vec<DecryptedItem>
    where
        F: Fn(&DecryptedItem) -> bool,
    {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.items.get(id))
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }
}

impl Default for MemoryItemIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemIndex for MemoryItemIndex {
    async fn items(&self, content_type: ContentType) -> Vec<DecryptedItem> {
        self.collect(|item| item.content_type == content_type).await
    }

    async fn items_in_key_system(
        &self,
        key_system_identifier: &KeySystemIdentifier,
    ) -> Vec<DecryptedItem> {
        self.collect(|item| item.key_system_identifier.as_ref() == Some(key_system_identifier))
            .await
    }

    async fn find_item(&self, uuid: &ItemId) -> Result<DecryptedItem> {
        self.state
            .read()
            .await
            .items
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Item {}", uuid)))
    }

    fn subscribe(&self, content_types: &[ContentType]) -> ChangeSubscription {
        self.notifier.subscribe(content_types)
    }
}
