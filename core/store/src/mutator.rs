//! Item mutation pipeline.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::index::{ItemIndex, MemoryItemIndex};
use crate::item::DecryptedItem;
use keyvault_common::{Error, ItemId, Result};

/// A field-level change applied to an item.
pub type ItemMutation = Box<dyn FnOnce(&mut DecryptedItem) + Send>;

/// Commits new item versions.
#[async_trait]
pub trait Mutator: Send + Sync {
    /// Commit a new item.
    ///
    /// # Errors
    /// - `AlreadyExists` if an item with the same id is present
    async fn insert_item(&self, item: DecryptedItem) -> Result<DecryptedItem>;

    /// Apply `mutation` to the current version of an item and commit the
    /// result as a new version.
    ///
    /// # Errors
    /// - `NotFound` if the item does not exist
    /// - `InvalidInput` if the mutation changes the item's identity
    async fn change_item(&self, uuid: &ItemId, mutation: ItemMutation) -> Result<DecryptedItem>;

    /// Remove an item.
    async fn delete_item(&self, uuid: &ItemId) -> Result<()>;
}

/// Mutator committing straight into a [`MemoryItemIndex`].
pub struct IndexMutator {
    index: Arc<MemoryItemIndex>,
}

impl IndexMutator {
    pub fn new(index: Arc<MemoryItemIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Mutator for IndexMutator {
    async fn insert_item(&self, mut item: DecryptedItem) -> Result<DecryptedItem> {
        if self.index.find_item(&item.uuid).await.is_ok() {
            return Err(Error::AlreadyExists(format!("Item {}", item.uuid)));
        }
        item.version = 1;
        item.updated_at = Utc::now();
        self.index.upsert(item.clone()).await;
        debug!(uuid = %item.uuid, content_type = ?item.content_type, "Item inserted");
        Ok(item)
    }

    async fn change_item(&self, uuid: &ItemId, mutation: ItemMutation) -> Result<DecryptedItem> {
        let current = self.index.find_item(uuid).await?;
        let mut next = current.clone();
        mutation(&mut next);

        if next.uuid != current.uuid || next.content_type != current.content_type {
            return Err(Error::InvalidInput(format!(
                "Mutation may not change the identity of item {}",
                uuid
            )));
        }

        next.version = current.version + 1;
        next.updated_at = Utc::now();
        self.index.upsert(next.clone()).await;
        debug!(uuid = %uuid, version = next.version, "Item changed");
        Ok(next)
    }

    async fn delete_item(&self, uuid: &ItemId) -> Result<()> {
        self.index.remove(uuid).await?;
        debug!(uuid = %uuid, "Item deleted");
        Ok(())
    }
}
