//! File attachment re-encryption hooks.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::item::DecryptedItem;
use crate::listing::VaultListing;
use keyvault_common::{ItemId, KeySystemIdentifier, Result};

/// Re-encrypts file contents when a file item changes vault.
#[async_trait]
pub trait Files: Send + Sync {
    /// Re-encrypt the file's contents under the vault's items key.
    async fn move_file_to_vault(&self, file: &DecryptedItem, vault: &VaultListing) -> Result<()>;

    /// Re-encrypt the file's contents under the user's personal key.
    async fn move_file_out_of_vault(&self, file: &DecryptedItem) -> Result<()>;
}

/// A recorded file move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMove {
    IntoVault {
        file: ItemId,
        key_system_identifier: KeySystemIdentifier,
    },
    OutOfVault {
        file: ItemId,
    },
}

/// Files collaborator that records moves instead of touching storage.
#[derive(Default)]
pub struct MemoryFiles {
    moves: Mutex<Vec<FileMove>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves recorded so far, oldest first.
    pub async fn moves(&self) -> Vec<FileMove> {
        self.moves.lock().await.clone()
    }
}

#[async_trait]
impl Files for MemoryFiles {
    async fn move_file_to_vault(&self, file: &DecryptedItem, vault: &VaultListing) -> Result<()> {
        self.moves.lock().await.push(FileMove::IntoVault {
            file: file.uuid,
            key_system_identifier: vault.key_system_identifier().clone(),
        });
        Ok(())
    }

    async fn move_file_out_of_vault(&self, file: &DecryptedItem) -> Result<()> {
        self.moves
            .lock()
            .await
            .push(FileMove::OutOfVault { file: file.uuid });
        Ok(())
    }
}
