//! Item and key storage for Keyvault.
//!
//! This module defines the collaborator interfaces the vault manager is
//! built on, together with in-memory implementations:
//! - [`KeyStore`]: root and items key material per key system
//! - [`ItemIndex`]: decrypted items, queryable by content type and id
//! - [`Mutator`]: commits new item versions
//! - [`Files`]: re-encrypts file attachments when items change vault
//!
//! Mutations are announced on a [`ChangeNotifier`] so observers can react
//! to key material appearing or disappearing.

pub mod change;
pub mod files;
pub mod index;
pub mod item;
pub mod keys;
pub mod listing;
pub mod memory_keys;
pub mod mutator;

pub use change::{ChangeKind, ChangeNotifier, ChangeSubscription, ItemChange, Notification};
pub use files::{FileMove, Files, MemoryFiles};
pub use index::{ItemIndex, MemoryItemIndex};
pub use item::{ContentType, DecryptedItem, ItemContent};
pub use keys::{KeyStore, KeySystemItemsKey, KeySystemRootKey};
pub use listing::{
    KeyPasswordType, KeyStorageMode, RootKeyParams, VaultListing, VaultListingContent,
    VaultSharing,
};
pub use memory_keys::{KeyStoreSnapshot, MemoryKeyStore};
pub use mutator::{IndexMutator, ItemMutation, Mutator};
