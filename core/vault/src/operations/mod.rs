//! Vault use cases.
//!
//! Each use case is a single-shot workflow over the collaborators. Key
//! material changes always happen before the item commit that makes them
//! visible in the index, so a failure part-way never leaves a listing that
//! points at keys which do not exist.

mod add_item;
mod change_options;
mod create;
mod delete;
mod get_vault;
mod remove_item;
mod rotate;

use std::sync::Arc;

use keyvault_common::Result;
use keyvault_store::{Files, ItemIndex, KeyStore, KeySystemRootKey, Mutator};

pub use add_item::add_items_to_vault;
pub use change_options::{change_vault_key_options, ChangeVaultKeyOptions, NewPasswordType};
pub use create::{create_vault, CreateVaultInput};
pub use delete::delete_vault;
pub use get_vault::{get_vault, list_vaults};
pub use remove_item::remove_item_from_vault;
pub use rotate::{rotate_root_key, RotateRootKeyInput};

/// Collaborators shared by every use case.
#[derive(Clone)]
pub struct Collaborators {
    pub keys: Arc<dyn KeyStore>,
    pub index: Arc<dyn ItemIndex>,
    pub mutator: Arc<dyn Mutator>,
    pub files: Arc<dyn Files>,
}

/// Store a root key according to its storage mode.
async fn store_root_key(keys: &dyn KeyStore, root_key: KeySystemRootKey) -> Result<()> {
    let mode = root_key.storage_mode;
    if mode.is_non_persistent() {
        keys.intake_non_persistent_root_key(root_key, mode).await
    } else {
        keys.persist_root_key(root_key).await
    }
}
