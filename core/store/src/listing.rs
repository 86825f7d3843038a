//! Vault listings and their public key parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{DecryptedItem, ItemContent};
use keyvault_common::{Error, ItemId, KeySystemIdentifier, Result};
use keyvault_crypto::{KdfParams, Salt};

/// Where a vault's root key lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyStorageMode {
    /// Root key is persisted and synchronized; always derivable.
    Synced,
    /// Root key is kept on this device only.
    Local,
    /// Root key only ever lives in memory.
    Ephemeral,
}

impl KeyStorageMode {
    /// Whether the root key can be dropped from memory client-side.
    pub fn is_non_persistent(&self) -> bool {
        !matches!(self, KeyStorageMode::Synced)
    }
}

/// How a vault's root key is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPasswordType {
    Randomized,
    UserInputted,
}

/// Public, non-secret parameters from which a root key is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootKeyParams {
    pub key_system_identifier: KeySystemIdentifier,
    pub password_type: KeyPasswordType,
    /// Only meaningful for `UserInputted` keys.
    pub salt: Salt,
    pub kdf_params: KdfParams,
    pub created_at: DateTime<Utc>,
}

/// Sharing metadata; present only on shared vault listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSharing {
    pub shared_vault_uuid: String,
    pub owner_user_uuid: String,
}

/// Payload of a vault listing item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultListingContent {
    pub key_system_identifier: KeySystemIdentifier,
    pub name: String,
    pub description: Option<String>,
    pub key_storage_mode: KeyStorageMode,
    pub root_key_params: RootKeyParams,
    pub sharing: Option<VaultSharing>,
}

/// Typed view over a `VaultListing` item.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultListing {
    pub uuid: ItemId,
    pub version: u64,
    pub content: VaultListingContent,
}

impl VaultListing {
    pub fn key_system_identifier(&self) -> &KeySystemIdentifier {
        &self.content.key_system_identifier
    }

    pub fn name(&self) -> &str {
        &self.content.name
    }

    pub fn description(&self) -> Option<&str> {
        self.content.description.as_deref()
    }

    pub fn key_storage_mode(&self) -> KeyStorageMode {
        self.content.key_storage_mode
    }

    pub fn key_password_type(&self) -> KeyPasswordType {
        self.content.root_key_params.password_type
    }

    pub fn root_key_params(&self) -> &RootKeyParams {
        &self.content.root_key_params
    }

    pub fn shared_vault_uuid(&self) -> Option<&str> {
        self.content
            .sharing
            .as_ref()
            .map(|sharing| sharing.shared_vault_uuid.as_str())
    }

    /// Shared listings may only be modified through the shared-vault path.
    pub fn is_shared_vault_listing(&self) -> bool {
        self.content.sharing.is_some()
    }
}

impl TryFrom<&DecryptedItem> for VaultListing {
    type Error = Error;

    fn try_from(item: &DecryptedItem) -> Result<Self> {
        match &item.content {
            ItemContent::VaultListing(content) => Ok(Self {
                uuid: item.uuid,
                version: item.version,
                content: content.clone(),
            }),
            _ => Err(Error::InvalidInput(format!(
                "Item {} is not a vault listing",
                item.uuid
            ))),
        }
    }
}
