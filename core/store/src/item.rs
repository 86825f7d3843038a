//! Decrypted items held by the index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::listing::VaultListingContent;
use keyvault_common::{ItemId, KeySystemIdentifier};

/// Kind of an item, used for index queries and change subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    Note,
    File,
    Tag,
    VaultListing,
    KeySystemRootKey,
    KeySystemItemsKey,
}

/// Decrypted payload of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemContent {
    Note {
        title: String,
        text: String,
    },
    File {
        name: String,
        remote_identifier: String,
        size: u64,
    },
    Tag {
        title: String,
    },
    VaultListing(VaultListingContent),
}

impl ItemContent {
    /// Content type implied by this payload.
    pub fn content_type(&self) -> ContentType {
        match self {
            ItemContent::Note { .. } => ContentType::Note,
            ItemContent::File { .. } => ContentType::File,
            ItemContent::Tag { .. } => ContentType::Tag,
            ItemContent::VaultListing(_) => ContentType::VaultListing,
        }
    }
}

/// A decrypted domain object.
///
/// An item belongs to a vault iff `key_system_identifier` is set and
/// matches that vault's key system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedItem {
    pub uuid: ItemId,
    pub content_type: ContentType,
    pub key_system_identifier: Option<KeySystemIdentifier>,
    pub shared_vault_uuid: Option<String>,
    pub content: ItemContent,
    /// Incremented by every committed mutation.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl DecryptedItem {
    /// Create a new, not yet committed item.
    pub fn new(content: ItemContent) -> Self {
        Self {
            uuid: ItemId::new(),
            content_type: content.content_type(),
            key_system_identifier: None,
            shared_vault_uuid: None,
            content,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// Convenience constructor for a note.
    pub fn note(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(ItemContent::Note {
            title: title.into(),
            text: text.into(),
        })
    }

    /// Convenience constructor for a file attachment.
    pub fn file(name: impl Into<String>, remote_identifier: impl Into<String>, size: u64) -> Self {
        Self::new(ItemContent::File {
            name: name.into(),
            remote_identifier: remote_identifier.into(),
            size,
        })
    }

    pub fn is_in_vault(&self) -> bool {
        self.key_system_identifier.is_some()
    }

    pub fn is_file(&self) -> bool {
        self.content_type == ContentType::File
    }
}
