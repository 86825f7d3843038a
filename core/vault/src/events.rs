//! Vault lifecycle events.

use keyvault_store::VaultListing;

/// Broadcast by the vault manager when a vault changes state.
#[derive(Debug, Clone, PartialEq)]
pub enum VaultEvent {
    Locked(VaultListing),
    Unlocked(VaultListing),
    RootKeyRotated(VaultListing),
}

impl VaultEvent {
    /// The vault the event is about.
    pub fn vault(&self) -> &VaultListing {
        match self {
            VaultEvent::Locked(vault)
            | VaultEvent::Unlocked(vault)
            | VaultEvent::RootKeyRotated(vault) => vault,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VaultEvent::Locked(_) => "locked",
            VaultEvent::Unlocked(_) => "unlocked",
            VaultEvent::RootKeyRotated(_) => "root_key_rotated",
        }
    }
}
