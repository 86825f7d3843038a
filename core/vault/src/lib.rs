//! Vault lifecycle and locking for Keyvault.
//!
//! This module provides:
//! - Vault creation, deletion, renaming and option changes
//! - Root key rotation
//! - Moving items and files into and out of vaults
//! - Locking and unlocking of vaults with non-persistent root keys
//! - A lock-state cache kept consistent with the key store
//!
//! # Architecture
//! [`VaultManager`] is the public entry point. It checks lock and ownership
//! preconditions, delegates multi-step key work to the use cases in
//! [`operations`], synchronizes, and broadcasts [`VaultEvent`]s. A background
//! observer recomputes lock state whenever key material or vault listings
//! change.

pub mod config;
pub mod events;
pub mod lock_cache;
pub mod manager;
pub mod operations;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::VaultManagerConfig;
pub use events::VaultEvent;
pub use lock_cache::{LockCache, LockState};
pub use manager::VaultManager;
pub use operations::{
    ChangeVaultKeyOptions, Collaborators, CreateVaultInput, NewPasswordType, RotateRootKeyInput,
};
