//! Common utilities and types shared across Keyvault modules.
//!
//! This module provides the error taxonomy and the identifier types used
//! by the key store, the item index and the vault manager.

pub mod error;
pub mod types;

pub use error::{DisplayableError, Error, Result};
pub use types::{ItemId, KeySystemIdentifier, SensitiveBytes};
