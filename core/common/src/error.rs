//! Common error types for Keyvault.

use thiserror::Error;

/// Top-level error type for Keyvault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation requires an unlocked vault.
    #[error("Vault is locked: {0}")]
    LockedVault(String),

    /// Item has no vault to remove it from.
    #[error("Item is not in a vault: {0}")]
    NotInVault(String),

    /// Shared vault used where a personal vault is expected, or vice versa.
    #[error("Wrong vault kind: {0}")]
    WrongVaultKind(String),

    /// Operation is incompatible with the vault's storage or password mode.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Vault or item lookup miss.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Synchronization failed.
    #[error("Sync error: {0}")]
    Sync(String),

    /// Transient transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable failure that is meant to be shown to a user rather than
/// propagated as a fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DisplayableError {
    pub message: String,
}

impl DisplayableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<Error> for DisplayableError {
    fn from(err: Error) -> Self {
        Self::new(err.to_string())
    }
}
