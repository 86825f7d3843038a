//! Cryptographic primitives for Keyvault.
//!
//! This module provides:
//! - Password-based root key derivation using Argon2id
//! - Key wrapping using XChaCha20-Poly1305 with associated data
//! - Key material with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Key comparisons are constant-time

pub mod aead;
pub mod kdf;
pub mod keys;

pub use aead::{open, seal};
pub use kdf::{derive_key, KdfParams};
pub use keys::{KeyMaterial, Salt, KEY_LENGTH};
