//! config-vault - a passphrase-protected configuration store
//!
//! One JSON (or plain text) configuration blob is sealed with AES-256-GCM
//! under a key derived from an administrator passphrase with scrypt. The
//! scrypt implementation is our own and byte-identical to RFC 7914, so vaults
//! stay readable by any other conforming reader using the same parameters.

#![forbid(unsafe_code)]

pub mod api;
pub mod armor;
pub mod envelope;
pub mod error;
pub mod passphrase;
pub mod salsa;
pub mod scrypt;
pub mod vault;

pub use error::{ErrorCategory, ErrorKind, Result, VaultError};
pub use vault::{ConfigPlaintext, DecryptedConfig, Vault, VaultStatus};
