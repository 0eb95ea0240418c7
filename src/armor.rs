//! Text armoring for the vault file
//!
//! The vault file holds nothing but standard, padded base64 of the binary
//! envelope. Leading and trailing ASCII whitespace is ignored on read so a
//! trailing newline added by an editor does not make the vault unreadable.

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use base64::{Engine, engine::general_purpose::STANDARD};

/// Wrap bytes in armor, returning the armored string
pub fn wrap(body: &[u8]) -> String {
    STANDARD.encode(body)
}

/// Unwrap an armored string, returning the original bytes
pub fn unwrap(armored: &str) -> Result<Vec<u8>> {
    STANDARD.decode(armored.trim_ascii()).map_err(|e| {
        VaultError::with_source(
            ErrorCategory::User,
            ErrorKind::Malformed,
            format!("base64 decoding failed: {}", e),
            e,
        )
    })
}
