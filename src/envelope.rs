//! AES-256-GCM envelope
//!
//! Seals a plaintext under a 32-byte key with a fresh random nonce. The
//! binary format is:
//! - nonce: 12 bytes
//! - tag: 16 bytes (GCM authentication tag)
//! - ciphertext: variable length, same length as the plaintext
//!
//! There is no header, version or length field; the layout is shared with
//! other readers of the vault and cannot change.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};

/// Length of the AES-256 key in bytes
pub const KEY_LEN: usize = 32;

/// Length of the GCM nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of the GCM tag in bytes
pub const TAG_LEN: usize = 16;

/// Smallest decoded envelope accepted: nonce, tag and at least one byte of
/// ciphertext.
pub const MIN_ENVELOPE_LEN: usize = NONCE_LEN + TAG_LEN + 1;

/// One sealed vault payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Serializes as `nonce || tag || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + TAG_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Splits `nonce || tag || ciphertext` back into its parts.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_ENVELOPE_LEN {
            return Err(VaultError::new(
                ErrorCategory::User,
                ErrorKind::Malformed,
                format!(
                    "envelope is {} bytes, expected at least {}; likely truncated",
                    bytes.len(),
                    MIN_ENVELOPE_LEN
                ),
            ));
        }

        let (nonce, rest) = bytes.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut envelope = Envelope {
            nonce: [0u8; NONCE_LEN],
            tag: [0u8; TAG_LEN],
            ciphertext: ciphertext.to_vec(),
        };
        envelope.nonce.copy_from_slice(nonce);
        envelope.tag.copy_from_slice(tag);
        Ok(envelope)
    }
}

/// Encrypt `plaintext` under `key` with a random nonce from the OS RNG.
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Envelope> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    seal_with_nonce(key, plaintext, &nonce)
}

/// Encrypt `plaintext` under `key` with the provided nonce.
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `seal()` which generates a random nonce.
pub fn seal_with_nonce(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    nonce: &[u8; NONCE_LEN],
) -> Result<Envelope> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut ciphertext)
        .map_err(|_| {
            VaultError::new(
                ErrorCategory::User,
                ErrorKind::Malformed,
                "configuration is too large to encrypt",
            )
        })?;

    let mut envelope = Envelope {
        nonce: *nonce,
        tag: [0u8; TAG_LEN],
        ciphertext,
    };
    envelope.tag.copy_from_slice(&tag);
    Ok(envelope)
}

/// Decrypt and authenticate `envelope` under `key`.
///
/// A wrong key and a modified envelope fail identically.
pub fn open(key: &[u8; KEY_LEN], envelope: &Envelope) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut plaintext = Zeroizing::new(envelope.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&envelope.nonce),
            b"",
            &mut plaintext,
            GenericArray::from_slice(&envelope.tag),
        )
        .map_err(|_| {
            VaultError::new(
                ErrorCategory::User,
                ErrorKind::WrongPassphraseOrCorrupted,
                "corrupt input, tampered-with data, or bad passphrase",
            )
        })?;

    Ok(plaintext)
}
