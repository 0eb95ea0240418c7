//! The configuration vault
//!
//! A [`Vault`] is a handle on one file holding the base64 armored envelope of
//! a single configuration blob. Keys are derived from the passphrase on every
//! call with scrypt using fixed parameters and a fixed salt, so any other
//! reader that knows the passphrase can open the same file.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::armor;
use crate::envelope::{self, Envelope, KEY_LEN};
use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::scrypt::{ScryptParams, scrypt};

/// Input to the salt digest shared by every reader of the vault.
pub const SALT_SEED: &[u8] = b"ganudenu-config-salt";

const _: () = assert!(ScryptParams::VAULT.dk_len == KEY_LEN);

/// Stored in place of empty text, which would make the ciphertext empty.
const EMPTY_TEXT: &[u8] = b"\"\"";

/// The scrypt salt: SHA-256 of [`SALT_SEED`].
pub fn vault_salt() -> [u8; 32] {
    let mut salt = [0u8; 32];
    salt.copy_from_slice(&Sha256::digest(SALT_SEED));
    salt
}

/// Derive the AES-256 key for `passphrase`.
///
/// Runs a full scrypt derivation (about 16 MiB of scratch memory) on every
/// call; nothing is cached between calls.
pub fn derive_key(passphrase: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let derived = scrypt(passphrase, &vault_salt(), &ScryptParams::VAULT)?;
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&derived);
    Ok(key)
}

/// Encrypt `plaintext` and return the armored envelope.
pub fn encrypt_armored(passphrase: &[u8], plaintext: &[u8]) -> Result<String> {
    let key = derive_key(passphrase)?;
    let sealed = envelope::seal(&key, plaintext)?;
    Ok(armor::wrap(&sealed.to_bytes()))
}

/// Decrypt an armored envelope.
pub fn decrypt_armored(passphrase: &[u8], armored: &str) -> Result<Zeroizing<Vec<u8>>> {
    let bytes = armor::unwrap(armored)?;
    let sealed = Envelope::from_bytes(&bytes)?;
    let key = derive_key(passphrase)?;
    envelope::open(&key, &sealed)
}

/// File metadata for the vault. Never requires the passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultStatus {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
}

/// A configuration to be encrypted.
#[derive(Clone, PartialEq)]
pub enum ConfigPlaintext {
    /// Stored as compact JSON.
    Json(Value),
    /// Stored verbatim.
    Text(String),
}

impl ConfigPlaintext {
    /// Classifies `text` as JSON when it parses, otherwise keeps it verbatim.
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => ConfigPlaintext::Json(value),
            Err(_) => ConfigPlaintext::Text(text),
        }
    }

    /// The bytes that get sealed.
    ///
    /// Empty text is stored as the JSON literal `""` so the envelope always
    /// carries at least one byte of ciphertext. It reads back as empty text.
    fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        let bytes = match self {
            ConfigPlaintext::Json(value) => serde_json::to_vec(value).map_err(|e| {
                VaultError::with_source(
                    ErrorCategory::User,
                    ErrorKind::Malformed,
                    "configuration could not be serialized as JSON",
                    e,
                )
            })?,
            ConfigPlaintext::Text(text) if text.is_empty() => EMPTY_TEXT.to_vec(),
            ConfigPlaintext::Text(text) => text.as_bytes().to_vec(),
        };
        Ok(Zeroizing::new(bytes))
    }
}

impl fmt::Debug for ConfigPlaintext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigPlaintext::Json(_) => f.write_str("ConfigPlaintext::Json(..)"),
            ConfigPlaintext::Text(_) => f.write_str("ConfigPlaintext::Text(..)"),
        }
    }
}

impl From<Value> for ConfigPlaintext {
    fn from(value: Value) -> Self {
        ConfigPlaintext::Json(value)
    }
}

impl From<String> for ConfigPlaintext {
    fn from(text: String) -> Self {
        ConfigPlaintext::Text(text)
    }
}

impl From<&str> for ConfigPlaintext {
    fn from(text: &str) -> Self {
        ConfigPlaintext::Text(text.to_owned())
    }
}

/// A decrypted configuration.
#[derive(Clone, PartialEq)]
pub enum DecryptedConfig {
    /// The plaintext parsed as JSON.
    Json(Value),
    /// The plaintext was not JSON and is returned as-is.
    Text(String),
}

impl DecryptedConfig {
    fn from_plaintext(plaintext: &[u8]) -> Result<Self> {
        if plaintext == EMPTY_TEXT {
            return Ok(DecryptedConfig::Text(String::new()));
        }
        let text = std::str::from_utf8(plaintext).map_err(|e| {
            VaultError::with_source(
                ErrorCategory::User,
                ErrorKind::Malformed,
                "decrypted configuration is not valid UTF-8",
                e,
            )
        })?;
        Ok(match serde_json::from_str(text) {
            Ok(value) => DecryptedConfig::Json(value),
            Err(_) => DecryptedConfig::Text(text.to_owned()),
        })
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            DecryptedConfig::Json(value) => Some(value),
            DecryptedConfig::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecryptedConfig::Json(_) => None,
            DecryptedConfig::Text(text) => Some(text),
        }
    }

    /// Pretty-printed JSON, or the raw text.
    pub fn render(&self) -> String {
        match self {
            DecryptedConfig::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            DecryptedConfig::Text(text) => text.clone(),
        }
    }
}

impl fmt::Debug for DecryptedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecryptedConfig::Json(_) => f.write_str("DecryptedConfig::Json(..)"),
            DecryptedConfig::Text(_) => f.write_str("DecryptedConfig::Text(..)"),
        }
    }
}

/// Handle on the vault file. Construct once and pass by reference.
#[derive(Debug, Clone)]
pub struct Vault {
    path: PathBuf,
}

impl Vault {
    /// Creates a handle for the vault stored at `path`.
    ///
    /// Fails with `InvalidParameters` if the built-in scrypt parameters are
    /// unusable; the file itself is not touched.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        ScryptParams::VAULT.validate()?;
        Ok(Self { path: path.into() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stats the vault file. Never decrypts.
    pub fn status(&self) -> VaultStatus {
        match fs::metadata(&self.path) {
            Ok(metadata) => VaultStatus {
                exists: true,
                size: Some(metadata.len()),
                mtime: metadata.modified().ok().map(DateTime::<Utc>::from),
            },
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Cannot stat vault file");
                }
                VaultStatus {
                    exists: false,
                    size: None,
                    mtime: None,
                }
            }
        }
    }

    /// Encrypts `plaintext` and atomically replaces the vault file.
    pub fn encrypt_and_save(&self, passphrase: &[u8], plaintext: &ConfigPlaintext) -> Result<()> {
        debug!(path = %self.path.display(), "Encrypting vault");
        let bytes = plaintext.to_bytes()?;
        let armored = encrypt_armored(passphrase, &bytes)
            .map_err(|e| e.with_context("encryption failed"))?;
        write_atomic(&self.path, armored.as_bytes())?;
        info!(path = %self.path.display(), size = armored.len(), "Vault written");
        Ok(())
    }

    /// Reads and decrypts the vault file.
    ///
    /// Returns parsed JSON when the plaintext is JSON, the raw text otherwise.
    pub fn decrypt_from_file(&self, passphrase: &[u8]) -> Result<DecryptedConfig> {
        debug!(path = %self.path.display(), "Decrypting vault");
        let plaintext = self.open(passphrase)?;
        let config = DecryptedConfig::from_plaintext(&plaintext)?;
        info!(path = %self.path.display(), "Vault decrypted");
        Ok(config)
    }

    /// Replaces the vault contents after checking that `passphrase` opens the
    /// existing vault, so the passphrase cannot be changed by accident.
    ///
    /// Nothing is written if the existing vault cannot be decrypted.
    pub fn update(&self, passphrase: &[u8], plaintext: &ConfigPlaintext) -> Result<()> {
        // Validate passphrase by decrypting existing file (discard plaintext)
        self.open(passphrase)?;
        self.encrypt_and_save(passphrase, plaintext)
    }

    fn open(&self, passphrase: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let armored = self.read_armored()?;
        decrypt_armored(passphrase, &armored).map_err(|e| {
            if e.kind == ErrorKind::WrongPassphraseOrCorrupted {
                warn!(path = %self.path.display(), "Vault authentication failed");
            }
            e.with_context("failed to decrypt")
        })
    }

    fn read_armored(&self) -> Result<String> {
        let bytes = fs::read(&self.path).map_err(|e| read_error(&self.path, e))?;
        if bytes.is_empty() {
            return Err(VaultError::new(
                ErrorCategory::User,
                ErrorKind::EmptyFile,
                format!("vault file {} is empty", self.path.display()),
            ));
        }
        String::from_utf8(bytes).map_err(|e| {
            VaultError::with_source(
                ErrorCategory::User,
                ErrorKind::Malformed,
                "vault file is not valid UTF-8",
                e,
            )
        })
    }
}

/// Atomically replace `path` with `contents` (tempfile + fsync + rename).
///
/// Either the old or the new file is visible afterwards, never a partial one.
/// The file is created with mode 0o600 on Unix systems.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| {
        write_error(format!("failed to create directory {}", dir.display()), e)
    })?;

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| write_error("failed to create tempfile", e))?;

    temp_file
        .write_all(contents)
        .map_err(|e| write_error("failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| write_error("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| write_error("failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| write_error("failed to set tempfile permissions", e))?;
    }

    temp_file.persist(path).map_err(|e| {
        write_error(
            format!("failed to rename to target file {}", path.display()),
            e.error,
        )
    })?;
    Ok(())
}

fn write_error(msg: impl Into<String>, err: io::Error) -> VaultError {
    VaultError::with_source(ErrorCategory::Internal, ErrorKind::WriteFailed, msg, err)
}

fn read_error(path: &Path, err: io::Error) -> VaultError {
    if err.kind() == io::ErrorKind::NotFound {
        VaultError::with_source(
            ErrorCategory::User,
            ErrorKind::NotFound,
            format!("vault file {} does not exist", path.display()),
            err,
        )
    } else {
        VaultError::with_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to read from {}", path.display()),
            err,
        )
    }
}
