//! Response shapes for exposing the vault over an HTTP-style API
//!
//! Errors are reduced to the taxonomy name and a status code. The detailed
//! message and its sources are only logged at debug level.
//!
//! Besides the vault taxonomy, `"Io"` (500) is reported when the vault file
//! exists but cannot be read.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::VaultError;
use crate::vault::{ConfigPlaintext, DecryptedConfig, Vault, VaultStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncryptResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

#[derive(Clone, PartialEq, Serialize)]
pub struct DecryptResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl std::fmt::Debug for DecryptResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptResponse")
            .field("ok", &self.ok)
            .field("error", &self.error)
            .field("status_code", &self.status_code)
            .finish_non_exhaustive()
    }
}

/// Vault file metadata.
pub fn status(vault: &Vault) -> VaultStatus {
    vault.status()
}

/// Encrypts `plaintext` verbatim into the vault.
pub fn encrypt_and_save(vault: &Vault, passphrase: &str, plaintext: &str) -> EncryptResponse {
    let plaintext = ConfigPlaintext::Text(plaintext.to_owned());
    match vault.encrypt_and_save(passphrase.as_bytes(), &plaintext) {
        Ok(()) => EncryptResponse {
            ok: true,
            error: None,
            status_code: None,
        },
        Err(e) => {
            log_failure("encrypt", &e);
            EncryptResponse {
                ok: false,
                error: Some(e.kind.name().to_owned()),
                status_code: Some(e.kind.status_code()),
            }
        }
    }
}

/// Decrypts the vault into `config` (JSON) or `config_text` (anything else).
pub fn decrypt_from_file(vault: &Vault, passphrase: &str) -> DecryptResponse {
    match vault.decrypt_from_file(passphrase.as_bytes()) {
        Ok(DecryptedConfig::Json(value)) => DecryptResponse {
            ok: true,
            config: Some(value),
            config_text: None,
            error: None,
            status_code: None,
        },
        Ok(DecryptedConfig::Text(text)) => DecryptResponse {
            ok: true,
            config: None,
            config_text: Some(text),
            error: None,
            status_code: None,
        },
        Err(e) => {
            log_failure("decrypt", &e);
            DecryptResponse {
                ok: false,
                config: None,
                config_text: None,
                error: Some(e.kind.name().to_owned()),
                status_code: Some(e.kind.status_code()),
            }
        }
    }
}

fn log_failure(operation: &str, err: &VaultError) {
    debug!(operation, kind = err.kind.name(), error = %err, "Vault request failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_correct_horse_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let vault = Vault::new(temp_dir.path().join("secure-config.enc")).unwrap();

        let saved = encrypt_and_save(&vault, "correct horse", r#"{"api_key":"abc123"}"#);
        assert_eq!(
            serde_json::to_value(&saved).unwrap(),
            json!({"ok": true})
        );

        let opened = decrypt_from_file(&vault, "correct horse");
        assert_eq!(
            serde_json::to_value(&opened).unwrap(),
            json!({"ok": true, "config": {"api_key": "abc123"}})
        );

        let denied = decrypt_from_file(&vault, "wrong pass");
        assert_eq!(
            serde_json::to_value(&denied).unwrap(),
            json!({"ok": false, "error": "WrongPassphraseOrCorrupted", "status_code": 400})
        );
    }

    #[test]
    fn test_text_config() {
        let temp_dir = TempDir::new().unwrap();
        let vault = Vault::new(temp_dir.path().join("secure-config.enc")).unwrap();

        assert!(encrypt_and_save(&vault, "pw", "KEY=value").ok);
        let opened = decrypt_from_file(&vault, "pw");

        assert!(opened.ok);
        assert_eq!(opened.config, None);
        assert_eq!(opened.config_text.as_deref(), Some("KEY=value"));
    }

    #[test]
    fn test_empty_text_config() {
        let temp_dir = TempDir::new().unwrap();
        let vault = Vault::new(temp_dir.path().join("secure-config.enc")).unwrap();

        assert!(encrypt_and_save(&vault, "pw", "").ok);
        let opened = decrypt_from_file(&vault, "pw");

        assert_eq!(
            serde_json::to_value(&opened).unwrap(),
            json!({"ok": true, "config_text": ""})
        );
    }

    #[test]
    fn test_unreadable_vault_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        // A directory exists but cannot be read as a file.
        let vault = Vault::new(temp_dir.path()).unwrap();

        let opened = decrypt_from_file(&vault, "pw");
        assert_eq!(opened.error.as_deref(), Some("Io"));
        assert_eq!(opened.status_code, Some(500));
    }

    #[test]
    fn test_error_status_codes() {
        let temp_dir = TempDir::new().unwrap();
        let vault = Vault::new(temp_dir.path().join("secure-config.enc")).unwrap();

        let missing = decrypt_from_file(&vault, "pw");
        assert_eq!(missing.error.as_deref(), Some("NotFound"));
        assert_eq!(missing.status_code, Some(404));

        fs::write(vault.path(), b"").unwrap();
        let empty = decrypt_from_file(&vault, "pw");
        assert_eq!(empty.error.as_deref(), Some("EmptyFile"));
        assert_eq!(empty.status_code, Some(400));

        fs::write(vault.path(), b"0123456789").unwrap();
        let short = decrypt_from_file(&vault, "pw");
        assert_eq!(short.error.as_deref(), Some("Malformed"));
        assert_eq!(short.status_code, Some(400));
    }

    #[test]
    fn test_write_failure_status_code() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let vault = Vault::new(blocker.join("secure-config.enc")).unwrap();

        let saved = encrypt_and_save(&vault, "pw", "x");
        assert!(!saved.ok);
        assert_eq!(saved.error.as_deref(), Some("WriteFailed"));
        assert_eq!(saved.status_code, Some(500));
    }

    #[test]
    fn test_status_serialization() {
        let temp_dir = TempDir::new().unwrap();
        let vault = Vault::new(temp_dir.path().join("secure-config.enc")).unwrap();

        assert_eq!(
            serde_json::to_value(status(&vault)).unwrap(),
            json!({"exists": false})
        );

        fs::write(vault.path(), b"abc").unwrap();
        let value = serde_json::to_value(status(&vault)).unwrap();
        assert_eq!(value["exists"], json!(true));
        assert_eq!(value["size"], json!(3));
        assert!(value["mtime"].is_string());
    }
}
