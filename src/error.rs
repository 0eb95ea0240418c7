use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Use of Internal is never a guarantee the error is not, for example,
    /// caused by the user - merely that it cannot be confidently determined
    /// by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// The closed set of failure conditions the vault reports to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// scrypt parameters are unusable (N not a power of two, sizes overflow).
    InvalidParameters,
    /// The vault file does not exist.
    NotFound,
    /// The vault file exists but is zero bytes long.
    EmptyFile,
    /// The vault file is not valid base64, the envelope is too short, or the
    /// decrypted configuration is not UTF-8.
    Malformed,
    /// Authentication failed due to an incorrect passphrase, tampering or
    /// corruption. Deliberately does not say which.
    WrongPassphraseOrCorrupted,
    /// Persisting the vault failed.
    WriteFailed,
    /// Passphrase could not be obtained from the configured reader.
    PassphraseUnavailable,
    /// Reading from the filesystem, stdin or stdout failed for a reason
    /// other than the file being absent.
    Io,
}

impl ErrorKind {
    /// Stable name reported in API responses.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidParameters => "InvalidParameters",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::EmptyFile => "EmptyFile",
            ErrorKind::Malformed => "Malformed",
            ErrorKind::WrongPassphraseOrCorrupted => "WrongPassphraseOrCorrupted",
            ErrorKind::WriteFailed => "WriteFailed",
            ErrorKind::PassphraseUnavailable => "PassphraseUnavailable",
            ErrorKind::Io => "Io",
        }
    }

    /// HTTP-style status code callers should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::EmptyFile
            | ErrorKind::Malformed
            | ErrorKind::WrongPassphraseOrCorrupted
            | ErrorKind::PassphraseUnavailable => 400,
            ErrorKind::InvalidParameters | ErrorKind::WriteFailed | ErrorKind::Io => 500,
        }
    }
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct VaultError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Specific condition, always provided.
    pub kind: ErrorKind,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl VaultError {
    /// Creates a new error with a category, kind and display message.
    pub fn new(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that retains the originating source error.
    pub fn with_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind,
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, VaultError>;
