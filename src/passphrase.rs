//! Where the vault passphrase comes from
//!
//! The CLI either pipes the passphrase in on stdin (scripts, tests) or asks
//! for it on the terminal. Unlocking asks once; setting the passphrase of a
//! vault with `encrypt` asks twice, since a typo there locks the
//! configuration away for good.

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// Trait for reading passphrases from various sources
pub trait PassphraseReader {
    /// Read a passphrase as arbitrary bytes (not necessarily UTF-8)
    ///
    /// Returns the passphrase wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// What the passphrase is about to be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassphrasePurpose {
    /// Open the existing vault (`decrypt`, `update`).
    Unlock,
    /// Seal the vault under a possibly new passphrase (`encrypt`).
    Set,
}

/// Reads the passphrase from a byte stream, verbatim: everything up to EOF,
/// including any trailing newline.
pub struct ReaderPassphraseReader<R> {
    reader: R,
}

impl<R: Read> ReaderPassphraseReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> PassphraseReader for ReaderPassphraseReader<R> {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            VaultError::with_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                "error reading passphrase",
                e,
            )
        })?;
        Ok(data)
    }
}

/// Prompts on the terminal with no echo
pub struct TerminalPassphraseReader {
    purpose: PassphrasePurpose,
}

impl TerminalPassphraseReader {
    pub fn new(purpose: PassphrasePurpose) -> Self {
        Self { purpose }
    }

    fn prompt(&self, prompt: &str) -> Result<Zeroizing<Vec<u8>>> {
        let mut stderr = io::stderr();
        stderr
            .write_all(prompt.as_bytes())
            .and_then(|()| stderr.flush())
            .map_err(|e| {
                VaultError::with_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to write prompt",
                    e,
                )
            })?;

        // rpassword returns a String which is moved, not copied, into the
        // zeroizing buffer.
        let passphrase = rpassword::read_password().map_err(|e| {
            VaultError::with_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                "failure reading passphrase",
                e,
            )
        })?;
        Ok(Zeroizing::new(passphrase.into_bytes()))
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    /// Terminal input is limited to UTF-8 by rpassword. For non-UTF-8
    /// passphrases, use --passphrase-stdin instead.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(VaultError::new(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read passphrase from terminal - stdin is not a terminal",
            ));
        }

        match self.purpose {
            PassphrasePurpose::Unlock => self.prompt("Vault passphrase: "),
            PassphrasePurpose::Set => {
                let first = self.prompt("New vault passphrase: ")?;
                let second = self.prompt("Repeat vault passphrase: ")?;
                confirm_new_passphrase(first, &second)
            }
        }
    }
}

/// Accepts a newly chosen passphrase only if it was typed the same twice and
/// is not empty.
pub fn confirm_new_passphrase(
    first: Zeroizing<Vec<u8>>,
    second: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if first.is_empty() {
        return Err(VaultError::new(
            ErrorCategory::User,
            ErrorKind::PassphraseUnavailable,
            "new vault passphrase must not be empty",
        ));
    }
    if first.as_slice() != second {
        return Err(VaultError::new(
            ErrorCategory::User,
            ErrorKind::PassphraseUnavailable,
            "passphrases do not match",
        ));
    }
    Ok(first)
}
