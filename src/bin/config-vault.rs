//! config-vault CLI
//!
//! Administrative interface for inspecting, writing and reading the
//! encrypted configuration vault.

use clap::{Parser, Subcommand};
use std::error::Error as StdError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config_vault::passphrase::{
    PassphrasePurpose, PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader,
};
use config_vault::{ConfigPlaintext, ErrorCategory, ErrorKind, Result, Vault, VaultError};

#[derive(Parser)]
#[command(name = "config-vault")]
#[command(version)]
#[command(about = "Passphrase-protected configuration vault.", long_about = None)]
struct Cli {
    /// Path to the vault file
    #[arg(
        long,
        global = true,
        env = "CONFIG_VAULT_PATH",
        default_value = "data/secure-config.enc",
        value_name = "FILE"
    )]
    vault: PathBuf,

    /// Read passphrase from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether the vault exists, its size and modification time
    Status,

    /// Encrypt a configuration file into the vault
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },

    /// Decrypt the vault
    #[command(alias = "d")]
    Decrypt {
        /// Path to write the configuration to (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Replace the vault contents, while validating that the passphrase
    /// is not accidentally changed.
    #[command(alias = "u")]
    Update {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", report(&e));
        process::exit(1);
    }
}

/// `RUST_LOG` takes precedence over `--verbose` when set.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: failed to install logger: {}", e);
    }
}

fn run(cli: Cli) -> Result<()> {
    let vault = Vault::new(cli.vault)?;

    match cli.command {
        Commands::Status => {
            let status = serde_json::to_string_pretty(&vault.status()).map_err(|e| {
                VaultError::with_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to format status",
                    e,
                )
            })?;
            write_stdout(status.as_bytes())?;
            write_stdout(b"\n")
        }
        Commands::Encrypt { input } => {
            let plaintext = read_plaintext(&input)?;
            let passphrase = get_passphrase_reader(cli.passphrase_stdin, PassphrasePurpose::Set)
                .read_passphrase()?;
            vault.encrypt_and_save(&passphrase, &plaintext)
        }
        Commands::Decrypt { output } => {
            let passphrase =
                get_passphrase_reader(cli.passphrase_stdin, PassphrasePurpose::Unlock)
                    .read_passphrase()?;
            let config = vault.decrypt_from_file(&passphrase)?;
            let rendered = config.render();
            match output {
                Some(path) => write_file_secure(&path, rendered.as_bytes()),
                None => write_stdout(rendered.as_bytes()),
            }
        }
        Commands::Update { input } => {
            let plaintext = read_plaintext(&input)?;
            let passphrase =
                get_passphrase_reader(cli.passphrase_stdin, PassphrasePurpose::Unlock)
                    .read_passphrase()?;
            vault.update(&passphrase, &plaintext)
        }
    }
}

fn get_passphrase_reader(use_stdin: bool, purpose: PassphrasePurpose) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(io::stdin()))
    } else {
        Box::new(TerminalPassphraseReader::new(purpose))
    }
}

/// Reads the configuration to store: JSON if it parses, raw text otherwise.
fn read_plaintext(path: &Path) -> Result<ConfigPlaintext> {
    let text = fs::read_to_string(path).map_err(|e| {
        let kind = if e.kind() == io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::Io
        };
        VaultError::with_source(
            ErrorCategory::User,
            kind,
            format!("failed to read from {}", path.display()),
            e,
        )
    })?;
    Ok(ConfigPlaintext::from_text(text))
}

fn write_stdout(contents: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(contents)
        .and_then(|()| stdout.flush())
        .map_err(|e| {
            VaultError::with_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to write to stdout",
                e,
            )
        })
}

/// Write file with secure permissions (0o600 on Unix)
fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    let write_failed = |e: io::Error| {
        VaultError::with_source(
            ErrorCategory::User,
            ErrorKind::WriteFailed,
            format!("failed to write {}", path.display()),
            e,
        )
    };

    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(write_failed)?;
        file.write_all(contents).map_err(write_failed)
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents).map_err(write_failed)
    }
}

/// The error message followed by the messages of its sources.
fn report(err: &VaultError) -> String {
    let mut message = err.to_string();
    let mut source = StdError::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
