//! keywarden - Local secret discovery and at-rest encryption
//!
//! Commands:
//! - scan: run every detector over the home directory, merge into the catalog
//! - list: show tracked entries
//! - add <PATH>: track a file or directory
//! - remove <PATH>: stop tracking a path
//! - encrypt <PATH>: cypher a file or directory in place
//! - decrypt <PATH>: restore a cyphered file or directory
//! - status <PATH>: existence and conflict check
//! - backup: archive every tracked file plus the catalog

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keywarden::{ScanEvent, Warden};
use keywarden_core::{format_size, Paths};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keywarden")]
#[command(about = "Local secret discovery and at-rest encryption - finds SSH keys, cloud credentials and .env files, and cyphers them in place")]
#[command(version)]
#[command(after_help = r#"NAMING:
    Encrypted files carry a _cyphered marker before their extension
    (config.json -> config_cyphered.json); encrypted directories become a
    single <name>_cypheredd.zip artifact. The name is the only metadata.

SECURITY:
    - AES-256-CBC keyed from the SHA-256 of your passphrase, fresh IV per file
    - There is no passphrase recovery; losing it loses the data
    - Catalog stored in ~/.local/share/keywarden/catalog.json"#)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every detector over the home directory and update the catalog
    Scan {
        /// Print per-detector batches as they complete
        #[arg(long)]
        stream: bool,
        /// Output new entries as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// List tracked entries
    List {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Track a file or directory
    Add {
        /// Path to track
        path: PathBuf,
    },

    /// Stop tracking a path (the file itself is left alone)
    Remove {
        /// Tracked path to remove
        path: PathBuf,
    },

    /// Encrypt a file or directory in place
    Encrypt {
        /// Path to encrypt
        path: PathBuf,
        /// Passphrase (omit for hidden prompt)
        #[arg(long)]
        passphrase: Option<String>,
    },

    /// Decrypt a cyphered file or directory in place
    Decrypt {
        /// Encrypted artifact to decrypt
        path: PathBuf,
        /// Passphrase (omit for hidden prompt)
        #[arg(long)]
        passphrase: Option<String>,
    },

    /// Show existence and conflict state for a path
    Status {
        /// Path to inspect
        path: PathBuf,
    },

    /// Write a backup archive of every tracked file plus the catalog
    Backup {
        /// Encrypt the archive with a passphrase
        #[arg(long)]
        encrypt: bool,
        /// Passphrase for --encrypt (omit for hidden prompt)
        #[arg(long)]
        passphrase: Option<String>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command(cli.command))
}

async fn run_command(command: Option<Commands>) -> Result<()> {
    let paths = Paths::new();
    let warden = Warden::new(&paths).context("Failed to open the catalog")?;

    match command {
        Some(Commands::Scan { stream, json }) => cmd_scan(&warden, stream, json).await,
        Some(Commands::List { json }) => cmd_list(&warden, json).await,
        Some(Commands::Add { path }) => cmd_add(&warden, &path).await,
        Some(Commands::Remove { path }) => cmd_remove(&warden, &path).await,
        Some(Commands::Encrypt { path, passphrase }) => {
            cmd_encrypt(&warden, &path, passphrase).await
        }
        Some(Commands::Decrypt { path, passphrase }) => {
            cmd_decrypt(&warden, &path, passphrase).await
        }
        Some(Commands::Status { path }) => cmd_status(&warden, &path),
        Some(Commands::Backup {
            encrypt,
            passphrase,
        }) => cmd_backup(&warden, encrypt, passphrase).await,
        None => cmd_list(&warden, false).await,
    }
}

/// Read a passphrase from the flag or a hidden prompt
fn read_passphrase(value: Option<String>, confirm: bool) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    let passphrase =
        rpassword::prompt_password("Passphrase: ").context("Failed to read passphrase")?;
    if passphrase.is_empty() {
        bail!("Empty passphrase not allowed");
    }
    if confirm {
        let again = rpassword::prompt_password("Confirm passphrase: ")
            .context("Failed to read passphrase")?;
        if passphrase != again {
            bail!("Passphrases do not match");
        }
    }
    Ok(passphrase)
}

async fn cmd_scan(warden: &Warden, stream: bool, json: bool) -> Result<()> {
    if stream {
        let mut rx = warden.scan_stream();
        while let Some(event) = rx.recv().await {
            match event {
                ScanEvent::Batch { detector, added } => {
                    for entry in &added {
                        println!("  [{}] {}", detector, entry.path.display());
                    }
                }
                ScanEvent::Done {
                    total_added,
                    failed_detectors,
                } => {
                    for failed in &failed_detectors {
                        println!("warning: {} detector failed", failed);
                    }
                    println!("success: Scan complete, {} new entries", total_added);
                }
            }
        }
        return Ok(());
    }

    let outcome = warden.scan_once().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.added)?);
        return Ok(());
    }

    for failed in &outcome.failed_detectors {
        println!("warning: {} detector failed", failed);
    }
    if outcome.added.is_empty() {
        println!("No new entries; catalog unchanged");
    } else {
        for entry in &outcome.added {
            let tag = entry.detected_by.as_deref().unwrap_or("manual");
            println!("  [{}] {}", tag, entry.path.display());
        }
        println!("success: Found {} new entries", outcome.added.len());
    }
    Ok(())
}

async fn cmd_list(warden: &Warden, json: bool) -> Result<()> {
    let entries = warden.entries().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No tracked entries. Run: keywarden scan");
        return Ok(());
    }

    println!("Tracked Entries");
    println!();
    for entry in &entries {
        let state = if entry.encrypted {
            "encrypted"
        } else {
            "plaintext"
        };
        println!(
            "  {:9} {:9} {}",
            entry.kind.as_str(),
            state,
            entry.path.display()
        );
    }
    Ok(())
}

async fn cmd_add(warden: &Warden, path: &PathBuf) -> Result<()> {
    let entry = warden.add_path(path).await?;
    println!("success: Tracking {}", entry.path.display());
    Ok(())
}

async fn cmd_remove(warden: &Warden, path: &PathBuf) -> Result<()> {
    if warden.remove_entry(path).await? {
        println!("success: No longer tracking {}", path.display());
    } else {
        println!("warning: Not tracked: {}", path.display());
    }
    Ok(())
}

async fn cmd_encrypt(warden: &Warden, path: &PathBuf, passphrase: Option<String>) -> Result<()> {
    let passphrase = read_passphrase(passphrase, true)?;
    let new_path = warden.encrypt(path, &passphrase).await?;
    println!("success: Encrypted to {}", new_path.display());
    Ok(())
}

async fn cmd_decrypt(warden: &Warden, path: &PathBuf, passphrase: Option<String>) -> Result<()> {
    let passphrase = read_passphrase(passphrase, false)?;
    let new_path = warden.decrypt(path, &passphrase).await?;
    println!("success: Decrypted to {}", new_path.display());
    Ok(())
}

fn cmd_status(warden: &Warden, path: &PathBuf) -> Result<()> {
    let status = warden.check_status(path);
    println!(
        "{}: {}",
        path.display(),
        if status.exists { "exists" } else { "missing" }
    );
    if status.conflict {
        println!("warning: plaintext and encrypted forms both exist; resolve before transforming");
    }
    Ok(())
}

async fn cmd_backup(warden: &Warden, encrypt: bool, passphrase: Option<String>) -> Result<()> {
    let passphrase = if encrypt {
        Some(read_passphrase(passphrase, true)?)
    } else {
        None
    };

    let outcome = warden.create_backup(passphrase.as_deref()).await?;
    let size = fs::metadata(&outcome.archive_path).map(|m| m.len()).unwrap_or(0);

    println!(
        "success: Backup written to {} ({}, {} files, {} skipped{})",
        outcome.archive_path.display(),
        format_size(size),
        outcome.files_added,
        outcome.files_skipped,
        if outcome.encrypted { ", encrypted" } else { "" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["keywarden", "scan", "--stream"]).unwrap();
        if let Some(Commands::Scan { stream, json }) = cli.command {
            assert!(stream);
            assert!(!json);
        } else {
            panic!("Expected Scan command");
        }

        let cli = Cli::try_parse_from(["keywarden", "encrypt", "/tmp/x", "--passphrase", "k"])
            .unwrap();
        if let Some(Commands::Encrypt { path, passphrase }) = cli.command {
            assert_eq!(path, PathBuf::from("/tmp/x"));
            assert_eq!(passphrase.as_deref(), Some("k"));
        } else {
            panic!("Expected Encrypt command");
        }

        let cli = Cli::try_parse_from(["keywarden", "backup", "--encrypt"]).unwrap();
        if let Some(Commands::Backup {
            encrypt,
            passphrase,
        }) = cli.command
        {
            assert!(encrypt);
            assert!(passphrase.is_none());
        } else {
            panic!("Expected Backup command");
        }
    }

    #[test]
    fn test_cli_default_is_list() {
        let cli = Cli::try_parse_from(["keywarden"]).unwrap();
        assert!(cli.command.is_none());
    }
}
