//! Cipher transitions
//!
//! A transition converts one tracked path between its plaintext and
//! encrypted form: validate, transform, settle, then remove the old form.
//! The contract is that the secret exists in at least one form at every
//! instant: the new form must be written before the old form is touched,
//! and any failure between those two steps deletes the just-written
//! artifact so the filesystem never diverges into two live copies.
//!
//! The settling delay between writing and deleting papers over
//! handle-release races seen on some platforms. It is a fixed wait, not a
//! retry loop, and it is tunable through [`EngineConfig`].

use crate::catalog::{normalize_path, EntryKind};
use crate::cipher::PassphraseCipher;
use crate::error::WardenError;
use crate::naming::{self, EncryptedForm};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Engine tunables
pub struct EngineConfig {
    /// Wait between writing the new form and deleting the old form
    pub settle_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(400),
        }
    }
}

/// A completed transition, ready to be applied to the catalog
#[derive(Debug)]
pub struct Transition {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub kind: EntryKind,
    pub encrypted: bool,
}

/// Existence and conflict state of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStatus {
    pub exists: bool,
    /// Both the plaintext and the encrypted sibling exist simultaneously
    pub conflict: bool,
}

/// Performs encrypt/decrypt transitions, one per tracked entry at a time
pub struct CipherEngine {
    settle_delay: Duration,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl CipherEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            settle_delay: config.settle_delay,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Encrypt a file or directory in place. On success the plaintext is
    /// gone and the returned transition points at the encrypted artifact.
    pub async fn encrypt(&self, path: &Path, passphrase: &str) -> Result<Transition, WardenError> {
        let meta = fs::metadata(path).map_err(|_| WardenError::PathNotFound(path.to_path_buf()))?;
        let is_dir = meta.is_dir();
        let target = naming::encrypted_sibling(path, is_dir);

        let _guard = self.claim(path, &target)?;
        if target.exists() {
            return Err(WardenError::Conflict(target));
        }

        debug!("encrypting {} -> {}", path.display(), target.display());
        let cipher = PassphraseCipher::new(passphrase);

        if is_dir {
            let staging = staging_path(&target);
            let packed =
                pack_directory(path, &staging).and_then(|()| fs::read(&staging).map_err(WardenError::from));
            let _ = fs::remove_file(&staging);
            let framed = cipher.encrypt_binary(&packed?);
            if let Err(err) = fs::write(&target, &framed) {
                return Err(self.undo_target(&target, false, err.into()));
            }
        } else {
            let content = fs::read(path)?;
            let framed = cipher.encrypt_text(&content);
            if let Err(err) = fs::write(&target, framed.as_bytes()) {
                return Err(self.undo_target(&target, false, err.into()));
            }
        }

        self.settle_and_remove(path, is_dir, &target, false).await?;

        Ok(Transition {
            old_path: path.to_path_buf(),
            new_path: target,
            kind: if is_dir {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            encrypted: true,
        })
    }

    /// Decrypt an encrypted artifact in place. The framing is decided by
    /// the artifact's name, never by probing its content.
    pub async fn decrypt(&self, path: &Path, passphrase: &str) -> Result<Transition, WardenError> {
        if !path.exists() {
            return Err(WardenError::PathNotFound(path.to_path_buf()));
        }
        let form = naming::classify(path).ok_or_else(|| {
            WardenError::MalformedCiphertext("path name carries no cyphered marker".into())
        })?;
        let dest = naming::decrypted_sibling(path);

        let _guard = self.claim(path, &dest)?;
        if dest.exists() {
            return Err(WardenError::Conflict(dest));
        }

        debug!("decrypting {} -> {}", path.display(), dest.display());
        let cipher = PassphraseCipher::new(passphrase);

        match form {
            EncryptedForm::DirArchive => {
                let framed = fs::read(path)?;
                let archive_bytes = cipher.decrypt_binary(&framed)?;
                if let Err(err) = unpack_archive(&archive_bytes, &dest) {
                    return Err(self.undo_target(&dest, true, err));
                }
                self.settle_and_remove(path, false, &dest, true).await?;
                Ok(Transition {
                    old_path: path.to_path_buf(),
                    new_path: dest,
                    kind: EntryKind::Directory,
                    encrypted: false,
                })
            }
            EncryptedForm::File => {
                let framed = fs::read_to_string(path).map_err(|err| {
                    if err.kind() == ErrorKind::InvalidData {
                        WardenError::MalformedCiphertext("framing is not UTF-8 text".into())
                    } else {
                        WardenError::Io(err)
                    }
                })?;
                let content = cipher.decrypt_text(framed.trim())?;
                if let Err(err) = fs::write(&dest, &content) {
                    return Err(self.undo_target(&dest, false, err.into()));
                }
                self.settle_and_remove(path, false, &dest, false).await?;
                Ok(Transition {
                    old_path: path.to_path_buf(),
                    new_path: dest,
                    kind: EntryKind::File,
                    encrypted: false,
                })
            }
        }
    }

    /// Claim the source and target paths for the duration of a transition.
    /// A second transition touching either path is refused, which keeps
    /// encrypt and decrypt from racing on one logical secret.
    fn claim(&self, source: &Path, target: &Path) -> Result<FlightGuard, WardenError> {
        let keys = vec![normalize_path(source), normalize_path(target)];
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if keys.iter().any(|key| in_flight.contains(key)) {
            return Err(WardenError::Busy(source.to_path_buf()));
        }
        for key in &keys {
            in_flight.insert(key.clone());
        }
        Ok(FlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            keys,
        })
    }

    /// Settle, then remove the old form; on failure the new form is undone
    /// so the entry does not end up duplicated.
    async fn settle_and_remove(
        &self,
        source: &Path,
        source_is_dir: bool,
        target: &Path,
        target_is_dir: bool,
    ) -> Result<(), WardenError> {
        tokio::time::sleep(self.settle_delay).await;

        let removal = if source_is_dir {
            fs::remove_dir_all(source)
        } else {
            fs::remove_file(source)
        };
        if let Err(err) = removal {
            return Err(self.undo_target(target, target_is_dir, err.into()));
        }
        Ok(())
    }

    /// Best-effort removal of a freshly written target after a failure. A
    /// secondary failure here is reported alongside the primary error, not
    /// in place of it.
    fn undo_target(&self, target: &Path, target_is_dir: bool, primary: WardenError) -> WardenError {
        let cleanup = if target_is_dir {
            fs::remove_dir_all(target)
        } else {
            fs::remove_file(target)
        };
        match cleanup {
            Ok(()) => primary,
            Err(err) if err.kind() == ErrorKind::NotFound => primary,
            Err(err) => {
                warn!("rollback could not remove {}: {err}", target.display());
                WardenError::Rollback {
                    source: Box::new(primary),
                    cleanup: err.to_string(),
                }
            }
        }
    }
}

struct FlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    keys: Vec<String>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            in_flight.remove(key);
        }
    }
}

/// Existence / conflict report for a path and its sibling.
pub fn check_status(path: &Path) -> PathStatus {
    let exists = path.exists();
    let conflict = match naming::classify(path) {
        Some(_) => exists && naming::decrypted_sibling(path).exists(),
        None => {
            exists
                && (naming::encrypted_sibling(path, false).exists()
                    || naming::encrypted_sibling(path, true).exists()
                    || naming::legacy_encrypted_sibling(path).exists())
        }
    };
    PathStatus { exists, conflict }
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".partial");
    target.with_file_name(name)
}

/// Archive a directory tree into a gzip-compressed tar at maximum
/// compression, members named relative to the directory itself.
fn pack_directory(source: &Path, staging: &Path) -> Result<(), WardenError> {
    let file = File::create(staging)?;
    let encoder = GzEncoder::new(file, Compression::best());
    let mut archive = tar::Builder::new(encoder);

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if path == source {
            continue;
        }
        let rel = match path.strip_prefix(source) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        if entry.file_type().is_file() {
            archive.append_path_with_name(path, &rel)?;
        } else if entry.file_type().is_dir() {
            archive.append_dir(&rel, path)?;
        }
    }

    let encoder = archive.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Extract a recovered archive into the destination directory. Garbage
/// that survived unpadding by chance fails here and is reported as a wrong
/// passphrase, the same as an unpadding failure.
fn unpack_archive(archive_bytes: &[u8], dest: &Path) -> Result<(), WardenError> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(archive_bytes));
    archive.unpack(dest).map_err(|err| match err.kind() {
        ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::UnexpectedEof => {
            WardenError::InvalidPassphrase
        }
        _ => WardenError::Io(err),
    })?;
    Ok(())
}
