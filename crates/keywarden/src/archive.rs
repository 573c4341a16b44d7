//! Archival backup snapshots
//!
//! One backup is a single compressed archive holding every catalog entry
//! that is currently an existing regular file, plus a serialized snapshot
//! of the catalog itself. Member names keep the entry's path relative to
//! its filesystem root, so entries from different roots cannot collide.

use crate::catalog::Catalog;
use crate::cipher::PassphraseCipher;
use crate::error::WardenError;
use crate::naming;
use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Archive member holding the catalog snapshot
const CATALOG_MEMBER: &str = "catalog.json";

/// Result of a backup run
#[derive(Debug)]
pub struct BackupOutcome {
    pub archive_path: PathBuf,
    pub files_added: usize,
    pub files_skipped: usize,
    pub encrypted: bool,
}

/// Member name for an absolute path: the path relative to its root, with
/// any drive prefix dropped.
fn member_name(path: &Path) -> PathBuf {
    let mut member = PathBuf::new();
    for component in path.components() {
        if let Component::Normal(part) = component {
            member.push(part);
        }
    }
    member
}

fn archive_file_name() -> String {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    format!("keywarden-backup-{timestamp}.tar.gz")
}

/// Build a point-in-time backup of the catalog. Directories and missing
/// entries are skipped, not failed; an unreadable file is logged and
/// skipped. An empty catalog is a hard failure. With a passphrase the
/// whole archive is re-encrypted, the plaintext archive deleted, and the
/// encrypted artifact returned instead.
pub fn create_backup(
    catalog: &Catalog,
    backup_dir: &Path,
    passphrase: Option<&str>,
) -> Result<BackupOutcome, WardenError> {
    if catalog.is_empty() {
        return Err(WardenError::EmptyCatalog);
    }
    fs::create_dir_all(backup_dir)?;

    let archive_path = backup_dir.join(archive_file_name());
    let file = File::create(&archive_path)?;
    let encoder = GzEncoder::new(file, Compression::best());
    let mut builder = tar::Builder::new(encoder);

    let mut files_added = 0;
    let mut files_skipped = 0;
    for entry in catalog.entries() {
        if !entry.path.is_file() {
            files_skipped += 1;
            continue;
        }
        let member = member_name(&entry.path);
        match builder.append_path_with_name(&entry.path, &member) {
            Ok(()) => files_added += 1,
            Err(err) => {
                warn!("backup: skipping {}: {err}", entry.path.display());
                files_skipped += 1;
            }
        }
    }

    let snapshot = serde_json::to_vec_pretty(catalog.entries())?;
    let mut header = tar::Header::new_gnu();
    header.set_size(snapshot.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, CATALOG_MEMBER, snapshot.as_slice())?;

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    debug!(
        "backup wrote {} ({files_added} files, {files_skipped} skipped)",
        archive_path.display()
    );

    let Some(passphrase) = passphrase else {
        return Ok(BackupOutcome {
            archive_path,
            files_added,
            files_skipped,
            encrypted: false,
        });
    };

    let cipher = PassphraseCipher::new(passphrase);
    let plain = fs::read(&archive_path)?;
    let framed = cipher.encrypt_binary(&plain);
    let target = naming::encrypted_sibling(&archive_path, false);
    if let Err(err) = fs::write(&target, &framed) {
        let _ = fs::remove_file(&target);
        return Err(err.into());
    }
    fs::remove_file(&archive_path)?;

    Ok(BackupOutcome {
        archive_path: target,
        files_added,
        files_skipped,
        encrypted: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, EntryKind};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn tracked(path: PathBuf, kind: EntryKind) -> CatalogEntry {
        CatalogEntry::new(path, kind, false)
    }

    fn read_members(archive_path: &Path) -> Vec<(String, Vec<u8>)> {
        let file = File::open(archive_path).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut members = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            members.push((name, content));
        }
        members
    }

    #[test]
    fn test_empty_catalog_is_hard_failure() {
        let data = tempfile::tempdir().unwrap();
        let err = create_backup(&Catalog::new(), data.path(), None).unwrap_err();
        assert!(matches!(err, WardenError::EmptyCatalog));
    }

    #[test]
    fn test_backup_members_and_snapshot() {
        let home = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();

        let key = home.path().join("id_rsa");
        fs::write(&key, b"key material").unwrap();
        let missing = home.path().join("gone");
        let subdir = home.path().join(".ssh");
        fs::create_dir_all(&subdir).unwrap();

        let mut catalog = Catalog::new();
        catalog.insert(tracked(key.clone(), EntryKind::File));
        catalog.insert(tracked(missing, EntryKind::File));
        catalog.insert(tracked(subdir, EntryKind::Directory));

        let outcome = create_backup(&catalog, data.path(), None).unwrap();
        assert!(!outcome.encrypted);
        assert_eq!(outcome.files_added, 1);
        assert_eq!(outcome.files_skipped, 2);

        let members = read_members(&outcome.archive_path);
        let expected_member = member_name(&key).to_string_lossy().into_owned();
        assert!(members.iter().any(|(name, content)| {
            name == &expected_member && content == b"key material"
        }));

        let (_, snapshot) = members
            .iter()
            .find(|(name, _)| name == CATALOG_MEMBER)
            .unwrap();
        let entries: Vec<CatalogEntry> = serde_json::from_slice(snapshot).unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn test_encrypted_backup() {
        let home = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();

        let key = home.path().join("id_rsa");
        fs::write(&key, b"key material").unwrap();
        let mut catalog = Catalog::new();
        catalog.insert(tracked(key, EntryKind::File));

        let outcome = create_backup(&catalog, data.path(), Some("pass")).unwrap();
        assert!(outcome.encrypted);
        let name = outcome
            .archive_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(name.contains("_cyphered"));
        assert!(name.ends_with(".gz"));

        // The plaintext archive is gone and the artifact decrypts back to
        // a gzip stream
        let plain_name = name.replacen("_cyphered", "", 1);
        assert!(!data.path().join(plain_name).exists());

        let framed = fs::read(&outcome.archive_path).unwrap();
        let recovered = PassphraseCipher::new("pass")
            .decrypt_binary(&framed)
            .unwrap();
        assert_eq!(&recovered[..2], &[0x1f, 0x8b]);
    }
}
