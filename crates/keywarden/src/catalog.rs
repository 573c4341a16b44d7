//! Catalog - the persisted set of tracked entries
//!
//! The catalog is the single source of truth the UI queries. It is loaded
//! once at startup, mutated in memory, and fully rewritten to disk after
//! every mutation; there is no in-place patching. A missing catalog file is
//! an empty catalog, not an error.
//!
//! Identity is the normalized path: forward slashes, case-folded on
//! platforms with case-insensitive filesystems. At most one entry exists
//! per normalized path; inserting a duplicate is a no-op.

use crate::error::WardenError;
use crate::naming;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What a catalog entry denotes on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
        }
    }

    /// Kind for a path as it currently exists on disk. An encrypted
    /// directory archive is a regular file but stays Directory-kind so the
    /// reverse transition knows what to rebuild.
    pub fn of(path: &Path) -> Self {
        if path.is_dir() || naming::is_dir_archive_name(path) {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

/// One tracked sensitive filesystem object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub encrypted: bool,
    /// Which detector produced the entry; diagnostics only, never identity
    #[serde(
        rename = "detectedBy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub detected_by: Option<String>,
}

impl CatalogEntry {
    pub fn new(path: PathBuf, kind: EntryKind, encrypted: bool) -> Self {
        Self {
            path,
            kind,
            encrypted,
            detected_by: None,
        }
    }

    pub fn detected(path: PathBuf, encrypted: bool, tag: &str) -> Self {
        Self {
            kind: EntryKind::of(&path),
            path,
            encrypted,
            detected_by: Some(tag.to_string()),
        }
    }

    pub fn normalized(&self) -> String {
        normalize_path(&self.path)
    }
}

/// Normalized form used for identity comparison: platform separators become
/// `/`, and the whole path is case-folded where the platform's filesystems
/// are case-insensitive.
pub fn normalize_path(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if cfg!(any(windows, target_os = "macos")) {
        s.to_lowercase()
    } else {
        s
    }
}

/// In-memory catalog: an ordered, deduplicated list of entries
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a loaded list, dropping duplicates that may have crept
    /// into the file out-of-band.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut catalog = Self::new();
        for entry in entries {
            catalog.insert(entry);
        }
        catalog
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    pub fn get(&self, path: &Path) -> Option<&CatalogEntry> {
        let key = normalize_path(path);
        self.entries.iter().find(|e| e.normalized() == key)
    }

    /// Insert an entry; a duplicate (by normalized path) is a no-op.
    /// Returns whether the entry was actually added.
    pub fn insert(&mut self, entry: CatalogEntry) -> bool {
        if self.contains(&entry.path) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Merge a batch of candidates, returning the entries that were new.
    pub fn merge(&mut self, batch: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
        let mut added = Vec::new();
        for entry in batch {
            if self.insert(entry.clone()) {
                added.push(entry);
            }
        }
        added
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        let key = normalize_path(path);
        let before = self.entries.len();
        self.entries.retain(|e| e.normalized() != key);
        self.entries.len() != before
    }

    /// Apply a transition result as one logical update: the old entry (if
    /// tracked) goes away, the new entry takes its place.
    pub fn replace(&mut self, old_path: &Path, new_entry: CatalogEntry) {
        self.remove(old_path);
        self.remove(&new_entry.path);
        self.entries.push(new_entry);
    }
}

/// On-disk catalog store
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Catalog, WardenError> {
        if !self.path.exists() {
            return Ok(Catalog::new());
        }
        let data = fs::read_to_string(&self.path)?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&data)?;
        Ok(Catalog::from_entries(entries))
    }

    pub fn save(&self, catalog: &Catalog) -> Result<(), WardenError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(catalog.entries())?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> CatalogEntry {
        CatalogEntry::new(PathBuf::from(path), EntryKind::File, false)
    }

    #[test]
    fn test_insert_dedup() {
        let mut catalog = Catalog::new();
        assert!(catalog.insert(entry("/home/u/.ssh/id_rsa")));
        assert!(!catalog.insert(entry("/home/u/.ssh/id_rsa")));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_dedup_alternate_separators() {
        let mut catalog = Catalog::new();
        assert!(catalog.insert(entry("/home/u/.aws/credentials")));
        assert!(!catalog.insert(entry("\\home\\u\\.aws\\credentials")));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("\\home\\u\\x")),
            normalize_path(Path::new("/home/u/x"))
        );
    }

    #[test]
    fn test_merge_reports_new_only() {
        let mut catalog = Catalog::new();
        catalog.insert(entry("/a"));
        let added = catalog.merge(vec![entry("/a"), entry("/b"), entry("/b")]);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].path, PathBuf::from("/b"));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_replace_is_single_update() {
        let mut catalog = Catalog::new();
        catalog.insert(entry("/h/secret.txt"));
        catalog.replace(
            Path::new("/h/secret.txt"),
            CatalogEntry::new(
                PathBuf::from("/h/secret_cyphered.txt"),
                EntryKind::File,
                true,
            ),
        );
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains(Path::new("/h/secret_cyphered.txt")));
        assert!(!catalog.contains(Path::new("/h/secret.txt")));
    }

    #[test]
    fn test_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("catalog.json"));
        let catalog = store.load().unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("catalog.json"));

        let mut catalog = Catalog::new();
        catalog.insert(CatalogEntry::detected(
            PathBuf::from("/h/.ssh/id_rsa"),
            false,
            "known_directories",
        ));
        catalog.insert(CatalogEntry::new(
            PathBuf::from("/h/.ssh_cypheredd.zip"),
            EntryKind::Directory,
            true,
        ));
        store.save(&catalog).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        let first = loaded.get(Path::new("/h/.ssh/id_rsa")).unwrap();
        assert_eq!(first.kind, EntryKind::File);
        assert_eq!(first.detected_by.as_deref(), Some("known_directories"));
        let second = loaded.get(Path::new("/h/.ssh_cypheredd.zip")).unwrap();
        assert_eq!(second.kind, EntryKind::Directory);
        assert!(second.encrypted);
    }

    #[test]
    fn test_serialized_shape() {
        let entry = CatalogEntry::new(PathBuf::from("/h/x"), EntryKind::Directory, false);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"directory\""));
        assert!(!json.contains("detectedBy"));
    }
}
