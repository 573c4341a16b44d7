//! keywarden - Local secret discovery and at-rest encryption
//!
//! Finds locally-stored secrets (SSH keys, cloud credentials, tokens,
//! `.env` files), tracks them in a persistent catalog, and reversibly
//! converts each tracked entry between plaintext and encrypted-at-rest
//! form, with archival backup.
//!
//! The pieces:
//! - [`naming`]: the file-name convention that marks encrypted artifacts
//! - [`detect`]: six independent detection strategies
//! - [`orchestrate`]: batch and streaming scans feeding the catalog
//! - [`catalog`]: the persisted, deduplicated set of tracked entries
//! - [`engine`]: the encrypt/decrypt transition with settling and rollback
//! - [`archive`]: point-in-time backup snapshots
//!
//! [`Warden`] wires them together behind the operations a front end needs.

pub mod archive;
pub mod catalog;
pub mod cipher;
pub mod detect;
pub mod engine;
pub mod error;
pub mod naming;
pub mod orchestrate;

pub use archive::BackupOutcome;
pub use catalog::{Catalog, CatalogEntry, CatalogStore, EntryKind};
pub use engine::{CipherEngine, EngineConfig, PathStatus, Transition};
pub use error::WardenError;
pub use orchestrate::{ScanEvent, ScanOutcome};

use keywarden_core::Paths;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// The discovery-and-transformation service: owns the catalog, the cipher
/// engine and the scan root, and exposes the operations a front end calls.
pub struct Warden {
    home: PathBuf,
    backup_dir: PathBuf,
    store: Arc<CatalogStore>,
    catalog: Arc<Mutex<Catalog>>,
    engine: CipherEngine,
}

impl Warden {
    /// Open against the platform's standard locations.
    pub fn new(paths: &Paths) -> Result<Self, WardenError> {
        Self::open(paths.home.clone(), paths.data.clone())
    }

    /// Open with an explicit scan root and data directory. The catalog is
    /// loaded here, once; afterwards the in-memory copy is authoritative
    /// and every mutation rewrites the file.
    pub fn open(home: PathBuf, data_dir: PathBuf) -> Result<Self, WardenError> {
        Self::open_with_config(home, data_dir, EngineConfig::default())
    }

    pub fn open_with_config(
        home: PathBuf,
        data_dir: PathBuf,
        config: EngineConfig,
    ) -> Result<Self, WardenError> {
        let store = CatalogStore::new(data_dir.join("catalog.json"));
        let catalog = store.load()?;
        Ok(Self {
            home,
            backup_dir: data_dir.join("backups"),
            store: Arc::new(store),
            catalog: Arc::new(Mutex::new(catalog)),
            engine: CipherEngine::new(config),
        })
    }

    /// Snapshot of the tracked entries.
    pub async fn entries(&self) -> Vec<CatalogEntry> {
        self.catalog.lock().await.entries().to_vec()
    }

    /// Run every detector, wait for all of them, and merge once.
    pub async fn scan_once(&self) -> Result<ScanOutcome, WardenError> {
        orchestrate::scan_once(&self.home, Arc::clone(&self.catalog), &self.store).await
    }

    /// Run every detector, merging and reporting each one as it completes.
    pub fn scan_stream(&self) -> mpsc::Receiver<ScanEvent> {
        orchestrate::scan_stream(
            self.home.clone(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.store),
        )
    }

    /// Track a path the user picked by hand.
    pub async fn add_path(&self, path: &Path) -> Result<CatalogEntry, WardenError> {
        let path = absolutize(path)?;
        if !path.exists() {
            return Err(WardenError::PathNotFound(path));
        }
        let entry = CatalogEntry::new(
            path.clone(),
            EntryKind::of(&path),
            naming::is_encrypted_name(&path),
        );

        let mut catalog = self.catalog.lock().await;
        if catalog.insert(entry.clone()) {
            self.store.save(&catalog)?;
        }
        Ok(entry)
    }

    /// Stop tracking a path. The file itself is left alone.
    pub async fn remove_entry(&self, path: &Path) -> Result<bool, WardenError> {
        let mut catalog = self.catalog.lock().await;
        let removed = catalog.remove(path);
        if removed {
            self.store.save(&catalog)?;
        }
        Ok(removed)
    }

    /// Encrypt a file or directory in place and apply the result to the
    /// catalog as one logical update.
    pub async fn encrypt(&self, path: &Path, passphrase: &str) -> Result<PathBuf, WardenError> {
        let transition = self.engine.encrypt(path, passphrase).await?;
        self.apply(&transition).await?;
        Ok(transition.new_path)
    }

    /// Decrypt an encrypted artifact in place and apply the result to the
    /// catalog as one logical update.
    pub async fn decrypt(&self, path: &Path, passphrase: &str) -> Result<PathBuf, WardenError> {
        let transition = self.engine.decrypt(path, passphrase).await?;
        self.apply(&transition).await?;
        Ok(transition.new_path)
    }

    /// Existence and conflict state for a path.
    pub fn check_status(&self, path: &Path) -> PathStatus {
        engine::check_status(path)
    }

    /// Write a backup archive of every tracked file plus the catalog. An
    /// encrypted backup becomes a tracked entry itself.
    pub async fn create_backup(
        &self,
        passphrase: Option<&str>,
    ) -> Result<BackupOutcome, WardenError> {
        let mut catalog = self.catalog.lock().await;
        let outcome = archive::create_backup(&catalog, &self.backup_dir, passphrase)?;
        if outcome.encrypted {
            catalog.insert(CatalogEntry::new(
                outcome.archive_path.clone(),
                EntryKind::File,
                true,
            ));
            self.store.save(&catalog)?;
        }
        Ok(outcome)
    }

    async fn apply(&self, transition: &Transition) -> Result<(), WardenError> {
        let mut catalog = self.catalog.lock().await;
        catalog.replace(
            &transition.old_path,
            CatalogEntry::new(
                transition.new_path.clone(),
                transition.kind,
                transition.encrypted,
            ),
        );
        self.store.save(&catalog)
    }
}

fn absolutize(path: &Path) -> Result<PathBuf, WardenError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}
