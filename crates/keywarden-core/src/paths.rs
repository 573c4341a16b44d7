//! Standard paths used by Keywarden tools

use std::path::PathBuf;

/// Standard Keywarden paths
pub struct Paths {
    /// Home directory of the scanned user
    pub home: PathBuf,
    /// Data directory (~/.local/share/keywarden)
    pub data: PathBuf,
    /// Config directory (~/.config/keywarden)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("keywarden");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("keywarden");

        Self { home, data, config }
    }

    /// Path of the persisted catalog file
    pub fn catalog(&self) -> PathBuf {
        self.data.join("catalog.json")
    }

    /// Directory where backup archives are written
    pub fn backups(&self) -> PathBuf {
        self.data.join("backups")
    }
}
