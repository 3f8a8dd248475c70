use std::fs;
use std::path::{Path, PathBuf};

use cairn_log::SyncMode;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Settings shared by every store opened with them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `<name>.data` and `<name>.idx`.
    pub root: PathBuf,
    /// Keep an index snapshot next to the data file.
    pub persist_index: bool,
    /// Durability of each append.
    pub sync_mode: SyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            persist_index: true,
            sync_mode: SyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Default settings rooted at `root`.
    pub fn in_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Load a TOML configuration file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn data_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.data"))
    }

    pub fn index_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.idx"))
    }
}
