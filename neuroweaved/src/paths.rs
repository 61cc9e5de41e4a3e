//! Cross-platform application paths

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DaemonError;

#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self, DaemonError> {
        let base = dirs::data_dir().ok_or(DaemonError::NoDataDir)?;
        Self::at(base.join("neuroweave"))
    }

    /// Rooted at an explicit directory, created if missing.
    pub fn at(data_dir: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|source| DaemonError::Io {
            path: data_dir.clone(),
            source,
        })?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn network_file(&self) -> PathBuf {
        self.data_dir.join("network.nwv")
    }

    /// Optional JSON `NetworkConfig`; missing fields use defaults.
    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }
}
