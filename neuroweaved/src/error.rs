use std::io;
use std::path::PathBuf;

use neuroweave::error::NetworkError;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("could not determine data directory")]
    NoDataDir,

    #[error("{path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("network file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("network image {path:?}: {source}")]
    Image { path: PathBuf, source: NetworkError },

    #[error("invalid config {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },
}
