//! Error taxonomy for pool provisioning and volume upload

use camino::Utf8PathBuf;

use crate::backend::DaemonError;

/// Failures of the provisioning and upload sequence.
///
/// Apart from the "no such pool" and "no such volume" lookups, which are
/// handled internally, every daemon failure ends up here unchanged.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to connect to libvirt ({uri}): {source}")]
    Connection {
        uri: String,
        #[source]
        source: DaemonError,
    },

    #[error("Cannot read source file {path}: {source}")]
    SourceNotFound {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create pool directory {path}: {source}")]
    Filesystem {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build storage pool '{pool}': {source}")]
    Build {
        pool: String,
        #[source]
        source: DaemonError,
    },

    #[error("Failed to start storage pool '{pool}': {source}")]
    Activation {
        pool: String,
        #[source]
        source: DaemonError,
    },

    #[error("Failed to transfer data to volume '{volume}': {source}")]
    Transfer {
        volume: String,
        #[source]
        source: DaemonError,
    },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Management(#[from] DaemonError),
}

pub type Result<T> = std::result::Result<T, UploadError>;
