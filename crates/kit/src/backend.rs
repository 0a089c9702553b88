//! The storage management capabilities poolup consumes
//!
//! Provisioning and upload logic is written against [`StorageBackend`] rather
//! than the libvirt bindings directly, so the same sequence runs against the
//! real daemon ([`crate::libvirt::Libvirt`]) and an in-memory fake in tests.

use camino::Utf8PathBuf;

/// Classification of a daemon failure.
///
/// Only the two "not found" conditions are ever recovered from; everything
/// else is reported as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonErrorKind {
    NoSuchPool,
    NoSuchVolume,
    Other,
}

/// An error reported by the storage management daemon.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct DaemonError {
    kind: DaemonErrorKind,
    message: String,
}

impl DaemonError {
    pub fn new(kind: DaemonErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// True if the daemon reported that the requested storage pool does not exist
    pub fn is_no_such_pool(&self) -> bool {
        self.kind == DaemonErrorKind::NoSuchPool
    }

    /// True if the daemon reported that the requested storage volume does not exist
    pub fn is_no_such_volume(&self) -> bool {
        self.kind == DaemonErrorKind::NoSuchVolume
    }
}

pub type DaemonResult<T> = std::result::Result<T, DaemonError>;

/// Size information for a volume, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub capacity: u64,
    pub allocation: u64,
}

/// A byte stream bound to a volume upload.
pub trait UploadStream {
    /// Send some bytes, returning how many the daemon accepted.
    fn send(&mut self, data: &[u8]) -> DaemonResult<usize>;

    /// Commit the transfer.
    fn finish(self) -> DaemonResult<()>;

    /// Abandon the transfer after a local failure.
    fn abort(self) -> DaemonResult<()>;
}

/// Pool and volume operations of a storage management daemon.
///
/// Handles are owned values; dropping one releases the daemon-side reference.
pub trait StorageBackend {
    type Pool;
    type Volume;
    type Stream: UploadStream;

    fn lookup_pool(&self, name: &str) -> DaemonResult<Self::Pool>;

    /// Define (but do not start) a persistent pool from its XML descriptor.
    fn define_pool(&self, xml: &str) -> DaemonResult<Self::Pool>;

    /// Build the on-disk layout of a freshly defined pool.
    fn build_pool(&self, pool: &Self::Pool) -> DaemonResult<()>;

    fn pool_is_active(&self, pool: &Self::Pool) -> DaemonResult<bool>;

    fn start_pool(&self, pool: &Self::Pool) -> DaemonResult<()>;

    fn set_pool_autostart(&self, pool: &Self::Pool, autostart: bool) -> DaemonResult<()>;

    /// The target path recorded in the pool's definition, if it has one.
    fn pool_target_path(&self, pool: &Self::Pool) -> DaemonResult<Option<Utf8PathBuf>>;

    fn lookup_volume(&self, pool: &Self::Pool, name: &str) -> DaemonResult<Self::Volume>;

    fn create_volume(&self, pool: &Self::Pool, xml: &str) -> DaemonResult<Self::Volume>;

    fn delete_volume(&self, volume: Self::Volume) -> DaemonResult<()>;

    fn volume_info(&self, volume: &Self::Volume) -> DaemonResult<VolumeInfo>;

    /// Resize a volume to `capacity` bytes; `allow_shrink` permits truncation.
    fn resize_volume(
        &self,
        volume: &Self::Volume,
        capacity: u64,
        allow_shrink: bool,
    ) -> DaemonResult<()>;

    /// Open a new byte stream on the management connection.
    fn new_stream(&self) -> DaemonResult<Self::Stream>;

    /// Bind the volume's upload surface to `stream` for `length` bytes at `offset`.
    fn bind_upload(
        &self,
        volume: &Self::Volume,
        stream: &Self::Stream,
        offset: u64,
        length: u64,
    ) -> DaemonResult<()>;
}
