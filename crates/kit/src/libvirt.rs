//! libvirt implementation of the storage backend
//!
//! Thin mapping from [`StorageBackend`] onto the `virt` bindings. The only
//! logic here is translating libvirt error codes into [`DaemonErrorKind`].

use camino::Utf8PathBuf;
use tracing::{debug, instrument};
use virt::{
    connect::Connect,
    error::ErrorNumber,
    storage_pool::StoragePool,
    storage_vol::StorageVol,
    stream::Stream,
    sys::{VIR_STORAGE_POOL_BUILD_NEW, VIR_STORAGE_VOL_RESIZE_SHRINK},
};

use crate::backend::{
    DaemonError, DaemonErrorKind, DaemonResult, StorageBackend, UploadStream, VolumeInfo,
};
use crate::error::{Result, UploadError};
use crate::xml;

impl From<virt::error::Error> for DaemonError {
    fn from(e: virt::error::Error) -> Self {
        let kind = match e.code() {
            ErrorNumber::NoStoragePool => DaemonErrorKind::NoSuchPool,
            ErrorNumber::NoStorageVolume => DaemonErrorKind::NoSuchVolume,
            _ => DaemonErrorKind::Other,
        };
        DaemonError::new(kind, e.to_string())
    }
}

/// An open connection to libvirtd.
///
/// The connection is closed when this value is dropped.
pub struct Libvirt {
    conn: Connect,
}

impl std::fmt::Debug for Libvirt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let uri = self.conn.get_uri().unwrap_or_default();
        f.debug_struct("Libvirt").field("uri", &uri).finish()
    }
}

impl Libvirt {
    /// Connect to `uri`, or to libvirt's default URI if none is given.
    #[instrument]
    pub fn open(uri: Option<&str>) -> Result<Self> {
        let conn = Connect::open(uri).map_err(|e| UploadError::Connection {
            uri: uri.unwrap_or("default").to_owned(),
            source: e.into(),
        })?;
        if let Ok(uri) = conn.get_uri() {
            debug!("Connected to {uri}");
        }
        Ok(Self { conn })
    }
}

/// A libvirt stream in upload mode
pub struct LibvirtStream(Stream);

impl UploadStream for LibvirtStream {
    fn send(&mut self, data: &[u8]) -> DaemonResult<usize> {
        Ok(self.0.send(data)?)
    }

    fn finish(self) -> DaemonResult<()> {
        Ok(self.0.finish()?)
    }

    fn abort(self) -> DaemonResult<()> {
        Ok(self.0.abort()?)
    }
}

impl StorageBackend for Libvirt {
    type Pool = StoragePool;
    type Volume = StorageVol;
    type Stream = LibvirtStream;

    fn lookup_pool(&self, name: &str) -> DaemonResult<StoragePool> {
        Ok(StoragePool::lookup_by_name(&self.conn, name)?)
    }

    fn define_pool(&self, xml: &str) -> DaemonResult<StoragePool> {
        Ok(StoragePool::define_xml(&self.conn, xml, 0)?)
    }

    fn build_pool(&self, pool: &StoragePool) -> DaemonResult<()> {
        pool.build(VIR_STORAGE_POOL_BUILD_NEW)?;
        Ok(())
    }

    fn pool_is_active(&self, pool: &StoragePool) -> DaemonResult<bool> {
        Ok(pool.is_active()?)
    }

    fn start_pool(&self, pool: &StoragePool) -> DaemonResult<()> {
        pool.create(0)?;
        Ok(())
    }

    fn set_pool_autostart(&self, pool: &StoragePool, autostart: bool) -> DaemonResult<()> {
        pool.set_autostart(autostart)?;
        Ok(())
    }

    fn pool_target_path(&self, pool: &StoragePool) -> DaemonResult<Option<Utf8PathBuf>> {
        let desc = pool.get_xml_desc(0)?;
        Ok(xml::pool_target_path(&desc))
    }

    fn lookup_volume(&self, pool: &StoragePool, name: &str) -> DaemonResult<StorageVol> {
        Ok(StorageVol::lookup_by_name(pool, name)?)
    }

    fn create_volume(&self, pool: &StoragePool, xml: &str) -> DaemonResult<StorageVol> {
        Ok(StorageVol::create_xml(pool, xml, 0)?)
    }

    fn delete_volume(&self, volume: StorageVol) -> DaemonResult<()> {
        volume.delete(0)?;
        Ok(())
    }

    fn volume_info(&self, volume: &StorageVol) -> DaemonResult<VolumeInfo> {
        let info = volume.get_info()?;
        Ok(VolumeInfo {
            capacity: info.capacity,
            allocation: info.allocation,
        })
    }

    fn resize_volume(
        &self,
        volume: &StorageVol,
        capacity: u64,
        allow_shrink: bool,
    ) -> DaemonResult<()> {
        let flags = if allow_shrink {
            VIR_STORAGE_VOL_RESIZE_SHRINK
        } else {
            0
        };
        volume.resize(capacity, flags)?;
        Ok(())
    }

    fn new_stream(&self) -> DaemonResult<LibvirtStream> {
        Ok(LibvirtStream(Stream::new(&self.conn, 0)?))
    }

    fn bind_upload(
        &self,
        volume: &StorageVol,
        stream: &LibvirtStream,
        offset: u64,
        length: u64,
    ) -> DaemonResult<()> {
        volume.upload(&stream.0, offset, length, 0)?;
        Ok(())
    }
}
