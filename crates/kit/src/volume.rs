//! Volume creation and content upload
//!
//! A volume is (re)created or resized so its capacity matches the source
//! file exactly, then the file is streamed into it in fixed-size chunks.

use std::fs::File;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, instrument};

use crate::backend::{DaemonError, DaemonErrorKind, StorageBackend, UploadStream};
use crate::error::{Result, UploadError};
use crate::xml;

/// Size of each read from the source file and send to the daemon
pub const CHUNK_SIZE: usize = 128 * 1024;

/// How an existing volume with the destination name is dealt with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "kebab-case")]
pub enum VolumePolicy {
    /// Delete the existing volume and create a new one of the source's size
    #[default]
    Replace,
    /// Resize the existing volume to exactly the source's size, shrinking if needed;
    /// recreated instead when the new size is below its allocation
    Resize,
}

/// An opened source file and its size at open time
#[derive(Debug)]
pub struct SourceFile {
    path: Utf8PathBuf,
    file: File,
    size: u64,
}

impl SourceFile {
    pub fn open(path: &Utf8Path) -> Result<Self> {
        let not_found = |source| UploadError::SourceNotFound {
            path: path.to_owned(),
            source,
        };
        let file = File::open(path).map_err(not_found)?;
        let meta = file.metadata().map_err(not_found)?;
        if meta.is_dir() {
            return Err(not_found(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "is a directory",
            )));
        }
        Ok(Self {
            path: path.to_owned(),
            file,
            size: meta.len(),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Name and capacity of the volume to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub name: String,
    pub capacity: u64,
}

/// Streams local files into volumes of a provisioned pool
#[derive(Debug)]
pub struct VolumeUploader<'a, B> {
    backend: &'a B,
    policy: VolumePolicy,
}

impl<'a, B: StorageBackend> VolumeUploader<'a, B> {
    pub fn new(backend: &'a B, policy: VolumePolicy) -> Self {
        Self { backend, policy }
    }

    /// Replace the content of volume `dest` in `pool` with `source`.
    ///
    /// If the final commit is rejected the volume is left partially written.
    #[instrument(skip(self, pool, source), fields(src = %source.path(), size = source.size()))]
    pub fn upload(&self, pool: &B::Pool, source: SourceFile, dest: &str) -> Result<()> {
        let spec = VolumeSpec {
            name: dest.to_owned(),
            capacity: source.size(),
        };
        let volume = self.prepare(pool, &spec)?;

        let transfer = |source| UploadError::Transfer {
            volume: spec.name.clone(),
            source,
        };
        let mut stream = self.backend.new_stream()?;
        self.backend
            .bind_upload(&volume, &stream, 0, spec.capacity)
            .map_err(transfer)?;

        if let Err(e) = copy_to_stream(source, &mut stream, &spec.name) {
            if let Err(abort) = stream.abort() {
                debug!("Failed to abort stream: {abort}");
            }
            return Err(e);
        }
        stream.finish().map_err(transfer)?;
        debug!("Finished upload to volume '{}'", spec.name);
        Ok(())
    }

    /// Get a volume named and sized per `spec`, according to the policy.
    fn prepare(&self, pool: &B::Pool, spec: &VolumeSpec) -> Result<B::Volume> {
        let existing = match self.backend.lookup_volume(pool, &spec.name) {
            Ok(vol) => Some(vol),
            Err(e) if e.is_no_such_volume() => None,
            Err(e) => return Err(e.into()),
        };

        match (existing, self.policy) {
            (Some(vol), VolumePolicy::Replace) => {
                debug!("Deleting existing volume '{}'", spec.name);
                self.backend.delete_volume(vol)?;
            }
            (Some(vol), VolumePolicy::Resize) => {
                let info = self.backend.volume_info(&vol)?;
                if spec.capacity < info.allocation {
                    // libvirt refuses to shrink below the allocated size
                    debug!(
                        "Recreating volume '{}': {} bytes allocated, need {}",
                        spec.name, info.allocation, spec.capacity
                    );
                    self.backend.delete_volume(vol)?;
                } else {
                    if info.capacity != spec.capacity {
                        debug!(
                            "Resizing volume '{}' from {} bytes ({} allocated) to {}",
                            spec.name, info.capacity, info.allocation, spec.capacity
                        );
                        self.backend.resize_volume(&vol, spec.capacity, true)?;
                    }
                    return Ok(vol);
                }
            }
            (None, _) => {}
        }

        debug!("Creating volume '{}' with {} bytes", spec.name, spec.capacity);
        let vol = self
            .backend
            .create_volume(pool, &xml::volume_xml(&spec.name, spec.capacity))?;
        Ok(vol)
    }
}

/// Copy the whole source into `stream`, one chunk at a time.
fn copy_to_stream<S: UploadStream>(
    mut source: SourceFile,
    stream: &mut S,
    volume: &str,
) -> Result<()> {
    let transfer = |source| UploadError::Transfer {
        volume: volume.to_owned(),
        source,
    };
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match source.file.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(source_err) => {
                return Err(UploadError::Io {
                    path: source.path.clone(),
                    source: source_err,
                })
            }
        };
        let mut chunk = &buf[..n];
        while !chunk.is_empty() {
            let sent = stream.send(chunk).map_err(transfer)?;
            if sent == 0 {
                return Err(transfer(DaemonError::new(
                    DaemonErrorKind::Other,
                    "stream accepted no data",
                )));
            }
            chunk = &chunk[sent..];
        }
    }
}
