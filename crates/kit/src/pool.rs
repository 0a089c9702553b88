//! Storage pool provisioning
//!
//! Makes sure a directory-backed pool with a given name exists, is built,
//! running and set to autostart before any volume work happens.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, instrument, warn};

use crate::backend::StorageBackend;
use crate::error::{Result, UploadError};
use crate::xml;

/// A directory-backed storage pool: its name and backing directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSpec {
    pub name: String,
    pub path: Utf8PathBuf,
}

impl PoolSpec {
    /// A pool named `name` stored under `pool_home/name`
    pub fn under(pool_home: &Utf8Path, name: &str) -> Self {
        Self {
            name: name.to_owned(),
            path: pool_home.join(name),
        }
    }
}

/// Ensures storage pools are ready to receive volumes
#[derive(Debug)]
pub struct PoolProvisioner<'a, B> {
    backend: &'a B,
}

impl<'a, B: StorageBackend> PoolProvisioner<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Look up or create the pool described by `spec`, then make sure it is
    /// running and marked for autostart.
    ///
    /// An existing pool is used as-is, even if it is backed by a different
    /// directory than `spec.path`.
    #[instrument(skip(self), fields(pool = %spec.name))]
    pub fn ensure(&self, spec: &PoolSpec) -> Result<B::Pool> {
        let pool = match self.backend.lookup_pool(&spec.name) {
            Ok(pool) => {
                debug!("Found existing pool");
                self.check_path(&pool, spec);
                pool
            }
            Err(e) if e.is_no_such_pool() => self.define(spec)?,
            Err(e) => return Err(e.into()),
        };

        if !self.backend.pool_is_active(&pool)? {
            debug!("Starting pool");
            self.backend
                .start_pool(&pool)
                .map_err(|source| UploadError::Activation {
                    pool: spec.name.clone(),
                    source,
                })?;
        }

        self.backend.set_pool_autostart(&pool, true)?;
        Ok(pool)
    }

    fn define(&self, spec: &PoolSpec) -> Result<B::Pool> {
        debug!("Defining pool at {}", spec.path);
        std::fs::create_dir_all(&spec.path).map_err(|source| UploadError::Filesystem {
            path: spec.path.clone(),
            source,
        })?;

        let pool = self
            .backend
            .define_pool(&xml::pool_xml(&spec.name, &spec.path))?;
        self.backend
            .build_pool(&pool)
            .map_err(|source| UploadError::Build {
                pool: spec.name.clone(),
                source,
            })?;
        Ok(pool)
    }

    /// Warn when an existing pool lives somewhere other than requested.
    fn check_path(&self, pool: &B::Pool, spec: &PoolSpec) {
        match self.backend.pool_target_path(pool) {
            Ok(Some(path)) if path != spec.path => {
                warn!(
                    "Pool '{}' already exists at {path}, not {}; using the existing pool",
                    spec.name, spec.path
                );
            }
            Ok(_) => {}
            Err(e) => warn!(
                "Could not read definition of pool '{}', skipping path check: {e}",
                spec.name
            ),
        }
    }
}
