//! In-memory storage daemon for unit tests

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use camino::Utf8PathBuf;

use crate::backend::{
    DaemonError, DaemonErrorKind, DaemonResult, StorageBackend, UploadStream, VolumeInfo,
};

#[derive(Debug, Clone, Default)]
pub(crate) struct FakePool {
    pub path: Utf8PathBuf,
    pub built: bool,
    pub active: bool,
    pub autostart: bool,
    /// Volume contents; the length is the capacity
    pub volumes: BTreeMap<String, Vec<u8>>,
    /// Bytes backed on disk per volume; volumes start out sparse
    pub allocations: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct State {
    pools: BTreeMap<String, FakePool>,
    calls: Vec<String>,
    failures: HashMap<&'static str, DaemonErrorKind>,
    /// Cap on bytes accepted per send, to exercise short writes
    max_send: Option<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeDaemon {
    state: Rc<RefCell<State>>,
}

fn element<'a>(xml: &'a str, tag: &str) -> &'a str {
    let open = format!("<{tag}");
    let start = xml.find(&open).expect("element present");
    let start = start + xml[start..].find('>').expect("element closed") + 1;
    let end = start + xml[start..].find(&format!("</{tag}>")).expect("end tag");
    &xml[start..end]
}

impl FakeDaemon {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a defined pool
    pub(crate) fn with_pool(self, name: &str, path: &str, active: bool) -> Self {
        self.state.borrow_mut().pools.insert(
            name.to_owned(),
            FakePool {
                path: path.into(),
                built: true,
                active,
                ..Default::default()
            },
        );
        self
    }

    /// Pre-populate a fully written volume
    pub(crate) fn with_volume(self, pool: &str, name: &str, data: &[u8]) -> Self {
        self.with_allocated_volume(pool, name, data.to_vec(), data.len() as u64)
    }

    /// Pre-populate a volume of `capacity` bytes with nothing allocated yet
    pub(crate) fn with_sparse_volume(self, pool: &str, name: &str, capacity: usize) -> Self {
        self.with_allocated_volume(pool, name, vec![0; capacity], 0)
    }

    fn with_allocated_volume(
        self,
        pool: &str,
        name: &str,
        data: Vec<u8>,
        allocation: u64,
    ) -> Self {
        {
            let mut state = self.state.borrow_mut();
            let pool = state.pools.get_mut(pool).expect("pool exists");
            pool.volumes.insert(name.to_owned(), data);
            pool.allocations.insert(name.to_owned(), allocation);
        }
        self
    }

    pub(crate) fn with_max_send(self, n: usize) -> Self {
        self.state.borrow_mut().max_send = Some(n);
        self
    }

    /// Make the named operation fail with `kind`
    pub(crate) fn fail(&self, op: &'static str, kind: DaemonErrorKind) {
        self.state.borrow_mut().failures.insert(op, kind);
    }

    pub(crate) fn pool(&self, name: &str) -> Option<FakePool> {
        self.state.borrow().pools.get(name).cloned()
    }

    pub(crate) fn volume(&self, pool: &str, name: &str) -> Option<Vec<u8>> {
        self.pool(pool)?.volumes.get(name).cloned()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    fn call(&self, op: &'static str) -> DaemonResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(op.to_owned());
        match state.failures.get(op) {
            Some(&kind) => Err(DaemonError::new(kind, format!("injected failure in {op}"))),
            None => Ok(()),
        }
    }

    fn with_pool_mut<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut FakePool) -> DaemonResult<T>,
    ) -> DaemonResult<T> {
        let mut state = self.state.borrow_mut();
        let pool = state.pools.get_mut(name).ok_or_else(|| {
            DaemonError::new(
                DaemonErrorKind::NoSuchPool,
                format!("Storage pool not found: no storage pool with matching name '{name}'"),
            )
        })?;
        f(pool)
    }
}

fn no_such_volume(name: &str) -> DaemonError {
    DaemonError::new(
        DaemonErrorKind::NoSuchVolume,
        format!("Storage volume not found: no storage vol with matching name '{name}'"),
    )
}

#[derive(Debug)]
pub(crate) struct FakeVolume {
    pool: String,
    name: String,
}

#[derive(Debug)]
pub(crate) struct FakeStream {
    state: Rc<RefCell<State>>,
    target: RefCell<Option<(FakeVolume, u64, u64)>>,
    buf: Vec<u8>,
}

impl UploadStream for FakeStream {
    fn send(&mut self, data: &[u8]) -> DaemonResult<usize> {
        let state = self.state.borrow();
        if let Some(&kind) = state.failures.get("stream_send") {
            return Err(DaemonError::new(kind, "stream send rejected"));
        }
        let max = state.max_send.unwrap_or(usize::MAX);
        let n = data.len().min(max);
        self.buf.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn finish(self) -> DaemonResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push("stream_finish".to_owned());
        if let Some(&kind) = state.failures.get("stream_finish") {
            return Err(DaemonError::new(kind, "stream finish rejected"));
        }
        let (vol, offset, length) = self
            .target
            .into_inner()
            .ok_or_else(|| DaemonError::new(DaemonErrorKind::Other, "stream not bound"))?;
        if self.buf.len() as u64 != length {
            return Err(DaemonError::new(
                DaemonErrorKind::Other,
                format!("expected {length} bytes, got {}", self.buf.len()),
            ));
        }
        let pool = state
            .pools
            .get_mut(&vol.pool)
            .ok_or_else(|| no_such_volume(&vol.name))?;
        let data = pool
            .volumes
            .get_mut(&vol.name)
            .ok_or_else(|| no_such_volume(&vol.name))?;
        let offset = offset as usize;
        let end = offset + self.buf.len();
        if end > data.len() {
            return Err(DaemonError::new(
                DaemonErrorKind::Other,
                "upload exceeds volume capacity",
            ));
        }
        data[offset..end].copy_from_slice(&self.buf);
        let allocation = pool.allocations.entry(vol.name).or_default();
        *allocation = (*allocation).max(end as u64);
        Ok(())
    }

    fn abort(self) -> DaemonResult<()> {
        self.state.borrow_mut().calls.push("stream_abort".to_owned());
        Ok(())
    }
}

impl StorageBackend for FakeDaemon {
    type Pool = String;
    type Volume = FakeVolume;
    type Stream = FakeStream;

    fn lookup_pool(&self, name: &str) -> DaemonResult<String> {
        self.call("lookup_pool")?;
        self.with_pool_mut(name, |_| Ok(name.to_owned()))
    }

    fn define_pool(&self, xml: &str) -> DaemonResult<String> {
        self.call("define_pool")?;
        let name = element(xml, "name").to_owned();
        let path = element(element(xml, "target"), "path");
        let mut state = self.state.borrow_mut();
        if state.pools.contains_key(&name) {
            return Err(DaemonError::new(
                DaemonErrorKind::Other,
                format!("pool '{name}' already exists"),
            ));
        }
        state.pools.insert(
            name.clone(),
            FakePool {
                path: path.into(),
                ..Default::default()
            },
        );
        Ok(name)
    }

    fn build_pool(&self, pool: &String) -> DaemonResult<()> {
        self.call("build_pool")?;
        self.with_pool_mut(pool, |p| {
            p.built = true;
            Ok(())
        })
    }

    fn pool_is_active(&self, pool: &String) -> DaemonResult<bool> {
        self.call("pool_is_active")?;
        self.with_pool_mut(pool, |p| Ok(p.active))
    }

    fn start_pool(&self, pool: &String) -> DaemonResult<()> {
        self.call("start_pool")?;
        self.with_pool_mut(pool, |p| {
            p.active = true;
            Ok(())
        })
    }

    fn set_pool_autostart(&self, pool: &String, autostart: bool) -> DaemonResult<()> {
        self.call("set_pool_autostart")?;
        self.with_pool_mut(pool, |p| {
            p.autostart = autostart;
            Ok(())
        })
    }

    fn pool_target_path(&self, pool: &String) -> DaemonResult<Option<Utf8PathBuf>> {
        self.call("pool_target_path")?;
        self.with_pool_mut(pool, |p| Ok(Some(p.path.clone())))
    }

    fn lookup_volume(&self, pool: &String, name: &str) -> DaemonResult<FakeVolume> {
        self.call("lookup_volume")?;
        self.with_pool_mut(pool, |p| {
            if p.volumes.contains_key(name) {
                Ok(FakeVolume {
                    pool: pool.clone(),
                    name: name.to_owned(),
                })
            } else {
                Err(no_such_volume(name))
            }
        })
    }

    fn create_volume(&self, pool: &String, xml: &str) -> DaemonResult<FakeVolume> {
        self.call("create_volume")?;
        let name = element(xml, "name").to_owned();
        let capacity: usize = element(xml, "capacity").parse().expect("numeric capacity");
        self.with_pool_mut(pool, |p| {
            if !p.active {
                return Err(DaemonError::new(DaemonErrorKind::Other, "pool is not active"));
            }
            if p.volumes.contains_key(&name) {
                return Err(DaemonError::new(
                    DaemonErrorKind::Other,
                    format!("volume '{name}' already exists"),
                ));
            }
            p.volumes.insert(name.clone(), vec![0; capacity]);
            p.allocations.insert(name.clone(), 0);
            Ok(FakeVolume {
                pool: pool.clone(),
                name,
            })
        })
    }

    fn delete_volume(&self, volume: FakeVolume) -> DaemonResult<()> {
        self.call("delete_volume")?;
        self.with_pool_mut(&volume.pool, |p| {
            p.allocations.remove(&volume.name);
            p.volumes
                .remove(&volume.name)
                .map(|_| ())
                .ok_or_else(|| no_such_volume(&volume.name))
        })
    }

    fn volume_info(&self, volume: &FakeVolume) -> DaemonResult<VolumeInfo> {
        self.call("volume_info")?;
        self.with_pool_mut(&volume.pool, |p| {
            let capacity = p
                .volumes
                .get(&volume.name)
                .ok_or_else(|| no_such_volume(&volume.name))?
                .len() as u64;
            let allocation = p.allocations.get(&volume.name).copied().unwrap_or(0);
            Ok(VolumeInfo {
                capacity,
                allocation,
            })
        })
    }

    fn resize_volume(
        &self,
        volume: &FakeVolume,
        capacity: u64,
        allow_shrink: bool,
    ) -> DaemonResult<()> {
        self.call("resize_volume")?;
        self.with_pool_mut(&volume.pool, |p| {
            let allocation = p.allocations.get(&volume.name).copied().unwrap_or(0);
            let data = p
                .volumes
                .get_mut(&volume.name)
                .ok_or_else(|| no_such_volume(&volume.name))?;
            if capacity < allocation {
                return Err(DaemonError::new(
                    DaemonErrorKind::Other,
                    "invalid argument: can't shrink capacity below existing allocation",
                ));
            }
            if (capacity as usize) < data.len() && !allow_shrink {
                return Err(DaemonError::new(
                    DaemonErrorKind::Other,
                    "shrinking is not permitted without the shrink flag",
                ));
            }
            data.resize(capacity as usize, 0);
            Ok(())
        })
    }

    fn new_stream(&self) -> DaemonResult<FakeStream> {
        self.call("new_stream")?;
        Ok(FakeStream {
            state: Rc::clone(&self.state),
            target: RefCell::new(None),
            buf: Vec::new(),
        })
    }

    fn bind_upload(
        &self,
        volume: &FakeVolume,
        stream: &FakeStream,
        offset: u64,
        length: u64,
    ) -> DaemonResult<()> {
        self.call("bind_upload")?;
        let vol = FakeVolume {
            pool: volume.pool.clone(),
            name: volume.name.clone(),
        };
        *stream.target.borrow_mut() = Some((vol, offset, length));
        Ok(())
    }
}
