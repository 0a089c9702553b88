//! The `upload` command: copy a local file into a libvirt storage pool
//!
//! The pool is created under `--pool-home` on first use; the volume is
//! created, replaced or resized to match the source file and then filled
//! with the file's bytes.

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::Result;
use tracing::info;

use crate::backend::StorageBackend;
use crate::libvirt::Libvirt;
use crate::pool::{PoolProvisioner, PoolSpec};
use crate::utils;
use crate::volume::{SourceFile, VolumePolicy, VolumeUploader};

/// Default base directory for pool storage; `~` is the invoking user's home
pub const DEFAULT_POOL_HOME: &str = "~/.libvirt/pools";

/// Upload a local file into a libvirt storage pool as a volume
#[derive(Debug, Parser)]
pub struct UploadOpts {
    /// Local file to upload
    pub src: Utf8PathBuf,

    /// Storage pool name; created as a directory pool under --pool-home if missing
    pub pool: String,

    /// Name of the destination volume (defaults to the file name of SRC)
    #[clap(long)]
    pub dest: Option<String>,

    /// Base directory for pool storage
    #[clap(long, default_value = DEFAULT_POOL_HOME)]
    pub pool_home: Utf8PathBuf,

    /// Hypervisor connection URI (e.g., qemu:///system, qemu+ssh://host/system)
    #[clap(short = 'c', long = "connect")]
    pub connect: Option<String>,

    /// What to do with an existing volume of the same name
    #[clap(long, value_enum, default_value_t)]
    pub policy: VolumePolicy,
}

/// Provision `pool_spec` and upload `source` into volume `dest` inside it.
pub(crate) fn provision_and_upload<B: StorageBackend>(
    backend: &B,
    pool_spec: &PoolSpec,
    source: SourceFile,
    dest: &str,
    policy: VolumePolicy,
) -> crate::error::Result<()> {
    let pool = PoolProvisioner::new(backend).ensure(pool_spec)?;
    VolumeUploader::new(backend, policy).upload(&pool, source, dest)
}

/// Execute the upload command
pub fn run(opts: UploadOpts) -> Result<()> {
    let dest = match opts.dest.as_deref() {
        Some(dest) => dest.to_owned(),
        None => utils::basename(&opts.src)?.to_owned(),
    };
    let pool_home = utils::expand_home(&opts.pool_home)?;
    let pool_spec = PoolSpec::under(&pool_home, &opts.pool);

    // Checked before connecting so a bad path never touches the daemon
    let source = SourceFile::open(&opts.src)?;
    let size = source.size();

    let libvirt = Libvirt::open(opts.connect.as_deref())?;
    provision_and_upload(&libvirt, &pool_spec, source, &dest, opts.policy)?;

    info!(
        "Uploaded {} ({size} bytes) to volume '{dest}' in pool '{}'",
        opts.src, pool_spec.name
    );
    Ok(())
}
