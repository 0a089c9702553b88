use clap::{Parser, Subcommand};
use color_eyre::{Report, Result};

mod backend;
mod error;
mod libvirt;
mod pool;
#[cfg(test)]
mod testing;
mod upload;
mod utils;
mod volume;
mod xml;

/// Upload local files into libvirt storage pools.
///
/// poolup creates a directory-backed storage pool on first use, keeps it
/// running and set to autostart, and streams a file into a volume of the
/// same size, replacing any previous volume with that name.
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available poolup commands.
#[derive(Subcommand)]
enum Commands {
    /// Upload a file into a storage pool as a volume
    ///
    /// The pool is looked up by name and, if missing, defined as a directory
    /// pool at <POOL_HOME>/<POOL>, built and started. An existing volume
    /// with the destination name is replaced.
    Upload(upload::UploadOpts),
}

/// Install and configure the tracing/logging system.
///
/// Logs are filtered by RUST_LOG environment variable, defaulting to 'info',
/// and written to stderr.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Upload(opts) => upload::run(opts)?,
    }
    Ok(())
}
