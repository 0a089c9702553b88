use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;

/// Expand a leading `~` or `~/` to the invoking user's home directory.
///
/// `~user` forms are not supported and are returned unchanged.
pub(crate) fn expand_home(path: &Utf8Path) -> Result<Utf8PathBuf> {
    let Some(rest) = path.as_str().strip_prefix('~') else {
        return Ok(path.to_owned());
    };
    if !(rest.is_empty() || rest.starts_with('/')) {
        return Ok(path.to_owned());
    }
    let home = dirs::home_dir().ok_or_else(|| eyre!("Could not determine home directory"))?;
    let home = Utf8PathBuf::try_from(home).context("Home directory is not valid UTF-8")?;
    Ok(join_home(&home, rest))
}

fn join_home(home: &Utf8Path, rest: &str) -> Utf8PathBuf {
    home.join(rest.trim_start_matches('/'))
}

/// Final component of `path`, used as the default volume name
pub(crate) fn basename(path: &Utf8Path) -> Result<&str> {
    path.file_name()
        .ok_or_else(|| eyre!("Cannot derive a volume name from {path}; use --dest"))
}
