//! Filesystem helpers used to stage and collect unit data.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Make a directory (recursive). An existing directory is kept,
/// or recreated empty when `delete_if_exists` is set.
pub fn mkdir(path: impl AsRef<Path>, delete_if_exists: bool) -> Result<PathBuf, Error> {
    let path = path.as_ref();
    if path.exists() {
        if !delete_if_exists {
            return Ok(path.to_path_buf());
        }
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(path.to_path_buf())
}

/// Copy a directory tree into `to`, which must not exist yet.
pub fn copy_tree(from: &Path, to: &Path) -> Result<(), Error> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Hard link `from` to `to`, copying when linking is not possible
/// (e.g. across filesystems). `to` must not exist: it may already be a link
/// to `from`, and copying onto it would truncate the source.
pub fn link_or_copy(from: &Path, to: &Path) -> Result<(), Error> {
    if to.symlink_metadata().is_ok() {
        return Err(Error::general_error(format!(
            "Can't stage '{}': '{}' already exists",
            from.display(),
            to.display()
        )));
    }
    if fs::hard_link(from, to).is_err() {
        fs::copy(from, to)?;
    }
    Ok(())
}

/// Run filesystem work on the blocking thread pool.
pub async fn blocking<T, F>(work: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::general_error(e.to_string()))?
}
