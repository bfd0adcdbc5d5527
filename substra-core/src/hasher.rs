//! Content fingerprinting.
//!
//! Digests are BLAKE3 (256 bit) rendered as lower-case hex. They serve both as
//! content identity of files and directories and as identity of derived
//! computation units, which are keyed by [hash_values] of their inputs.

use std::fs::File;
use std::path::Path;

use crate::error::Error;

/// Hash the content of a single file.
pub fn hash_file(path: impl AsRef<Path>) -> Result<String, Error> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::from(e).with_key(&path.display().to_string())
    })?;
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(file)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash a directory tree.
///
/// Every regular file contributes its path relative to `path` (with `/`
/// separators) and its content digest. Entries are sorted by relative path,
/// so the result does not depend on the order the filesystem lists them in.
pub fn hash_directory(path: impl AsRef<Path>) -> Result<String, Error> {
    let root = path.as_ref();
    let mut entries = Vec::new();
    collect_files(root, root, &mut entries)?;
    entries.sort();

    let mut hasher = blake3::Hasher::new();
    for (relative, digest) in entries {
        write_value(&mut hasher, &relative);
        write_value(&mut hasher, &digest);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash an ordered sequence of values.
///
/// Values are length-prefixed, so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn hash_values<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = blake3::Hasher::new();
    for value in values {
        write_value(&mut hasher, value.as_ref());
    }
    hasher.finalize().to_hex().to_string()
}

fn write_value(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn collect_files(root: &Path, dir: &Path, acc: &mut Vec<(String, String)>) -> Result<(), Error> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, acc)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| Error::general_error(e.to_string()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            acc.push((relative, hash_file(&path)?));
        }
    }
    Ok(())
}
