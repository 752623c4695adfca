//! Filesystem placement helpers
//!
//! `place` moves a file or directory tree into its final location, falling
//! back to copy-and-delete when a rename crosses filesystems.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use log::{debug, info, warn};

use crate::error::{FetchError, Result, Warning};

/// Move `source` to `target`, replacing whatever is at `target`
///
/// A failed source removal after a successful copy is reported as a warning;
/// the data is already in place.
pub fn place(source: &Path, target: &Path) -> Result<Vec<Warning>> {
    place_with(source, target, |from, to| fs::rename(from, to), remove_path)
}

type RenameFn = fn(&Path, &Path) -> io::Result<()>;
type RemoveFn = fn(&Path) -> io::Result<()>;

fn place_with(
    source: &Path,
    target: &Path,
    rename: RenameFn,
    remove_source: RemoveFn,
) -> Result<Vec<Warning>> {
    if fs::symlink_metadata(source).is_err() {
        return Err(FetchError::MissingSource(source.to_path_buf()));
    }

    if let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| FetchError::io("failed to create", parent, e))?;
    }

    remove_existing(target)?;

    match rename(source, target) {
        Ok(()) => {
            info!("Moved {} to {}", source.display(), target.display());
            return Ok(Vec::new());
        }
        Err(e) => debug!(
            "Rename {} -> {} failed ({e}), copying instead",
            source.display(),
            target.display()
        ),
    }

    copy_tree(source, target)?;

    let mut warnings = Vec::new();
    if let Err(e) = remove_source(source) {
        warn!("Copied {} but could not remove it: {e}", source.display());
        warnings.push(Warning::SourceCleanup {
            path: source.to_path_buf(),
            error: e.to_string(),
        });
    }

    info!("Copied {} to {}", source.display(), target.display());
    Ok(warnings)
}

fn remove_path(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn remove_existing(target: &Path) -> Result<()> {
    let Ok(meta) = fs::symlink_metadata(target) else {
        return Ok(());
    };
    let removed = if meta.is_dir() {
        fs::remove_dir_all(target)
    } else {
        fs::remove_file(target)
    };
    removed.map_err(|e| FetchError::io("failed to remove existing", target, e))
}

/// Recursively copy a file or directory, preserving permissions
pub fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    let meta =
        fs::symlink_metadata(source).map_err(|e| FetchError::io("failed to stat", source, e))?;

    if meta.file_type().is_symlink() {
        return copy_symlink(source, target);
    }

    if meta.is_dir() {
        fs::create_dir_all(target).map_err(|e| FetchError::io("failed to create", target, e))?;
        let entries =
            fs::read_dir(source).map_err(|e| FetchError::io("failed to read", source, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| FetchError::io("failed to read", source, e))?;
            copy_tree(&entry.path(), &target.join(entry.file_name()))?;
        }
        fs::set_permissions(target, meta.permissions())
            .map_err(|e| FetchError::io("failed to set permissions on", target, e))?;
        return Ok(());
    }

    let mut reader =
        fs::File::open(source).map_err(|e| FetchError::io("failed to open", source, e))?;
    let mut writer =
        fs::File::create(target).map_err(|e| FetchError::io("failed to create", target, e))?;
    io::copy(&mut reader, &mut writer).map_err(|e| FetchError::io("failed to copy", target, e))?;
    fs::set_permissions(target, meta.permissions())
        .map_err(|e| FetchError::io("failed to set permissions on", target, e))?;
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> Result<()> {
    let link = fs::read_link(source).map_err(|e| FetchError::io("failed to read link", source, e))?;
    std::os::unix::fs::symlink(&link, target)
        .map_err(|e| FetchError::io("failed to create symlink", target, e))
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> Result<()> {
    fs::copy(source, target)
        .map(|_| ())
        .map_err(|e| FetchError::io("failed to copy", target, e))
}

/// Write file atomically to prevent corruption
pub fn write_file_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    {
        let mut file = fs::File::create(&temp_path)
            .map_err(|e| FetchError::io("failed to create temp file", &temp_path, e))?;

        file.write_all(content)
            .map_err(|e| FetchError::io("failed to write temp file", &temp_path, e))?;

        file.sync_all()
            .map_err(|e| FetchError::io("failed to sync temp file", &temp_path, e))?;
    }

    fs::rename(&temp_path, path).map_err(|e| FetchError::io("failed to rename temp file", path, e))
}
