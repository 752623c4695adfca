//! Archive extraction for zip, tar+gzip, and plain gzip
//!
//! The format is resolved once from the file name. Entry paths are
//! sanitized: an absolute path, a `..` component, or a parent directory
//! that resolves outside the extraction root aborts the extraction.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, info, warn};
use tar::Archive;
use zip::ZipArchive;

use crate::error::{FetchError, Result, Warning};

/// Archive format, resolved from the lower-cased file name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    Gz,
    Unsupported,
}

impl ArchiveKind {
    pub fn from_path(path: &Path) -> Self {
        let name = file_name(path).to_ascii_lowercase();
        if name.ends_with(".zip") {
            ArchiveKind::Zip
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else if name.ends_with(".gz") {
            ArchiveKind::Gz
        } else {
            ArchiveKind::Unsupported
        }
    }

    fn suffix_len(self, lower_name: &str) -> usize {
        match self {
            ArchiveKind::Zip => ".zip".len(),
            ArchiveKind::TarGz if lower_name.ends_with(".tgz") => ".tgz".len(),
            ArchiveKind::TarGz => ".tar.gz".len(),
            ArchiveKind::Gz => ".gz".len(),
            ArchiveKind::Unsupported => 0,
        }
    }

    /// Sibling path the archive unpacks to: its name without the suffix
    pub fn output_path(self, archive: &Path) -> Option<PathBuf> {
        if self == ArchiveKind::Unsupported {
            return None;
        }
        let name = file_name(archive);
        let stem = &name[..name.len() - self.suffix_len(&name.to_ascii_lowercase())];
        let stem = if stem.is_empty() { "extracted" } else { stem };
        Some(archive.with_file_name(stem))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Extraction result
#[derive(Debug)]
pub struct Extracted {
    /// Directory for zip and tar.gz, file for plain gzip
    pub path: PathBuf,
    pub kind: ArchiveKind,
    /// Symlink, hard link, and permission failures that were tolerated
    pub warnings: Vec<Warning>,
}

/// Extract on the blocking thread pool
pub async fn extract(archive: &Path) -> Result<Extracted> {
    let archive = archive.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive)).await?
}

/// Extract next to the archive
///
/// Any entry failure aborts the whole extraction. Output created by a failed
/// extraction is removed; output that existed beforehand is left alone.
pub fn extract_blocking(archive: &Path) -> Result<Extracted> {
    let kind = ArchiveKind::from_path(archive);
    let Some(output) = kind.output_path(archive) else {
        return Err(FetchError::UnsupportedFormat(archive.to_path_buf()));
    };
    info!("Extracting {} ({kind:?})", archive.display());

    let existed = output.exists();
    let mut warnings = Vec::new();
    let result = match kind {
        ArchiveKind::Zip => extract_zip(archive, &output, &mut warnings),
        ArchiveKind::TarGz => extract_tar_gz(archive, &output, &mut warnings),
        ArchiveKind::Gz => extract_gz(archive, &output),
        ArchiveKind::Unsupported => Err(FetchError::UnsupportedFormat(archive.to_path_buf())),
    };

    if let Err(e) = result {
        if !existed {
            discard(&output);
        }
        return Err(e);
    }

    info!("Extracted {} to {}", archive.display(), output.display());
    Ok(Extracted {
        path: output,
        kind,
        warnings,
    })
}

fn discard(path: &Path) {
    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(e) = removed
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!("Failed to clean up {}: {e}", path.display());
    }
}

/// Relative path made only of normal components
fn sanitize(name: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FetchError::UnsafeEntry(name.display().to_string()));
            }
        }
    }
    Ok(clean)
}

/// Create `dir` and make sure it does not resolve outside `root`
fn create_inside(root: &Path, dir: &Path, entry: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| FetchError::io("failed to create", dir, e))?;
    let resolved = fs::canonicalize(dir).map_err(|e| FetchError::io("failed to resolve", dir, e))?;
    if resolved.starts_with(root) {
        Ok(())
    } else {
        Err(FetchError::UnsafeEntry(entry.display().to_string()))
    }
}

fn prepare_root(output: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output).map_err(|e| FetchError::io("failed to create", output, e))?;
    fs::canonicalize(output).map_err(|e| FetchError::io("failed to resolve", output, e))
}

/// Write a regular file, replacing a symlink an earlier entry left at `path`
fn write_entry(reader: &mut impl io::Read, path: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(path)
        && meta.file_type().is_symlink()
    {
        fs::remove_file(path).map_err(|e| FetchError::io("failed to replace link", path, e))?;
    }
    let mut out = File::create(path).map_err(|e| FetchError::io("failed to create", path, e))?;
    io::copy(reader, &mut out).map_err(|e| FetchError::io("failed to write", path, e))?;
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32, warnings: &mut Vec<Warning>) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777)) {
        warnings.push(Warning::Permissions {
            path: path.to_path_buf(),
            error: e.to_string(),
        });
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32, _warnings: &mut Vec<Warning>) {}

fn extract_zip(archive: &Path, output: &Path, warnings: &mut Vec<Warning>) -> Result<()> {
    let file = File::open(archive).map_err(|e| FetchError::io("failed to open", archive, e))?;
    let mut zip = ZipArchive::new(BufReader::new(file))?;
    let root = prepare_root(output)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = PathBuf::from(entry.name());
        let relative = sanitize(&name)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = root.join(&relative);

        if entry.is_dir() {
            create_inside(&root, &target, &name)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            create_inside(&root, parent, &name)?;
        }
        write_entry(&mut entry, &target)?;
        if let Some(mode) = entry.unix_mode() {
            apply_mode(&target, mode, warnings);
        }
        debug!("Extracted {}", relative.display());
    }

    Ok(())
}

fn extract_tar_gz(archive: &Path, output: &Path, warnings: &mut Vec<Warning>) -> Result<()> {
    let file = File::open(archive).map_err(|e| FetchError::io("failed to open", archive, e))?;
    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
    let root = prepare_root(output)?;

    let entries = tar
        .entries()
        .map_err(|e| FetchError::io("failed to read", archive, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| FetchError::io("failed to read", archive, e))?;
        let name = entry
            .path()
            .map_err(|e| FetchError::io("failed to read entry in", archive, e))?
            .into_owned();
        let kind = entry.header().entry_type();

        // pax global headers carry metadata, not files
        if kind == tar::EntryType::XGlobalHeader {
            continue;
        }

        let relative = sanitize(&name)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = root.join(&relative);

        if kind.is_dir() {
            create_inside(&root, &target, &name)?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                create_inside(&root, parent, &name)?;
            }
            write_entry(&mut entry, &target)?;
            let mode = entry
                .header()
                .mode()
                .map_err(|e| FetchError::io("failed to read mode in", archive, e))?;
            apply_mode(&target, mode, warnings);
        } else if kind.is_symlink() || kind.is_hard_link() {
            let link_name = entry
                .link_name()
                .map_err(|e| FetchError::io("failed to read link in", archive, e))?
                .map(|link| link.into_owned());
            let Some(link_name) = link_name else {
                debug!("Skipping link entry {} without a target", name.display());
                continue;
            };
            if let Some(parent) = target.parent() {
                create_inside(&root, parent, &name)?;
            }
            if kind.is_symlink() {
                create_symlink(&link_name, &target, warnings);
            } else {
                create_hard_link(&root, &link_name, &target, warnings);
            }
        } else {
            debug!("Skipping {kind:?} entry {}", name.display());
        }
    }

    Ok(())
}

#[cfg(unix)]
fn create_symlink(link_target: &Path, link: &Path, warnings: &mut Vec<Warning>) {
    if let Err(e) = std::os::unix::fs::symlink(link_target, link) {
        warnings.push(Warning::Symlink {
            link: link.to_path_buf(),
            target: link_target.to_path_buf(),
            error: e.to_string(),
        });
    }
}

#[cfg(not(unix))]
fn create_symlink(link_target: &Path, link: &Path, warnings: &mut Vec<Warning>) {
    warnings.push(Warning::Symlink {
        link: link.to_path_buf(),
        target: link_target.to_path_buf(),
        error: "symbolic links are not supported on this platform".to_string(),
    });
}

/// Hard link targets are archive paths, resolved against the extraction root
///
/// The target is resolved through any symlinks and must stay inside `root`.
fn create_hard_link(root: &Path, link_target: &Path, link: &Path, warnings: &mut Vec<Warning>) {
    let result = sanitize(link_target)
        .map_err(|e| e.to_string())
        .and_then(|relative| fs::canonicalize(root.join(relative)).map_err(|e| e.to_string()))
        .and_then(|source| {
            if source.starts_with(root) {
                Ok(source)
            } else {
                Err(format!("target resolves outside {}", root.display()))
            }
        })
        .and_then(|source| fs::hard_link(source, link).map_err(|e| e.to_string()));
    if let Err(error) = result {
        warnings.push(Warning::Hardlink {
            link: link.to_path_buf(),
            target: link_target.to_path_buf(),
            error,
        });
    }
}

fn extract_gz(archive: &Path, output: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| FetchError::io("failed to open", archive, e))?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    write_entry(&mut decoder, output)
}
