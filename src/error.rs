//! Error and warning types shared by every fetch component
//!
//! Hard failures are `FetchError`. Degradations that still produce a usable
//! result (a sidecar file that failed to download, an archive that could not
//! be unpacked, a symlink the filesystem refused) are `Warning` values carried
//! alongside the result.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T, E = FetchError> = std::result::Result<T, E>;

/// Fetch failure
#[derive(Debug, Error)]
pub enum FetchError {
    /// The catalog has no release for the repository, or no release with the tag
    #[error("{}", not_found_message(.owner, .repo, .tag.as_deref()))]
    NotFound {
        owner: String,
        repo: String,
        tag: Option<String>,
    },

    /// Network or HTTP client failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Catalog API answered with a non-success status other than 404
    #[error("GitHub API error for {url}: HTTP {status}")]
    Api { url: String, status: u16 },

    /// Artifact or source download answered with a non-success status
    #[error("download of {url} failed: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every artifact in a batch failed; wraps the first failure collected
    #[error("all {total} artifact downloads failed: {first}")]
    AllDownloadsFailed {
        total: usize,
        #[source]
        first: Box<FetchError>,
    },

    /// Release exists but has no artifacts and source fallback is disabled
    #[error("release {tag} of {owner}/{repo} has no downloadable artifacts")]
    NoArtifacts {
        owner: String,
        repo: String,
        tag: String,
    },

    #[error("unsupported archive format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Archive entry would be written outside the extraction directory
    #[error("refusing to extract entry with unsafe path: {0}")]
    UnsafeEntry(String),

    #[error("invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("source path does not exist: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("download batch timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("download cancelled")]
    Cancelled,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn not_found_message(owner: &str, repo: &str, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("repository {owner}/{repo} has no release tagged {tag}"),
        None => format!("repository {owner}/{repo} has no releases"),
    }
}

impl FetchError {
    /// Attach a path and action to an I/O error
    pub fn io(action: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        FetchError::Io {
            action,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for the catalog's "no such release" signal
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Non-fatal degradation recorded while producing a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// One artifact of a batch failed while others succeeded
    PartialDownload { artifact: String, error: String },
    /// No artifact matched the platform; the first one was picked
    FallbackSelection { artifact: String },
    /// Archive could not be unpacked; the archive itself is returned
    Extraction { archive: PathBuf, error: String },
    /// Move into the target location failed; the prior path is returned
    Placement {
        source: PathBuf,
        target: PathBuf,
        error: String,
    },
    Symlink {
        link: PathBuf,
        target: PathBuf,
        error: String,
    },
    Hardlink {
        link: PathBuf,
        target: PathBuf,
        error: String,
    },
    Permissions { path: PathBuf, error: String },
    /// Copy fallback succeeded but the original could not be removed
    SourceCleanup { path: PathBuf, error: String },
    CacheWrite { path: PathBuf, error: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::PartialDownload { artifact, error } => {
                write!(f, "download of {artifact} failed: {error}")
            }
            Warning::FallbackSelection { artifact } => {
                write!(f, "no artifact matched this platform, using {artifact}")
            }
            Warning::Extraction { archive, error } => {
                write!(f, "could not extract {}: {error}", archive.display())
            }
            Warning::Placement {
                source,
                target,
                error,
            } => write!(
                f,
                "could not move {} to {}: {error}",
                source.display(),
                target.display()
            ),
            Warning::Symlink {
                link,
                target,
                error,
            } => write!(
                f,
                "could not create symlink {} -> {}: {error}",
                link.display(),
                target.display()
            ),
            Warning::Hardlink {
                link,
                target,
                error,
            } => write!(
                f,
                "could not create hard link {} -> {}: {error}",
                link.display(),
                target.display()
            ),
            Warning::Permissions { path, error } => {
                write!(f, "could not set permissions on {}: {error}", path.display())
            }
            Warning::SourceCleanup { path, error } => {
                write!(f, "copied but could not remove {}: {error}", path.display())
            }
            Warning::CacheWrite { path, error } => {
                write!(f, "could not update version record {}: {error}", path.display())
            }
        }
    }
}
