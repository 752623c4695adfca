//! Release lookup
//!
//! - `github` - GitHub REST catalog client
//! - `resolver` - release resolution and source-archive URLs on top of a catalog

mod github;
mod resolver;

pub use github::GitHubCatalog;
pub use resolver::{ReleaseResolver, source_archive_url};

use std::future::Future;

use crate::error::Result;

/// A tagged, published version of a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub tag: String,
    pub display_name: String,
    /// In the order the catalog returned them
    pub artifacts: Vec<Artifact>,
}

/// One downloadable file attached to a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub size_bytes: u64,
    pub download_url: String,
}

impl Artifact {
    pub fn new(name: impl Into<String>, size_bytes: u64, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            download_url: download_url.into(),
        }
    }
}

/// Repository release catalog
///
/// Implementations report a missing release as `FetchError::NotFound` and
/// every other failure as a transport or API error. One attempt per call.
pub trait ReleaseCatalog: Send + Sync {
    fn latest_release(
        &self,
        owner: &str,
        repo: &str,
    ) -> impl Future<Output = Result<Release>> + Send;

    fn release_by_tag(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> impl Future<Output = Result<Release>> + Send;
}
