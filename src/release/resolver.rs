//! Release resolution on top of a catalog

use log::info;

use super::{Release, ReleaseCatalog};
use crate::error::Result;

/// Turns (owner, repo, tag) into release descriptors and source-archive URLs
#[derive(Debug, Clone)]
pub struct ReleaseResolver<C> {
    catalog: C,
    host: String,
}

impl<C: ReleaseCatalog> ReleaseResolver<C> {
    /// `host` is the web host serving source archives, e.g. `https://github.com`
    pub fn new(catalog: C, host: impl Into<String>) -> Self {
        Self {
            catalog,
            host: host.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn resolve_latest(&self, owner: &str, repo: &str) -> Result<Release> {
        self.catalog.latest_release(owner, repo).await
    }

    pub async fn resolve_by_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        self.catalog.release_by_tag(owner, repo, tag).await
    }

    pub async fn latest_tag(&self, owner: &str, repo: &str) -> Result<String> {
        Ok(self.resolve_latest(owner, repo).await?.tag)
    }

    /// Source tarball URL for a tag; an empty tag resolves the latest release first
    ///
    /// Returns the URL together with the tag it was built for.
    pub async fn source_archive_url(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<(String, String)> {
        let tag = if tag.is_empty() {
            self.latest_tag(owner, repo).await?
        } else {
            tag.to_string()
        };
        let url = source_archive_url(&self.host, owner, repo, &tag);
        info!("Source archive for {owner}/{repo} at {tag}: {url}");
        Ok((url, tag))
    }
}

/// `{host}/{owner}/{repo}/archive/refs/tags/{tag}.tar.gz`
pub fn source_archive_url(host: &str, owner: &str, repo: &str, tag: &str) -> String {
    format!(
        "{}/{owner}/{repo}/archive/refs/tags/{tag}.tar.gz",
        host.trim_end_matches('/')
    )
}
