//! GitHub release API interaction

use std::time::Duration;

use log::{debug, error, info};
use reqwest::StatusCode;
use serde::Deserialize;

use super::{Artifact, Release, ReleaseCatalog};
use crate::config::FetchConfig;
use crate::download::http_client;
use crate::error::{FetchError, Result};

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub release metadata from API
#[derive(Deserialize, Debug)]
struct GitHubRelease {
    tag_name: String,
    name: Option<String>,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

/// GitHub release asset metadata
#[derive(Deserialize, Debug)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
    size: u64,
}

impl From<GitHubRelease> for Release {
    fn from(release: GitHubRelease) -> Self {
        let display_name = release
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| release.tag_name.clone());
        Release {
            tag: release.tag_name,
            display_name,
            artifacts: release
                .assets
                .into_iter()
                .map(|asset| Artifact::new(asset.name, asset.size, asset.browser_download_url))
                .collect(),
        }
    }
}

/// Release catalog backed by the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubCatalog {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubCatalog {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Build a catalog with its own HTTP client from configuration
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let client = http_client(config)?;
        Ok(Self::new(client, &config.api_url, config.resolved_token()))
    }

    async fn fetch(&self, owner: &str, repo: &str, tag: Option<&str>) -> Result<Release> {
        let url = match tag {
            Some(tag) => format!("{}/repos/{owner}/{repo}/releases/tags/{tag}", self.api_url),
            None => format!("{}/repos/{owner}/{repo}/releases/latest", self.api_url),
        };
        debug!("GET {url}");

        let mut request = self
            .client
            .get(&url)
            .timeout(API_TIMEOUT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            error!("Release lookup for {owner}/{repo} failed: {e}");
            FetchError::Transport(e)
        })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(FetchError::NotFound {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    tag: tag.map(str::to_string),
                });
            }
            status => {
                error!("GitHub API error for {owner}/{repo}: HTTP {status}");
                return Err(FetchError::Api {
                    url,
                    status: status.as_u16(),
                });
            }
        }

        let release: Release = response.json::<GitHubRelease>().await?.into();
        info!(
            "Resolved {owner}/{repo} release {} ({}, {} artifacts)",
            release.tag,
            release.display_name,
            release.artifacts.len()
        );
        Ok(release)
    }
}

impl ReleaseCatalog for GitHubCatalog {
    async fn latest_release(&self, owner: &str, repo: &str) -> Result<Release> {
        self.fetch(owner, repo, None).await
    }

    async fn release_by_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        self.fetch(owner, repo, Some(tag)).await
    }
}
