//! Public fetch operations
//!
//! `Fetcher` wires release resolution, artifact selection, the bounded
//! download batch, extraction, placement, and the version cache together.
//! Resolution and transport errors abort an operation. Everything after a
//! successful download degrades into `Warning`s on the returned `Delivery`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use crate::cache::VersionCache;
use crate::config::FetchConfig;
use crate::context::{FetchContext, FetchEvent};
use crate::download::{self, BatchOptions, PlatformKey};
use crate::error::{FetchError, Result, Warning};
use crate::file_ops;
use crate::progress::ConsoleProgress;
use crate::release::{Artifact, GitHubCatalog, ReleaseCatalog, ReleaseResolver, source_archive_url};

/// Files produced by a fetch and the degradations met on the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Final location: file, extraction directory, or multi-artifact directory
    pub path: PathBuf,
    pub tag: String,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Fetched(Delivery),
    /// The version cache already holds the latest tag; nothing was downloaded.
    /// `path` is where deliveries land (target directory, else cache root).
    UpToDate { tag: String, path: PathBuf },
}

impl FetchResult {
    pub fn path(&self) -> &Path {
        match self {
            FetchResult::Fetched(delivery) => &delivery.path,
            FetchResult::UpToDate { path, .. } => path,
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            FetchResult::Fetched(delivery) => &delivery.tag,
            FetchResult::UpToDate { tag, .. } => tag,
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        match self {
            FetchResult::Fetched(delivery) => &delivery.warnings,
            FetchResult::UpToDate { .. } => &[],
        }
    }
}

pub struct Fetcher<C = GitHubCatalog> {
    config: FetchConfig,
    resolver: ReleaseResolver<C>,
    client: reqwest::Client,
    cache: VersionCache,
    cache_root: PathBuf,
    platform: PlatformKey,
    ctx: FetchContext,
}

impl Fetcher<GitHubCatalog> {
    /// Fetcher backed by the GitHub REST API
    pub fn new(config: FetchConfig) -> Result<Self> {
        let catalog = GitHubCatalog::from_config(&config)?;
        Self::with_catalog(config, catalog)
    }
}

impl<C: ReleaseCatalog> Fetcher<C> {
    /// Fetcher over any catalog; creates the cache root and target directory
    pub fn with_catalog(config: FetchConfig, catalog: C) -> Result<Self> {
        config.validate()?;

        let cache_root = config.cache_root()?;
        fs::create_dir_all(&cache_root)
            .map_err(|e| FetchError::io("failed to create cache directory", &cache_root, e))?;
        if let Some(target) = &config.target_dir {
            fs::create_dir_all(target)
                .map_err(|e| FetchError::io("failed to create target directory", target, e))?;
        }

        let client = download::http_client(&config)?;
        let mut ctx = FetchContext::new();
        if config.show_progress {
            ctx = ctx.with_progress(Arc::new(ConsoleProgress::new()));
        }

        debug!("Cache root: {}", cache_root.display());
        Ok(Self {
            resolver: ReleaseResolver::new(catalog, config.host.clone()),
            client,
            cache: VersionCache::new(&cache_root),
            cache_root,
            platform: PlatformKey::current().clone(),
            ctx,
            config,
        })
    }

    /// Select artifacts for another platform
    pub fn with_platform(mut self, platform: PlatformKey) -> Self {
        self.platform = platform;
        self
    }

    /// Replace the event/cancellation context
    ///
    /// A console progress sink configured through `show_progress` is kept
    /// unless the new context brings its own.
    pub fn with_context(mut self, ctx: FetchContext) -> Self {
        self.ctx = match (ctx.progress(), self.ctx.progress()) {
            (None, Some(sink)) => ctx.with_progress(sink),
            _ => ctx,
        };
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn cache(&self) -> &VersionCache {
        &self.cache
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Download the latest release, skipping it when the cache already has it
    pub async fn download_latest_release(&self, owner: &str, repo: &str) -> Result<FetchResult> {
        info!("Fetching latest release of {owner}/{repo}");
        let release = self.resolver.resolve_latest(owner, repo).await?;
        self.resolved(owner, repo, &release.tag);

        if self.config.check_latest && self.cache.is_up_to_date(owner, repo, &release.tag) {
            info!("{owner}/{repo} is already at {}", release.tag);
            return Ok(FetchResult::UpToDate {
                path: self.delivery_root().to_path_buf(),
                tag: release.tag,
            });
        }

        let mut delivery = self
            .fetch_release(owner, repo, &release.tag, &release.artifacts)
            .await?;

        if self.config.check_latest {
            match self.cache.record(owner, repo, &release.tag) {
                Ok(()) => self.ctx.emit(FetchEvent::VersionRecorded {
                    tag: release.tag.clone(),
                }),
                Err(e) => delivery.warnings.push(self.ctx.degrade(Warning::CacheWrite {
                    path: self.cache.record_path(owner, repo),
                    error: e.to_string(),
                })),
            }
        }

        Ok(FetchResult::Fetched(delivery))
    }

    /// Download the release tagged `tag`; the version cache is not consulted
    pub async fn download_specific_release(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<FetchResult> {
        info!("Fetching release {tag} of {owner}/{repo}");
        let release = self.resolver.resolve_by_tag(owner, repo, tag).await?;
        self.resolved(owner, repo, &release.tag);

        let delivery = self
            .fetch_release(owner, repo, &release.tag, &release.artifacts)
            .await?;
        Ok(FetchResult::Fetched(delivery))
    }

    /// Download the source tarball for `tag`; an empty tag means latest
    pub async fn download_source_code(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<FetchResult> {
        let (url, tag) = self.resolver.source_archive_url(owner, repo, tag).await?;
        let delivery = self.fetch_source(owner, repo, &tag, &url).await?;
        Ok(FetchResult::Fetched(delivery))
    }

    /// Compare `current` with the latest tag, ignoring a leading `v` on either
    pub async fn is_latest_version(&self, owner: &str, repo: &str, current: &str) -> Result<bool> {
        let latest = self.resolver.latest_tag(owner, repo).await?;
        let is_latest = strip_v(&latest) == strip_v(current);
        info!("{owner}/{repo}: latest {latest}, current {current}, up to date: {is_latest}");
        Ok(is_latest)
    }

    fn resolved(&self, owner: &str, repo: &str, tag: &str) {
        info!("Resolved {owner}/{repo} to {tag}");
        self.ctx.emit(FetchEvent::ReleaseResolved {
            owner: owner.to_string(),
            repo: repo.to_string(),
            tag: tag.to_string(),
        });
    }

    fn delivery_root(&self) -> &Path {
        self.config
            .placement_dir(&self.cache_root)
            .unwrap_or(&self.cache_root)
    }

    async fn fetch_release(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        artifacts: &[Artifact],
    ) -> Result<Delivery> {
        let selection = download::select(artifacts, &self.platform);
        self.ctx.emit(FetchEvent::ArtifactsSelected {
            count: selection.artifacts.len(),
            fallback: selection.fallback,
        });

        if selection.artifacts.is_empty() {
            if !self.config.download_source {
                return Err(FetchError::NoArtifacts {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    tag: tag.to_string(),
                });
            }
            info!("{owner}/{repo} {tag} has no artifacts, fetching source archive");
            let url = source_archive_url(&self.config.host, owner, repo, tag);
            return self.fetch_source(owner, repo, tag, &url).await;
        }

        let mut warnings = Vec::new();
        if selection.fallback
            && let Some(first) = selection.artifacts.first()
        {
            warnings.push(self.ctx.degrade(Warning::FallbackSelection {
                artifact: first.name.clone(),
            }));
        }

        let options = BatchOptions {
            concurrency: self.config.concurrency,
            timeout: self.config.timeout(),
            buffer_size: self.config.buffer_size,
            dest_dir: self.cache_root.clone(),
        };
        let report =
            download::download_all(&self.ctx, &self.client, &selection.artifacts, &options)
                .await?;

        for failure in report.failures {
            warnings.push(self.ctx.degrade(Warning::PartialDownload {
                artifact: failure.artifact,
                error: failure.error.to_string(),
            }));
        }

        let path = match report.paths.as_slice() {
            [single] => self.deliver_file(single.clone(), &mut warnings).await,
            paths => {
                self.deliver_bundle(owner, repo, tag, paths, &mut warnings)
                    .await?
            }
        };

        Ok(Delivery {
            path,
            tag: tag.to_string(),
            warnings,
        })
    }

    async fn fetch_source(&self, owner: &str, repo: &str, tag: &str, url: &str) -> Result<Delivery> {
        let archive = self
            .cache_root
            .join(format!("{}.tar.gz", release_dir_name(owner, repo, tag)));
        info!("Downloading source archive {url}");

        let progress = self.ctx.progress();
        let transfer = download::transfer(
            &self.client,
            url,
            &archive,
            self.config.buffer_size,
            progress.as_deref(),
            self.ctx.cancellation(),
        );
        tokio::time::timeout(self.config.timeout(), transfer)
            .await
            .map_err(|_| FetchError::Timeout(self.config.timeout()))??;

        let mut warnings = Vec::new();
        let path = self.deliver_file(archive, &mut warnings).await;
        Ok(Delivery {
            path,
            tag: tag.to_string(),
            warnings,
        })
    }

    /// Optional extract, then optional placement. Returns the last good path.
    async fn deliver_file(&self, file: PathBuf, warnings: &mut Vec<Warning>) -> PathBuf {
        let mut path = file;

        if self.config.auto_extract {
            path = self.extract_or_keep(path, warnings).await;
        }

        if let Some(dir) = self.config.placement_dir(&self.cache_root)
            && let Some(name) = path.file_name()
        {
            let target = dir.join(name);
            path = self.place_or_keep(path, target, warnings).await;
        }

        path
    }

    /// Gather every file into `bundle`, optionally extract each in place,
    /// then optionally move the whole directory
    async fn deliver_bundle(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        paths: &[PathBuf],
        warnings: &mut Vec<Warning>,
    ) -> Result<PathBuf> {
        let bundle = self.cache_root.join(release_dir_name(owner, repo, tag));
        fs::create_dir_all(&bundle).map_err(|e| FetchError::io("failed to create", &bundle, e))?;

        let mut members = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(name) = path.file_name() else {
                continue;
            };
            members.push(self.place_or_keep(path.clone(), bundle.join(name), warnings).await);
        }

        if self.config.auto_extract {
            for member in members.into_iter().filter(|m| m.starts_with(&bundle)) {
                self.extract_or_keep(member, warnings).await;
            }
        }

        let Some(dir) = self.config.placement_dir(&self.cache_root) else {
            return Ok(bundle);
        };
        let target = dir.join(release_dir_name(owner, repo, tag));
        Ok(self.place_or_keep(bundle, target, warnings).await)
    }

    async fn extract_or_keep(&self, archive: PathBuf, warnings: &mut Vec<Warning>) -> PathBuf {
        match download::extract(&archive).await {
            Ok(extracted) => {
                self.ctx.emit(FetchEvent::Extracted {
                    archive: archive.clone(),
                    into: extracted.path.clone(),
                });
                for warning in extracted.warnings {
                    warnings.push(self.ctx.degrade(warning));
                }
                extracted.path
            }
            Err(e) => {
                warnings.push(self.ctx.degrade(Warning::Extraction {
                    archive: archive.clone(),
                    error: e.to_string(),
                }));
                archive
            }
        }
    }

    async fn place_or_keep(
        &self,
        source: PathBuf,
        target: PathBuf,
        warnings: &mut Vec<Warning>,
    ) -> PathBuf {
        let result = {
            let source = source.clone();
            let target = target.clone();
            tokio::task::spawn_blocking(move || file_ops::place(&source, &target)).await
        };

        match result.map_err(FetchError::from).and_then(|placed| placed) {
            Ok(placed_warnings) => {
                self.ctx.emit(FetchEvent::Placed {
                    source,
                    target: target.clone(),
                });
                for warning in placed_warnings {
                    warnings.push(self.ctx.degrade(warning));
                }
                target
            }
            Err(e) => {
                warnings.push(self.ctx.degrade(Warning::Placement {
                    source: source.clone(),
                    target,
                    error: e.to_string(),
                }));
                source
            }
        }
    }
}

/// `<owner>-<repo>-<tag>` with any `/` in the tag flattened to `-`
fn release_dir_name(owner: &str, repo: &str, tag: &str) -> String {
    format!("{owner}-{repo}-{}", tag.replace('/', "-"))
}

fn strip_v(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_v_is_ignored() {
        assert_eq!(strip_v("v1.2.3"), "1.2.3");
        assert_eq!(strip_v("1.2.3"), "1.2.3");
        assert_eq!(strip_v("vv1"), "v1");
    }

    #[test]
    fn slashes_in_tags_stay_in_one_path_component() {
        assert_eq!(release_dir_name("acme", "tool", "v1.0"), "acme-tool-v1.0");
        assert_eq!(
            release_dir_name("acme", "tool", "release/1.0"),
            "acme-tool-release-1.0"
        );
    }

    #[test]
    fn result_accessors() {
        let up_to_date = FetchResult::UpToDate {
            tag: "v1".into(),
            path: PathBuf::from("/cache"),
        };
        assert_eq!(up_to_date.tag(), "v1");
        assert_eq!(up_to_date.path(), Path::new("/cache"));
        assert!(up_to_date.warnings().is_empty());

        let fetched = FetchResult::Fetched(Delivery {
            path: PathBuf::from("/cache/tool.zip"),
            tag: "v2".into(),
            warnings: vec![Warning::FallbackSelection {
                artifact: "tool.zip".into(),
            }],
        });
        assert_eq!(fetched.path(), Path::new("/cache/tool.zip"));
        assert_eq!(fetched.warnings().len(), 1);
    }
}
