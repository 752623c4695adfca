//! Fetch configuration
//!
//! Loaded from TOML (every key optional) and adjusted with builder-style
//! setters. All values are consumed as plain parameters by the components.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FetchError, Result};

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_HOST: &str = "https://github.com";

/// Top-level fetch configuration (defaults mirror the upstream tool)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum concurrent artifact transfers
    pub concurrency: usize,
    /// Transfer buffer size in bytes
    pub buffer_size: usize,
    /// Overall deadline for one artifact batch
    pub timeout_secs: u64,
    pub cache_dir: Option<PathBuf>,
    /// Final placement directory; `None` leaves results in the cache
    pub target_dir: Option<PathBuf>,
    pub auto_extract: bool,
    /// Download the source archive when a release has no artifacts
    pub download_source: bool,
    /// Skip latest-release downloads whose tag matches the version record
    pub check_latest: bool,
    pub show_progress: bool,
    pub log_level: String,
    /// Proxy endpoint, e.g. `socks5://127.0.0.1:1080` (bare `host:port` means SOCKS5)
    pub proxy_url: Option<String>,
    pub access_token: Option<String>,
    /// GitHub REST API base
    pub api_url: String,
    /// GitHub web host used for source archives
    pub host: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            buffer_size: DEFAULT_BUFFER_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            cache_dir: None,
            target_dir: None,
            auto_extract: false,
            download_source: true,
            check_latest: true,
            show_progress: false,
            log_level: "info".to_string(),
            proxy_url: None,
            access_token: None,
            api_url: DEFAULT_API_URL.to_string(),
            host: DEFAULT_HOST.to_string(),
        }
    }
}

impl FetchConfig {
    /// Read a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| FetchError::io("failed to read config", path, e))?;
        let config: FetchConfig = toml::from_str(&raw).map_err(|e| {
            FetchError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Default per-user configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("release-fetch").join("config.toml"))
    }

    /// Reject values the components cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(FetchError::Config("concurrency must be at least 1".into()));
        }
        if self.buffer_size == 0 {
            return Err(FetchError::Config("buffer_size must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(FetchError::Config("timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Cache root, falling back to the per-user cache location
    pub fn cache_root(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|dir| dir.join("release-fetch"))
            .or_else(|| dirs::home_dir().map(|home| home.join(".release-fetch").join("cache")))
            .ok_or_else(|| FetchError::Config("could not determine a cache directory".into()))
    }

    /// Target directory when it differs from the cache root
    pub fn placement_dir(&self, cache_root: &Path) -> Option<&Path> {
        self.target_dir
            .as_deref()
            .filter(|target| *target != cache_root)
    }

    /// Explicit token, else `GITHUB_TOKEN` from the environment
    pub fn resolved_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.is_empty())
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    pub fn with_auto_extract(mut self, extract: bool) -> Self {
        self.auto_extract = extract;
        self
    }

    pub fn with_download_source(mut self, download: bool) -> Self {
        self.download_source = download;
        self
    }

    pub fn with_check_latest(mut self, check: bool) -> Self {
        self.check_latest = check;
        self
    }

    pub fn with_show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: FetchConfig = toml::from_str(
            r#"
            concurrency = 2
            auto_extract = true
            target_dir = "/opt/tools"
            "#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 2);
        assert!(config.auto_extract);
        assert_eq!(config.target_dir, Some(PathBuf::from("/opt/tools")));
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.timeout(), Duration::from_secs(1800));
        assert!(config.download_source);
        assert!(config.check_latest);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = FetchConfig::default()
            .with_concurrency(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, FetchError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "buffer_size = 4096\nshow_progress = true\n").unwrap();

        let config = FetchConfig::load(&path).unwrap();
        assert_eq!(config.buffer_size, 4096);
        assert!(config.show_progress);
    }

    #[test]
    fn placement_dir_ignores_cache_root() {
        let config = FetchConfig::default().with_target_dir("/cache");
        assert_eq!(config.placement_dir(Path::new("/cache")), None);
        assert_eq!(
            config.placement_dir(Path::new("/elsewhere")),
            Some(Path::new("/cache"))
        );
    }

    #[test]
    fn explicit_cache_dir_wins() {
        let config = FetchConfig::default().with_cache_dir("/tmp/rf-cache");
        assert_eq!(config.cache_root().unwrap(), PathBuf::from("/tmp/rf-cache"));
    }
}
