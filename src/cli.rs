use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use release_fetch::FetchConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Fetch release artifacts from GitHub")]
pub struct Args {
    #[command(subcommand)]
    pub sub: Cmd,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Flags layered over the configuration file
#[derive(ClapArgs, Debug, Default)]
pub struct Overrides {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Maximum parallel downloads
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Write buffer size in bytes
    #[arg(long, global = true)]
    pub buffer_size: Option<usize>,

    /// Deadline for a whole download batch, in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Move results here after download
    #[arg(long, short = 'o', global = true)]
    pub target_dir: Option<PathBuf>,

    /// Unpack zip, tar.gz and gz archives
    #[arg(long, short = 'x', global = true)]
    pub extract: bool,

    /// Show download progress bars
    #[arg(long, short = 'p', global = true)]
    pub progress: bool,

    /// Fail instead of fetching the source archive when a release has no artifacts
    #[arg(long, global = true)]
    pub no_source: bool,

    /// Always download, ignoring the recorded version
    #[arg(long, global = true)]
    pub no_check: bool,

    /// Proxy URL; a bare host:port is treated as SOCKS5
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// GitHub access token (defaults to $GITHUB_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// GitHub API base URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// error, warn, info, debug or trace
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Download the latest release (skipped when already recorded)
    Latest {
        #[arg(value_parser = parse_repo)]
        repo: Repo,
    },
    /// Download the release with the given tag
    Release {
        #[arg(value_parser = parse_repo)]
        repo: Repo,
        tag: String,
    },
    /// Download the source tarball of a tag (latest when omitted)
    Source {
        #[arg(value_parser = parse_repo)]
        repo: Repo,
        #[arg(long, short = 't')]
        tag: Option<String>,
    },
    /// Check whether a version is the latest release (Exit 0 = latest, 1 = outdated)
    Check {
        #[arg(value_parser = parse_repo)]
        repo: Repo,
        version: String,
    },
    /// Print the last recorded tag
    Status {
        #[arg(value_parser = parse_repo)]
        repo: Repo,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    pub owner: String,
    pub name: String,
}

fn parse_repo(value: &str) -> Result<Repo, String> {
    match value.split_once('/') {
        Some((owner, name))
            if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok(Repo {
                owner: owner.to_string(),
                name: name.to_string(),
            })
        }
        _ => Err(format!("expected <owner>/<repo>, got {value:?}")),
    }
}

impl Overrides {
    pub fn apply(&self, mut config: FetchConfig) -> FetchConfig {
        if let Some(n) = self.concurrency {
            config = config.with_concurrency(n);
        }
        if let Some(size) = self.buffer_size {
            config = config.with_buffer_size(size);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir);
        }
        if let Some(dir) = &self.target_dir {
            config = config.with_target_dir(dir);
        }
        if self.extract {
            config = config.with_auto_extract(true);
        }
        if self.progress {
            config = config.with_show_progress(true);
        }
        if self.no_source {
            config = config.with_download_source(false);
        }
        if self.no_check {
            config = config.with_check_latest(false);
        }
        if let Some(proxy) = &self.proxy {
            config = config.with_proxy_url(proxy);
        }
        if let Some(token) = &self.token {
            config = config.with_access_token(token);
        }
        if let Some(url) = &self.api_url {
            config = config.with_api_url(url);
        }
        if let Some(level) = &self.log_level {
            config = config.with_log_level(level);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_argument_is_split() {
        assert_eq!(
            parse_repo("cli/cli"),
            Ok(Repo {
                owner: "cli".into(),
                name: "cli".into()
            })
        );
        assert!(parse_repo("cli").is_err());
        assert!(parse_repo("/cli").is_err());
        assert!(parse_repo("a/b/c").is_err());
    }

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "release-fetch",
            "latest",
            "acme/tool",
            "--concurrency",
            "2",
            "-x",
            "--no-check",
            "--proxy",
            "127.0.0.1:1080",
        ]);
        let config = args.overrides.apply(FetchConfig::default());

        assert_eq!(config.concurrency, 2);
        assert!(config.auto_extract);
        assert!(!config.check_latest);
        assert!(config.download_source);
        assert_eq!(config.proxy_url.as_deref(), Some("127.0.0.1:1080"));
        assert!(matches!(args.sub, Cmd::Latest { .. }));
    }

    #[test]
    fn source_tag_is_optional() {
        let args = Args::parse_from(["release-fetch", "source", "acme/tool"]);
        match args.sub {
            Cmd::Source { repo, tag } => {
                assert_eq!(repo.owner, "acme");
                assert_eq!(tag, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
