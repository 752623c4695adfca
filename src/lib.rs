//! Fetch platform-matching artifacts from GitHub releases
//!
//! Resolves a release (latest or by tag), picks the artifacts whose names
//! match the running platform, downloads them with bounded parallelism,
//! optionally unpacks zip / tar.gz / gz archives, moves the result into a
//! target directory, and remembers the last fetched tag per repository.
//!
//! ```no_run
//! # async fn run() -> release_fetch::Result<()> {
//! use release_fetch::{FetchConfig, Fetcher};
//!
//! let fetcher = Fetcher::new(FetchConfig::default().with_auto_extract(true))?;
//! let result = fetcher.download_latest_release("cli", "cli").await?;
//! println!("{}", result.path().display());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod fetcher;
pub mod file_ops;
pub mod progress;
pub mod release;

pub use cache::VersionCache;
pub use config::FetchConfig;
pub use context::{FetchContext, FetchEvent};
pub use download::{Arch, Os, PlatformKey};
pub use error::{FetchError, Result, Warning};
pub use fetcher::{Delivery, FetchResult, Fetcher};
pub use progress::{ConsoleProgress, ProgressSink};
pub use release::{Artifact, GitHubCatalog, Release, ReleaseCatalog, ReleaseResolver};
