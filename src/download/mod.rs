//! Release artifact download and archive extraction
//!
//! ## Module Organization
//!
//! - `platform` - Platform detection and artifact selection
//! - `transfer` - Buffered streaming of one response body into one file
//! - `core` - Bounded concurrent download orchestration
//! - `extract` - Zip, tar.gz and gz extraction

mod core;
mod extract;
mod platform;
mod transfer;

// Re-export public API
pub use core::{
    BatchOptions, BatchReport, DownloadFailure, DownloadOutcome, collect_outcomes, download_all,
    run_bounded,
};
pub use extract::{ArchiveKind, Extracted, extract, extract_blocking};
pub use platform::{Arch, Os, PlatformKey, Selection, select};
pub use transfer::{PROGRESS_INTERVAL, http_client, transfer};
