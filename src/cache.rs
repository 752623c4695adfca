//! Last-downloaded tag per repository
//!
//! One file per repository, `<root>/<owner>-<repo>-version.txt`, holding the
//! tag and nothing else. A missing or unreadable record means "not cached".

use std::fs;
use std::path::PathBuf;

use log::debug;

use crate::error::Result;
use crate::file_ops::write_file_atomic;

#[derive(Debug, Clone)]
pub struct VersionCache {
    root: PathBuf,
}

impl VersionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn record_path(&self, owner: &str, repo: &str) -> PathBuf {
        self.root.join(format!("{owner}-{repo}-version.txt"))
    }

    /// Whole-file byte equality with `tag`
    pub fn is_up_to_date(&self, owner: &str, repo: &str, tag: &str) -> bool {
        match fs::read(self.record_path(owner, repo)) {
            Ok(contents) => contents == tag.as_bytes(),
            Err(e) => {
                debug!("No version record for {owner}/{repo}: {e}");
                false
            }
        }
    }

    pub fn record(&self, owner: &str, repo: &str, tag: &str) -> Result<()> {
        write_file_atomic(&self.record_path(owner, repo), tag.as_bytes())?;
        debug!("Recorded {owner}/{repo} at {tag}");
        Ok(())
    }

    pub fn cached_tag(&self, owner: &str, repo: &str) -> Option<String> {
        fs::read_to_string(self.record_path(owner, repo)).ok()
    }
}
