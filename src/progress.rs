//! Transfer progress reporting

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Receives cumulative byte counts for in-flight transfers
///
/// Only called for responses that declare a content length.
pub trait ProgressSink: Send + Sync {
    fn begin(&self, name: &str, total_bytes: u64);
    fn advance(&self, name: &str, bytes_downloaded: u64);
    fn finish(&self, name: &str);
}

/// One terminal progress bar per artifact
pub struct ConsoleProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    style: ProgressStyle,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("   [{bar:40.green/blue}] {bytes}/{total_bytes}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            style,
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn begin(&self, name: &str, total_bytes: u64) {
        let bar = self.multi.add(ProgressBar::new(total_bytes));
        bar.set_style(self.style.clone());
        bar.set_message(format!("📥 {name}"));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(name.to_string(), bar);
        }
    }

    fn advance(&self, name: &str, bytes_downloaded: u64) {
        if let Ok(bars) = self.bars.lock()
            && let Some(bar) = bars.get(name)
        {
            bar.set_position(bytes_downloaded);
        }
    }

    fn finish(&self, name: &str) {
        if let Ok(mut bars) = self.bars.lock()
            && let Some(bar) = bars.remove(name)
        {
            bar.finish_with_message(format!("✅ {name}"));
        }
    }
}
