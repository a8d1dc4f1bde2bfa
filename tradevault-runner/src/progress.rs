//! Terminal progress bars.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use tradevault_core::data::DownloadProgress;
use tradevault_core::domain::PartitionKey;

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";

/// A bar over `len` tasks. Falls back to the default style if the template
/// is rejected.
pub fn task_bar(len: usize, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_message(label.to_string());
    pb
}

/// Chunk-level download progress with live success/failure counts.
pub struct BarProgress {
    bar: ProgressBar,
    ok: AtomicUsize,
    failed: AtomicUsize,
}

impl BarProgress {
    pub fn new(total_chunks: usize, label: &str) -> Self {
        Self {
            bar: task_bar(total_chunks, label),
            ok: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn counts(&self) -> (usize, usize) {
        (self.ok.load(Ordering::Relaxed), self.failed.load(Ordering::Relaxed))
    }
}

impl DownloadProgress for BarProgress {
    fn on_start(&self, _key: &PartitionKey) {}

    fn on_complete(&self, _key: &PartitionKey, result: &Result<usize, String>) {
        match result {
            Ok(_) => self.ok.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        let (ok, failed) = self.counts();
        self.bar.set_message(format!("{ok} ok, {failed} failed"));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        self.bar
            .finish_with_message(format!("done: {succeeded} ok, {failed} failed of {total}"));
    }
}
