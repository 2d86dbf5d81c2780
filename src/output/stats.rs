//! Statistics reporting.

use console::style;

use crate::storage::CacheEntry;
use crate::task::TaskOutcome;

use super::console::format_bytes;

/// Tally of finished downloads in one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadStats {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub bytes: u64,
}

impl DownloadStats {
    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed(entry) => {
                self.completed += 1;
                self.bytes += entry.size_bytes;
            }
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }
}

/// Print the summary of a download run.
pub fn print_download_stats(stats: &DownloadStats) {
    println!();
    println!("{}", style("═".repeat(50)).dim());
    println!("{}", style("Download Statistics:").bold());
    println!("  Completed: {}", style(stats.completed).green());
    if stats.failed > 0 {
        println!("  Failed:    {}", style(stats.failed).red());
    }
    if stats.cancelled > 0 {
        println!("  Cancelled: {}", style(stats.cancelled).yellow());
    }
    println!("  Cached:    {}", format_bytes(stats.bytes));
    println!("{}", style("═".repeat(50)).dim());
}

/// Print a summary line for a cache listing.
pub fn print_cache_summary(entries: &[CacheEntry]) {
    let complete = entries.iter().filter(|e| e.is_complete()).count();
    let bytes: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!(
        "{} entries: {} complete, {} partial ({})",
        entries.len(),
        style(complete).green(),
        style(entries.len() - complete).yellow(),
        format_bytes(bytes)
    );
}
