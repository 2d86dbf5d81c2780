//! Output module for console output and progress.
//!
//! Provides:
//! - Colored console output
//! - Progress bars
//! - Statistics reporting

pub mod console;
pub mod progress;
pub mod stats;

pub use console::{
    format_bytes, print_banner, print_config_summary, print_entry, print_error, print_info,
    print_status, print_success, print_warning,
};
pub use progress::{create_segment_bar, create_spinner, follow_task};
pub use stats::{print_cache_summary, print_download_stats, DownloadStats};
