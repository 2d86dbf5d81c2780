//! Console output utilities.

use console::style;

use crate::manager::CacheStatus;
use crate::storage::CacheEntry;

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", style("INFO").cyan().bold(), message);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", style("OK").green().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", style("WARN").yellow().bold(), message);
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", style("ERROR").red().bold(), message);
}

/// Print the application banner.
pub fn print_banner() {
    let banner = r#"
╔═══════════════════════════════════════════════════════╗
║     HLS Offline Cache                                 ║
║     Download HLS streams for offline playback         ║
╚═══════════════════════════════════════════════════════╝
"#;
    println!("{}", style(banner).cyan());
}

/// Print configuration summary.
pub fn print_config_summary(cache_dir: &str, rendition: &str, retries: u32, concurrency: usize) {
    println!();
    println!("{}", style("Configuration:").bold());
    println!("  Cache: {}", cache_dir);
    println!("  Rendition: {}", rendition);
    println!("  Retries: {}", retries);
    println!("  Concurrency: {}", concurrency);
    println!();
}

/// Print one cache entry.
pub fn print_entry(entry: &CacheEntry) {
    let completeness = if entry.is_complete() {
        style(entry.completeness.to_string()).green()
    } else {
        style(entry.completeness.to_string()).yellow()
    };

    println!("{}", style(entry.identity.as_str()).bold());
    println!(
        "  State:    {} ({}/{} segments, {:.0}%)",
        completeness,
        entry.segments_recorded,
        entry.segments_declared,
        entry.fraction() * 100.0
    );
    println!("  Size:     {}", format_bytes(entry.size_bytes));
    println!("  Updated:  {}", entry.last_modified.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Location: {}", entry.directory.display());
}

/// Print the combined cache and task status of a stream.
pub fn print_status(url: &str, status: &CacheStatus) {
    println!("{} {}", style("Status:").bold(), status);
    match status.entry() {
        Some(entry) => print_entry(entry),
        None => println!("  {}", url),
    }
    if let Some(task) = status.task() {
        let snapshot = task.snapshot();
        println!(
            "  Task:     {} ({}/{} segments, {:.0}%)",
            snapshot.state,
            snapshot.segments_done,
            snapshot.segments_total,
            snapshot.fraction() * 100.0
        );
    }
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
