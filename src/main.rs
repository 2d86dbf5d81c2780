//! HLS Offline Cache - CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use futures::future::join_all;
use indicatif::MultiProgress;
use tracing_subscriber::{fmt, EnvFilter};

use hls_offline_cache::{
    cli::{Args, Command},
    config::{validate_config, Config},
    error::{exit_codes, Error, Result},
    output::{
        create_spinner, follow_task, print_banner, print_cache_summary, print_config_summary,
        print_download_stats, print_entry, print_error, print_info, print_status, print_success,
        print_warning, DownloadStats,
    },
    CacheManager, PlayableAssetRef, TaskOutcome,
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            print_error(&format!("{}", e));
            match e {
                Error::Config(_) | Error::ConfigValidation { .. } | Error::MissingConfig(_) => {
                    ExitCode::from(exit_codes::CONFIG_ERROR as u8)
                }
                Error::InvalidUrl(_) | Error::UrlParse(_) => {
                    ExitCode::from(exit_codes::CONFIG_ERROR as u8)
                }
                Error::Http(_) | Error::Storage(_) => {
                    ExitCode::from(exit_codes::DOWNLOAD_ERROR as u8)
                }
                _ => ExitCode::from(exit_codes::UNEXPECTED_ERROR as u8),
            }
        }
    }
}

async fn run() -> Result<i32> {
    // Parse CLI arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).with_target(false).init();

    // Load configuration
    let mut config = Config::load_or_default(&args.config)?;

    // Merge CLI arguments into config
    args.merge_into_config(&mut config);

    if args.command.needs_download_options() {
        validate_config(&config)?;
    }

    let cache = build_manager(&config, args.command.needs_download_options())?;

    match args.command {
        Command::Download { urls } => {
            print_banner();
            let options = config.download_options()?;
            print_config_summary(
                &cache.root().display().to_string(),
                &options.rendition.to_string(),
                options.retry.max_retries,
                options.segment_concurrency,
            );
            download_all(cache, &urls).await
        }
        Command::Check { url } => {
            match cache.check_offline(&url).await? {
                Some(PlayableAssetRef::Local(path)) => println!("{}", path.display()),
                _ => print_info(&format!("{} is not available offline", url)),
            }
            Ok(exit_codes::SUCCESS)
        }
        Command::Status { url } => {
            let status = cache.status(&url).await?;
            print_status(&url, &status);
            Ok(exit_codes::SUCCESS)
        }
        Command::Purge { url } => {
            if cache.purge(&url).await? {
                print_success(&format!("Removed {} from the cache", url));
            } else {
                print_info(&format!("{} was not cached", url));
            }
            Ok(exit_codes::SUCCESS)
        }
        Command::List => {
            let entries = cache.entries().await?;
            if entries.is_empty() {
                print_info("The cache is empty");
            }
            for entry in &entries {
                print_entry(entry);
            }
            print_cache_summary(&entries);
            Ok(exit_codes::SUCCESS)
        }
    }
}

/// Build the process-wide manager.
///
/// Commands that never download still need a manager; they get placeholder
/// download options when none are configured.
fn build_manager(config: &Config, downloads: bool) -> Result<&'static CacheManager> {
    let mut config = config.clone();
    if !downloads {
        config
            .download
            .rendition
            .get_or_insert(hls_offline_cache::manifest::RenditionPolicy::Lowest);
        config.download.retry.max_retries.get_or_insert(0);
    }

    let manager = CacheManager::from_config(&config)?;
    Ok(CacheManager::global_or_init(move || manager))
}

/// Download every URL concurrently with one progress bar each.
///
/// Ctrl-C cancels all pending downloads; what already landed stays cached
/// as partial entries.
async fn download_all(cache: &'static CacheManager, urls: &[String]) -> Result<i32> {
    let spinner = create_spinner("Loading offline cache index...");
    let ready = cache.setup().await;
    spinner.finish_and_clear();
    ready?;

    let multi = MultiProgress::new();
    let mut accepted = Vec::with_capacity(urls.len());
    let mut followers = Vec::with_capacity(urls.len());
    for url in urls {
        match cache.download(url).await {
            Ok(task) => {
                accepted.push(url);
                followers.push(follow_task(task, multi.clone(), short_label(url)));
            }
            Err(e) => print_error(&format!("{}: {}", url, e)),
        }
    }
    let rejected = urls.len() - accepted.len();

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print_warning("Interrupted, cancelling pending downloads...");
            cache.clean_all_pending();
        }
    });

    let outcomes = join_all(followers).await;
    interrupt.abort();

    let mut stats = DownloadStats::default();
    for (url, outcome) in accepted.iter().zip(&outcomes) {
        stats.record(outcome);
        if let TaskOutcome::Failed(error) = outcome {
            print_error(&format!("{}: {}", url, error));
        }
    }
    print_download_stats(&stats);

    if stats.failed + rejected > 0 {
        Ok(exit_codes::SOME_DOWNLOADS_FAILED)
    } else if stats.cancelled > 0 {
        Ok(exit_codes::ABORT)
    } else {
        Ok(exit_codes::SUCCESS)
    }
}

/// Progress label for a stream URL: its last two path segments.
fn short_label(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let parts: Vec<&str> = path.rsplit('/').filter(|p| !p.is_empty()).take(2).collect();
    match parts.as_slice() {
        [file, dir] => format!("{}/{}", dir, file),
        [file] => file.to_string(),
        _ => url.to_string(),
    }
}
