use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubescribe::cli::CacheAction;
use tubescribe::identity::{parse_video_id, DEFAULT_MAX_URL_LENGTH};
use tubescribe::{
    output, utils, CacheKey, CacheStore, Cli, Commands, Config, FetchFailure, TranscriptService,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "tubescribe=debug" } else { "tubescribe=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load().await?;
    if let Some(dir) = &cli.cache_dir {
        config.cache.directory = Some(dir.clone());
    }

    match cli.command {
        Commands::Transcript {
            url,
            language,
            output,
            format,
            timestamps,
            no_cache,
        } => {
            warn_missing_dependencies(&config).await;
            if no_cache {
                config.cache.enabled = false;
            }

            let service = TranscriptService::from_config(&config, Arc::new(config.rate_limiter()))?;
            let language = language.unwrap_or_else(|| config.app.default_language.clone());

            let spinner = spinner(cli.quiet, "Fetching transcript...");
            let result = service.get_transcript(&url, &language).await;
            spinner.finish_and_clear();

            let result = match result {
                Ok(result) => result,
                Err(failure) => {
                    report_failure(&failure);
                    std::process::exit(1);
                }
            };

            if !cli.quiet {
                eprintln!("{}", output::format_summary(&result));
            }

            match output {
                Some(path) => {
                    output::save_to_file(&result, &path, &format, timestamps).await?;
                    println!("Transcript saved to: {}", path.display());
                }
                None => {
                    output::print_to_console(&result, &format, timestamps)?;
                }
            }
        }
        Commands::Tracks { url } => {
            warn_missing_dependencies(&config).await;
            config.cache.enabled = false;
            let service = TranscriptService::from_config(&config, Arc::new(config.rate_limiter()))?;

            let spinner = spinner(cli.quiet, "Listing caption tracks...");
            let result = service.list_tracks(&url).await;
            spinner.finish_and_clear();

            match result {
                Ok((identity, tracks)) => {
                    println!("Caption tracks for {}:", identity.canonical_id);
                    println!("{}", output::format_tracks(&tracks));
                }
                Err(failure) => {
                    report_failure(&failure);
                    std::process::exit(1);
                }
            }
        }
        Commands::Check => {
            warn_missing_dependencies(&config).await;
            config.cache.enabled = false;
            let service = TranscriptService::from_config(&config, Arc::new(config.rate_limiter()))?;

            let spinner = spinner(cli.quiet, "Checking YouTube access...");
            let result = service.check_access().await;
            spinner.finish_and_clear();

            match result {
                Ok(tracks) => {
                    println!(
                        "{} YouTube access is working ({} caption tracks on the test video)",
                        style("✓").green().bold(),
                        tracks.len()
                    );
                }
                Err(failure) => {
                    report_failure(&failure);
                    std::process::exit(1);
                }
            }
        }
        Commands::Cache { action } => {
            let store = CacheStore::open(config.cache_dir()?, config.max_cache_bytes())?;
            run_cache_action(&store, action)?;
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Edit the config file to change settings:");
                println!("  {}", Config::config_path()?.display());
            }
        }
    }

    Ok(())
}

fn run_cache_action(store: &CacheStore, action: CacheAction) -> Result<()> {
    match action {
        CacheAction::Stats => {
            println!("Cache directory: {}", store.root().display());
            println!("{}", output::format_cache_stats(&store.stats()));
        }
        CacheAction::List => {
            println!("{}", output::format_cache_entries(&store.list_entries()));
        }
        CacheAction::Clear => {
            if !store.clear() {
                anyhow::bail!("Failed to clear cache at {}", store.root().display());
            }
            println!("Cache cleared");
        }
        CacheAction::Delete { video } => {
            let video_id = parse_video_id(&video, DEFAULT_MAX_URL_LENGTH)
                .or_else(|error| {
                    if video.len() == 11 && !video.contains('/') {
                        Ok(video.clone())
                    } else {
                        Err(error)
                    }
                })?;

            let key = CacheKey::for_identity(&video_id);
            if !store.delete(&key) {
                anyhow::bail!("Failed to delete cached artifacts for {}", video_id);
            }
            println!("Deleted cached artifacts for {}", video_id);
        }
    }

    Ok(())
}

async fn warn_missing_dependencies(config: &Config) {
    let missing_deps = utils::check_dependencies(&config.upstream.yt_dlp_path).await;
    if !missing_deps.is_empty() {
        eprintln!("{}", style("Dependency check warnings:").yellow());
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }
}

fn spinner(quiet: bool, message: &'static str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new_spinner();
    if let Ok(progress_style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        progress.set_style(progress_style);
    }
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

fn report_failure(failure: &FetchFailure) {
    let error = &failure.error;
    eprintln!(
        "{} {} after {} attempts",
        style("✗").red().bold(),
        style(error.kind).red(),
        failure.attempts
    );
    eprintln!("  {}", error.raw_detail);
    eprintln!("  {}", style(&error.suggestion).yellow());
    if let Some(wait) = error.suggested_wait() {
        eprintln!("  Wait about {} before trying again.", utils::format_wait(wait));
    }
}
