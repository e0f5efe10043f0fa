mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use hlsforge::encoder::TranscodeScheduler;
use hlsforge::layout::{resolve_layout, MediaKind};
use hlsforge::notifications::ManifestNotifier;
use hlsforge::remux::download::DownloadCache;
use hlsforge::remux::live::LiveRemuxCache;
use hlsforge::remux::FfmpegRemuxer;
use hlsforge::config;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise derive a default from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "hlsforge=trace".to_string()
        } else {
            "hlsforge=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Run => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_daemon(cli.config.as_deref()))
        }
        Commands::Layout { source, episode } => {
            print_layout(&source, episode, cli.config.as_deref())
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Version => {
            println!("hlsforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_daemon(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = Arc::new(config::load_config_or_default(config_path)?);

    tracing::info!("Starting hlsforge daemon");
    tracing::info!("Media directory: {:?}", config.media_dir);
    tracing::info!(
        "Transcode workers: {}, remux workers: {}",
        config.transcode.workers,
        config.cache.remux_workers
    );

    let remuxer = Arc::new(FfmpegRemuxer::new(config.transcode.ffmpeg_path.clone()));

    let download_cache = Arc::new(DownloadCache::new(&config.cache, remuxer.clone()));
    download_cache
        .init()
        .await
        .context("Failed to prepare remux cache directory")?;
    tracing::info!("Remux cache ready at {:?}", config.cache.root_dir);
    let _download_sweeper = download_cache.start_sweeper(config.cache.sweep_interval());

    let live_cache = Arc::new(LiveRemuxCache::new(&config.cache, remuxer));
    let _live_sweeper = live_cache.start_sweeper(config.cache.sweep_interval());

    let notifier = Arc::new(ManifestNotifier::new(config.notify.clone()));
    if !notifier.enabled() {
        tracing::info!("Completion notifications disabled (no notify.url configured)");
    }

    let scheduler = TranscodeScheduler::new(Arc::clone(&config), notifier);

    tokio::select! {
        result = scheduler.run() => {
            result.context("Scheduler stopped unexpectedly")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}

fn print_layout(source: &str, episode: bool, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let kind = if episode {
        MediaKind::Episode
    } else {
        MediaKind::Movie
    };

    let layout = resolve_layout(kind, Some(source), None, &config.transcode.templates())
        .context("Could not derive a layout for that source path")?;

    println!("kind:              {}", kind.as_str());
    println!("base name:         {}", layout.base_name);
    println!("output directory:  {}", layout.output_dir);
    println!("master playlist:   {}", layout.master);
    println!("variant template:  {}", layout.variant_template);
    println!("segment template:  {}", layout.segment_template);
    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?;
        }
        None => {
            config::load_config_or_default(None)?;
        }
    }
    println!("Configuration is valid.");
    Ok(())
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let ffmpeg = &config.transcode.ffmpeg_path;

    match which::which(ffmpeg) {
        Ok(resolved) => {
            println!("✓ ffmpeg - {}", resolved.display());
            Ok(())
        }
        Err(_) => {
            println!("✗ ffmpeg not found ({:?})", ffmpeg);
            anyhow::bail!("ffmpeg is required; install it or set transcode.ffmpeg_path");
        }
    }
}
