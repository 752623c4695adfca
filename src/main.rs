mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use release_fetch::{FetchConfig, FetchContext, FetchResult, Fetcher, VersionCache};
use tokio_util::sync::CancellationToken;

fn main() {
    let args = cli::Args::parse();

    let config = match load_config(&args.overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(2);
        }
    };

    let level = config
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Info);

    // RUST_LOG still wins over the configured level
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(level)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    match rt.block_on(real_main(args.sub, config)) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

/// `--config`, else the per-user config file if present, then flag overrides
fn load_config(overrides: &cli::Overrides) -> Result<FetchConfig> {
    let path = overrides
        .config
        .clone()
        .or_else(|| FetchConfig::default_path().filter(|path| path.exists()));

    let config = match path {
        Some(path) => FetchConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => FetchConfig::default(),
    };

    let config = overrides.apply(config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn real_main(cmd: cli::Cmd, config: FetchConfig) -> Result<i32> {
    let cancel = CancellationToken::new();
    let fetcher = || -> Result<Fetcher> {
        install_signal_handler(cancel.clone());
        let fetcher = Fetcher::new(config.clone())
            .context("Failed to initialise fetcher")?
            .with_context(FetchContext::new().with_cancellation(cancel.clone()));
        Ok(fetcher)
    };

    let result = match cmd {
        cli::Cmd::Latest { repo } => fetcher()?
            .download_latest_release(&repo.owner, &repo.name)
            .await
            .with_context(|| format!("Failed to fetch latest release of {}/{}", repo.owner, repo.name))?,
        cli::Cmd::Release { repo, tag } => fetcher()?
            .download_specific_release(&repo.owner, &repo.name, &tag)
            .await
            .with_context(|| format!("Failed to fetch {}/{} {tag}", repo.owner, repo.name))?,
        cli::Cmd::Source { repo, tag } => fetcher()?
            .download_source_code(&repo.owner, &repo.name, tag.as_deref().unwrap_or(""))
            .await
            .with_context(|| format!("Failed to fetch source of {}/{}", repo.owner, repo.name))?,
        cli::Cmd::Check { repo, version } => {
            let latest = fetcher()?
                .is_latest_version(&repo.owner, &repo.name, &version)
                .await
                .with_context(|| format!("Failed to check {}/{}", repo.owner, repo.name))?;
            if latest {
                println!("{version} is the latest release of {}/{}", repo.owner, repo.name);
                return Ok(0);
            }
            println!("{version} is not the latest release of {}/{}", repo.owner, repo.name);
            return Ok(1);
        }
        cli::Cmd::Status { repo } => {
            let root = config.cache_root()?;
            match VersionCache::new(root).cached_tag(&repo.owner, &repo.name) {
                Some(tag) => println!("{}/{}: {tag}", repo.owner, repo.name),
                None => println!("{}/{}: not downloaded", repo.owner, repo.name),
            }
            return Ok(0);
        }
    };

    report(&result);
    Ok(0)
}

fn report(result: &FetchResult) {
    match result {
        FetchResult::UpToDate { tag, path } => {
            info!("Already at {tag}, nothing to download");
            println!("{}", path.display());
        }
        FetchResult::Fetched(delivery) => {
            info!(
                "Fetched {} into {} ({} warnings)",
                delivery.tag,
                delivery.path.display(),
                delivery.warnings.len()
            );
            println!("{}", delivery.path.display());
        }
    }
}

fn install_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, cancelling downloads");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
        }
    });
}
