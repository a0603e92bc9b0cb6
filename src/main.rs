//! Dry-run a mod against the in-memory engine.
//!
//! Loads a mod from a file or URL, starts a local session and drives it for a
//! fixed number of ticks. With `--watch-ms` the source is polled while the
//! session runs, so edits show up live.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use starblast_mod_runner::{InMemoryEngine, ModRunner, RunnerConfig, TrustLevel, WatchOptions};

#[derive(Parser, Debug)]
#[command(name = "starblast-mod-runner")]
struct Args {
    /// Mod to run: a local path, or an http(s) URL
    source: String,

    /// Poll the source every N milliseconds and hot-reload on change
    #[arg(long)]
    watch_ms: Option<f64>,

    /// Number of simulation steps to run before stopping
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// Wall-clock milliseconds between steps
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,

    /// JSON file with runner settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop the session on the first mod error
    #[arg(long, default_value_t = false)]
    crash_on_error: bool,

    /// Give the mod io/os/package
    #[arg(long, default_value_t = false)]
    elevated: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            RunnerConfig::from_json(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => RunnerConfig::default(),
    };
    if args.crash_on_error {
        config.crash_on_error = true;
    }
    if args.elevated {
        config.trust = TrustLevel::Elevated;
    }

    let engine = Arc::new(InMemoryEngine::new());
    let runner = ModRunner::new(engine.clone(), config).context("creating mod runner")?;

    let watch = args
        .watch_ms
        .map(WatchOptions::every)
        .unwrap_or_else(WatchOptions::disabled);
    if args.source.starts_with("http://") || args.source.starts_with("https://") {
        runner.load_from_remote_url(args.source.clone(), watch).await?;
    } else {
        runner
            .load_from_local_file(PathBuf::from(&args.source), watch)
            .await?;
    }

    let link = runner.start().await.context("starting session")?;
    println!("session: {link}");

    let mut interval = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    for _ in 0..args.ticks {
        tokio::select! {
            _ = interval.tick() => {
                engine.advance();
            }
            err = runner.terminated() => {
                println!("{}", serde_json::to_string_pretty(&runner.status().await)?);
                return Err(err.into());
            }
        }
    }

    if runner.status().await.started {
        runner.stop().await?;
    }
    println!("{}", serde_json::to_string_pretty(&runner.status().await)?);
    println!("{} engine commands recorded", engine.commands().len());
    Ok(())
}
