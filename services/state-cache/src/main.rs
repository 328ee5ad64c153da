use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use state_cache::config::StateCacheConfig;
use state_cache::runtime;
use state_cache::StateCacheSystem;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use types::time::now_millis;

struct Args {
    config: Option<PathBuf>,
    input: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        input: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                args.config = Some(iter.next().context("--config requires a path")?.into());
            }
            "--input" => {
                args.input = Some(iter.next().context("--input requires a path")?.into());
            }
            other => bail!("unknown argument: {other} (usage: state-cache [--config PATH] [--input PATH])"),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .compact()
        .init();

    let args = parse_args()?;
    let config = StateCacheConfig::load(args.config.as_deref())
        .context("failed to load state cache configuration")?;

    tracing::info!(version = state_cache::SERVICE_VERSION, "Starting state cache replay");

    let channel_capacity = config.runtime.channel_capacity;
    let system = Arc::new(StateCacheSystem::new(config, now_millis()));
    let (tx, rx) = mpsc::channel(channel_capacity);

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let mut feeder = tokio::spawn(runtime::feed_ndjson(reader, tx));

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let summary = runtime::run(system.clone(), rx, shutdown).await;

    // After a shutdown signal the feeder may still be parked on a read
    let feed = match tokio::time::timeout(Duration::from_millis(500), &mut feeder).await {
        Ok(joined) => joined
            .context("input feeder task panicked")?
            .context("failed to read input")?,
        Err(_) => {
            feeder.abort();
            runtime::FeedStats::default()
        }
    };

    tracing::info!(
        lines = feed.lines,
        sent = feed.sent,
        malformed = feed.malformed,
        updates = summary.updates,
        faults = summary.faults,
        ticks = summary.ticks,
        blocked = system.health.should_block_execution(),
        "Replay finished"
    );
    for (name, value) in system.metrics() {
        tracing::info!(metric = %name, value, "Final metric");
    }

    Ok(())
}
