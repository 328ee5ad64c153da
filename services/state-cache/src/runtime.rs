//! Async driver
//!
//! The only place with a timer. Updates arrive over an mpsc channel and are
//! dispatched inline (the core never blocks); a `tokio::time::interval`
//! drives maintenance ticks. The loop ends when the channel closes or the
//! shutdown future resolves, after one final tick.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use types::time::now_millis;
use types::update::AccountUpdate;

use crate::maintenance::SweepReport;
use crate::system::StateCacheSystem;

/// Totals for one `run`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub updates: u64,
    pub faults: u64,
    pub ticks: u64,
    pub last_report: Option<SweepReport>,
}

/// Totals for one `feed_ndjson`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub lines: u64,
    pub sent: u64,
    pub malformed: u64,
}

/// Consume updates until the channel closes or `shutdown` resolves.
pub async fn run<S>(
    system: Arc<StateCacheSystem>,
    mut updates: mpsc::Receiver<AccountUpdate>,
    shutdown: S,
) -> RunSummary
where
    S: Future<Output = ()>,
{
    let sweep_every = Duration::from_millis(system.config.runtime.sweep_interval_ms.max(1));
    let mut interval = time::interval(sweep_every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut maintenance = system.maintenance();
    let mut summary = RunSummary::default();
    tokio::pin!(shutdown);

    info!(sweep_interval_ms = sweep_every.as_millis() as u64, "Ingestion loop started");

    loop {
        tokio::select! {
            maybe_update = updates.recv() => {
                let Some(update) = maybe_update else {
                    info!("Update channel closed");
                    break;
                };
                summary.updates += 1;
                let key = update.key;
                if let Err(err) = system.dispatcher.dispatch(update, now_millis()) {
                    summary.faults += 1;
                    debug!(key = %key, error = %err, "Update rejected");
                }
            }
            _ = interval.tick() => {
                summary.last_report = Some(maintenance.tick(now_millis()));
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    summary.last_report = Some(maintenance.tick(now_millis()));
    summary.ticks = maintenance.ticks();

    info!(
        updates = summary.updates,
        faults = summary.faults,
        ticks = summary.ticks,
        "Ingestion loop stopped"
    );
    summary
}

/// Parse newline-delimited JSON updates from `reader` into `tx`.
///
/// Blank lines are skipped; malformed lines are logged and counted. Stops
/// early if the receiver is dropped.
pub async fn feed_ndjson<R>(reader: R, tx: mpsc::Sender<AccountUpdate>) -> std::io::Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();

    while let Some(line) = lines.next_line().await? {
        stats.lines += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<AccountUpdate>(line) {
            Ok(update) => {
                if tx.send(update).await.is_err() {
                    warn!(line = stats.lines, "Update receiver dropped; stopping feed");
                    break;
                }
                stats.sent += 1;
            }
            Err(err) => {
                stats.malformed += 1;
                warn!(line = stats.lines, error = %err, "Skipping malformed update");
            }
        }
    }

    Ok(stats)
}
