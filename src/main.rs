//! Abuse engine replay: feeds recorded actions (ndjson) through the detector.
//! Every flagged decision is written to stdout as one JSON line, followed by
//! the final metrics and false-positive report.
//!
//! Usage: `abuse-engine [events.ndjson]` (reads stdin without an argument).

use abuse_engine::{
    config::EngineConfig,
    logging::{FlagLogLine, StructuredLogger},
    monitor::{AbuseMonitor, Dispatch, PipelineResult},
    storage::SqliteModerationQueue,
    trust::StaticTrustProvider,
    window::{Clock, ManualClock, MemoryWindowStore},
    ActionEvent, IdentityHasher, UserProfile,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

static STOP: AtomicBool = AtomicBool::new(false);

/// Raw `ip`/`user_agent` are hashed with the configured salt and replace the
/// event's hashes.
#[derive(Debug, Deserialize)]
struct ReplayRecord {
    event: ActionEvent,
    #[serde(default)]
    profile: Option<UserProfile>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    user_agent: Option<String>,
}

impl ReplayRecord {
    fn into_event(self, identity: &IdentityHasher) -> ActionEvent {
        let mut event = self.event;
        if let Some(ip) = self.ip.as_deref() {
            event.ip_hash = identity.hash_ip(ip);
        }
        if let Some(ua) = self.user_agent.as_deref() {
            event.ua_hash = identity.hash_user_agent(ua);
        }
        event
    }
}

async fn write_flags(mut rx: mpsc::UnboundedReceiver<PipelineResult>) -> u64 {
    let mut written = 0;
    while let Some(result) = rx.recv().await {
        if !result.decision.should_flag {
            continue;
        }
        let mut out = std::io::stdout().lock();
        match StructuredLogger::emit_json(&FlagLogLine::from_result(&result), &mut out) {
            Ok(()) => written += 1,
            Err(e) => warn!(error = %e, "could not write flag line"),
        }
    }
    written
}

async fn replay(
    input: impl AsyncBufRead + Unpin,
    monitor: &AbuseMonitor,
    trust: &StaticTrustProvider,
    clock: &ManualClock,
) -> std::io::Result<u64> {
    let mut lines = input.lines();
    let mut line_no = 0u64;
    let mut queued = 0u64;
    let mut latest: Option<DateTime<Utc>> = None;

    while !STOP.load(Ordering::Relaxed) {
        let Some(line) = lines.next_line().await? else { break };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: ReplayRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping unparsable record");
                continue;
            }
        };

        if let Some(profile) = record.profile.clone() {
            trust.insert(record.event.user_id, profile);
        }
        let event = record.into_event(monitor.identity());
        // window expiry follows recorded time, never backwards
        if latest.map_or(true, |t| event.occurred_at > t) {
            latest = Some(event.occurred_at);
            clock.set(event.occurred_at);
        }
        if monitor.submit(event).await == Dispatch::Queued {
            queued += 1;
        }
    }
    Ok(queued)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = EngineConfig::path_from_env();
    let config = EngineConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);
    config.validate()?;
    if let Some(port) = config.monitoring.prometheus_port {
        abuse_engine::metrics::install_prometheus_exporter(port)?;
        info!(port, "prometheus exporter listening");
    }

    info!(config = ?config_path, queue = ?config.queue.path, "abuse engine replay starting");

    if let Err(e) = ctrlc::set_handler(|| STOP.store(true, Ordering::Relaxed)) {
        warn!(error = %e, "could not install Ctrl+C handler");
    }

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(MemoryWindowStore::new(clock.clone()));
    let queue = Arc::new(SqliteModerationQueue::open(&config.queue.path)?);
    let trust = Arc::new(StaticTrustProvider::new());

    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_flags(results_rx));
    let monitor = AbuseMonitor::start_with_results(&config, store.clone(), queue, trust.clone(), Some(results_tx))?;

    let queued = match std::env::args().nth(1) {
        Some(path) => {
            let file = tokio::fs::File::open(&path).await?;
            replay(BufReader::new(file), &monitor, &trust, &clock).await?
        }
        None => replay(BufReader::new(tokio::io::stdin()), &monitor, &trust, &clock).await?,
    };
    if STOP.load(Ordering::Relaxed) {
        info!("interrupted, draining queued actions");
    }

    let report = monitor.shutdown().await?;
    let flagged = writer.await?;
    info!(queued, flagged, clock = %clock.now(), live_keys = store.len(), "replay complete");

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
