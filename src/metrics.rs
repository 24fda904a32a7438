//! Detection counters and false-positive health.
//!
//! Counters are lock-free and only ever incremented; a [`MetricsSnapshot`] is a
//! consistent-enough copy for the replay report. Every record is also emitted
//! through the `metrics` facade, so an installed recorder (Prometheus via
//! [`install_prometheus_exporter`]) sees the same series. FPR is computed from
//! moderation-queue review outcomes, not from these counters.

use crate::actions::ActionType;
use crate::error::{EngineError, Result};
use crate::flagging::FlagOutcome;
use crate::risk::Severity;
use crate::storage::{FlagStats, QueueStatus};
use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const ACTIONS_SCORED: &str = "abuse_engine_actions_scored_total";
pub const AUTO_FLAGS: &str = "abuse_engine_auto_flags_total";
pub const EVENTS_REJECTED: &str = "abuse_engine_events_rejected_total";
pub const PROCESSING_SECONDS: &str = "abuse_engine_processing_seconds";
pub const FALSE_POSITIVE_RATE: &str = "abuse_engine_false_positive_rate";

/// Pipeline latency buckets, 100µs to 1s.
const LATENCY_BUCKETS: [f64; 9] = [0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

/// Install the global Prometheus recorder with a scrape endpoint on `port`.
/// Must be called from inside a tokio runtime.
pub fn install_prometheus_exporter(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .set_buckets_for_metric(Matcher::Full(PROCESSING_SECONDS.to_string()), &LATENCY_BUCKETS)
        .and_then(|b| b.install())
        .map_err(|e| EngineError::Configuration(format!("prometheus exporter: {e}")))?;
    describe();
    Ok(())
}

fn describe() {
    describe_counter!(ACTIONS_SCORED, "Actions scored, by action and severity");
    describe_counter!(AUTO_FLAGS, "Auto-flag outcomes, by action");
    describe_counter!(EVENTS_REJECTED, "Events dropped, or scored without features, by reason");
    describe_histogram!(PROCESSING_SECONDS, Unit::Seconds, "Time from dequeue to flag decision");
    describe_gauge!(FALSE_POSITIVE_RATE, "Approved share of reviewed auto-flags");
}

const ACTIONS: usize = ActionType::ALL.len();
const SEVERITIES: usize = Severity::ALL.len();

#[derive(Debug, Default)]
pub struct DetectionMetrics {
    scored: [[AtomicU64; SEVERITIES]; ACTIONS],
    /// Scores at medium severity or above
    anomalies: [AtomicU64; ACTIONS],
    auto_flagged: [AtomicU64; ACTIONS],
    merged: AtomicU64,
    duplicate: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
    extraction_failures: AtomicU64,
    dispatch_dropped: AtomicU64,
    processed: AtomicU64,
    processing_time_ns: AtomicU64,
}

impl DetectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_score(&self, action: ActionType, severity: Severity) {
        self.scored[action.index()][severity.index()].fetch_add(1, Ordering::Relaxed);
        if severity >= Severity::Medium {
            self.anomalies[action.index()].fetch_add(1, Ordering::Relaxed);
        }
        counter!(ACTIONS_SCORED,
            "action" => action.as_str(),
            "severity" => severity.as_str()
        )
        .increment(1);
    }

    pub fn record_flag(&self, action: ActionType, outcome: &FlagOutcome) {
        if *outcome != FlagOutcome::NotFlagged {
            counter!(AUTO_FLAGS,
                "action" => action.as_str(),
                "outcome" => outcome.as_str()
            )
            .increment(1);
        }
        match outcome {
            FlagOutcome::NotFlagged => {}
            FlagOutcome::Inserted(_) => {
                self.auto_flagged[action.index()].fetch_add(1, Ordering::Relaxed);
            }
            FlagOutcome::Merged(_) => {
                self.auto_flagged[action.index()].fetch_add(1, Ordering::Relaxed);
                self.merged.fetch_add(1, Ordering::Relaxed);
            }
            FlagOutcome::Duplicate(_) => {
                self.duplicate.fetch_add(1, Ordering::Relaxed);
            }
            FlagOutcome::Dropped => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        counter!(EVENTS_REJECTED, "reason" => "malformed").increment(1);
    }

    /// Store failure; the event was still scored, on an empty feature set.
    pub fn record_extraction_failure(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
        counter!(EVENTS_REJECTED, "reason" => "extraction_failure").increment(1);
    }

    pub fn record_dispatch_drop(&self) {
        self.dispatch_dropped.fetch_add(1, Ordering::Relaxed);
        counter!(EVENTS_REJECTED, "reason" => "dispatch_dropped").increment(1);
    }

    /// One event through the pipeline, whatever the result.
    pub fn record_processed(&self, latency: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.processing_time_ns
            .fetch_add(latency.as_nanos().min(u64::MAX as u128) as u64, Ordering::Relaxed);
        histogram!(PROCESSING_SECONDS).record(latency.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let by_action = ActionType::ALL
            .iter()
            .map(|action| {
                let i = action.index();
                let scored = Severity::ALL
                    .iter()
                    .map(|s| (*s, load(&self.scored[i][s.index()])))
                    .collect();
                let counts = ActionCounts {
                    scored,
                    anomalies: load(&self.anomalies[i]),
                    auto_flagged: load(&self.auto_flagged[i]),
                };
                (*action, counts)
            })
            .collect();

        let processed = load(&self.processed);
        let avg_latency_us = if processed == 0 {
            0.0
        } else {
            load(&self.processing_time_ns) as f64 / processed as f64 / 1000.0
        };

        MetricsSnapshot {
            by_action,
            merged: load(&self.merged),
            duplicate: load(&self.duplicate),
            dropped: load(&self.dropped),
            malformed: load(&self.malformed),
            extraction_failures: load(&self.extraction_failures),
            dispatch_dropped: load(&self.dispatch_dropped),
            processed,
            avg_latency_us,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionCounts {
    pub scored: BTreeMap<Severity, u64>,
    pub anomalies: u64,
    pub auto_flagged: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub by_action: BTreeMap<ActionType, ActionCounts>,
    pub merged: u64,
    pub duplicate: u64,
    pub dropped: u64,
    pub malformed: u64,
    pub extraction_failures: u64,
    pub dispatch_dropped: u64,
    pub processed: u64,
    pub avg_latency_us: f64,
}

impl MetricsSnapshot {
    pub fn total_anomalies(&self) -> u64 {
        self.by_action.values().map(|c| c.anomalies).sum()
    }

    pub fn total_auto_flagged(&self) -> u64 {
        self.by_action.values().map(|c| c.auto_flagged).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// False-positive rate over reviewed auto-flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FalsePositiveReport {
    /// Reviewed and found legitimate
    pub approved: u64,
    /// Reviewed and confirmed as abuse
    pub rejected: u64,
    pub total_flags: u64,
    pub false_positive_rate: f64,
    pub target: f64,
    pub status: HealthStatus,
}

impl FalsePositiveReport {
    /// `approved / (approved + rejected)`; pending and escalated rows are
    /// not yet decided and do not count. No reviews reads as 0.
    pub fn from_stats(stats: &FlagStats, target: f64) -> Self {
        let approved = stats.status_count(QueueStatus::Approved);
        let rejected = stats.status_count(QueueStatus::Rejected);
        let reviewed = approved + rejected;
        let false_positive_rate = if reviewed == 0 {
            0.0
        } else {
            approved as f64 / reviewed as f64
        };
        Self {
            approved,
            rejected,
            total_flags: stats.total(),
            false_positive_rate,
            target,
            status: if false_positive_rate <= target {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
        }
    }

    /// Set the FPR gauge on the installed recorder.
    pub fn publish(&self) {
        gauge!(FALSE_POSITIVE_RATE).set(self.false_positive_rate);
    }
}
