//! Entry points for action handlers.
//!
//! Handlers call `check_*_action` after their own write succeeded. The call only
//! enqueues the event on a bounded channel and returns; a fixed pool of workers
//! drains the channel through the [`Pipeline`]. When the channel is full the
//! event is dropped and counted.

mod pipeline;

pub use pipeline::{Pipeline, PipelineResult};

use crate::actions::{ActionEvent, IdentityHasher, VoteDirection};
use crate::config::{EngineConfig, MonitoringConfig};
use crate::error::Result;
use crate::metrics::{DetectionMetrics, FalsePositiveReport, MetricsSnapshot};
use crate::storage::{FlagStats, ModerationQueue};
use crate::trust::TrustProvider;
use crate::window::WindowStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What happened to an action handed to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Queued,
    /// Work queue full or shut down
    Dropped,
    /// Could not be turned into an event
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub generated_at: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
    pub auto_flags: FlagStats,
    pub false_positives: FalsePositiveReport,
}

pub struct AbuseMonitor {
    tx: mpsc::Sender<ActionEvent>,
    workers: Vec<JoinHandle<()>>,
    metrics: Arc<DetectionMetrics>,
    queue: Arc<dyn ModerationQueue>,
    monitoring: MonitoringConfig,
    identity: IdentityHasher,
}

impl AbuseMonitor {
    /// Validate `config` and spawn the worker pool on the current runtime.
    pub fn start(
        config: &EngineConfig,
        store: Arc<dyn WindowStore>,
        queue: Arc<dyn ModerationQueue>,
        trust: Arc<dyn TrustProvider>,
    ) -> Result<Self> {
        Self::start_with_results(config, store, queue, trust, None)
    }

    /// Like [`AbuseMonitor::start`], also sending every pipeline result to `results`.
    pub fn start_with_results(
        config: &EngineConfig,
        store: Arc<dyn WindowStore>,
        queue: Arc<dyn ModerationQueue>,
        trust: Arc<dyn TrustProvider>,
        results: Option<mpsc::UnboundedSender<PipelineResult>>,
    ) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(DetectionMetrics::new());
        let pipeline = Arc::new(Pipeline::new(config, store, queue.clone(), trust, metrics.clone()));

        let (tx, rx) = mpsc::channel(config.dispatch.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..config.dispatch.workers)
            .map(|id| tokio::spawn(worker(id, rx.clone(), pipeline.clone(), results.clone())))
            .collect();

        info!(
            workers = config.dispatch.workers,
            capacity = config.dispatch.queue_capacity,
            "abuse monitor started"
        );
        Ok(Self {
            tx,
            workers,
            metrics,
            queue,
            monitoring: config.monitoring.clone(),
            identity: IdentityHasher::new(config.identity.salt.clone()),
        })
    }

    /// `vote_type` is +1 or -1; anything else is rejected.
    pub fn check_vote_action(
        &self,
        user_id: Uuid,
        clip_id: Uuid,
        vote_type: i16,
        ip_hash: &str,
        ua_hash: &str,
    ) -> Dispatch {
        let Some(direction) = VoteDirection::from_vote_type(vote_type) else {
            self.metrics.record_malformed();
            warn!(%user_id, vote_type, "unknown vote type");
            return Dispatch::Rejected;
        };
        self.dispatch(ActionEvent::vote(user_id, clip_id, direction, ip_hash, ua_hash, Utc::now()))
    }

    pub fn check_follow_action(&self, follower_id: Uuid, following_id: Uuid, ip_hash: &str, ua_hash: &str) -> Dispatch {
        self.dispatch(ActionEvent::follow(follower_id, following_id, ip_hash, ua_hash, Utc::now()))
    }

    pub fn check_submission_action(&self, user_id: Uuid, submission_id: Uuid, ip_hash: &str, ua_hash: &str) -> Dispatch {
        self.dispatch(ActionEvent::submission(user_id, submission_id, ip_hash, ua_hash, Utc::now()))
    }

    /// Hasher salted with `identity.salt`, for callers holding raw IPs and user agents.
    pub fn identity(&self) -> &IdentityHasher {
        &self.identity
    }

    /// Enqueue without waiting.
    pub fn dispatch(&self, event: ActionEvent) -> Dispatch {
        match self.tx.try_send(event) {
            Ok(()) => Dispatch::Queued,
            Err(TrySendError::Full(event)) => {
                self.metrics.record_dispatch_drop();
                warn!(event_id = %event.event_id, action = event.action_type.as_str(), "work queue full, dropping action");
                Dispatch::Dropped
            }
            Err(TrySendError::Closed(event)) => {
                self.metrics.record_dispatch_drop();
                warn!(event_id = %event.event_id, "monitor stopped, dropping action");
                Dispatch::Dropped
            }
        }
    }

    /// Enqueue, waiting for room. For batch replays, never for request paths.
    pub async fn submit(&self, event: ActionEvent) -> Dispatch {
        match self.tx.send(event).await {
            Ok(()) => Dispatch::Queued,
            Err(mpsc::error::SendError(event)) => {
                self.metrics.record_dispatch_drop();
                warn!(event_id = %event.event_id, "monitor stopped, dropping action");
                Dispatch::Dropped
            }
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Counters plus false-positive health over the review window.
    pub async fn report(&self) -> Result<MonitorReport> {
        build_report(&self.metrics, self.queue.as_ref(), &self.monitoring).await
    }

    /// Stop accepting actions, wait for queued ones to finish and return the
    /// final report.
    pub async fn shutdown(self) -> Result<MonitorReport> {
        let Self {
            tx,
            workers,
            metrics,
            queue,
            monitoring,
            ..
        } = self;
        drop(tx);
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "monitor worker panicked");
            }
        }
        info!("abuse monitor stopped");
        build_report(&metrics, queue.as_ref(), &monitoring).await
    }
}

async fn build_report(
    metrics: &DetectionMetrics,
    queue: &dyn ModerationQueue,
    monitoring: &MonitoringConfig,
) -> Result<MonitorReport> {
    let now = Utc::now();
    let since = now - ChronoDuration::hours(monitoring.review_window_hours);
    let auto_flags = queue.auto_flag_stats(since).await?;
    let false_positives = FalsePositiveReport::from_stats(&auto_flags, monitoring.fpr_target);
    false_positives.publish();
    Ok(MonitorReport {
        generated_at: now,
        metrics: metrics.snapshot(),
        auto_flags,
        false_positives,
    })
}

async fn worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<ActionEvent>>>,
    pipeline: Arc<Pipeline>,
    results: Option<mpsc::UnboundedSender<PipelineResult>>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(event) = next else { break };
        if let Some(result) = pipeline.process(&event).await {
            if let Some(tx) = &results {
                // receiver gone just means nobody is listening
                let _ = tx.send(result);
            }
        }
    }
    debug!(worker = id, "monitor worker exiting");
}
