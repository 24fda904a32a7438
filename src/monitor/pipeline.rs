//! One action through extract → score → flag. Nothing escapes `process`.

use crate::actions::{ActionEvent, UserProfile};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::features::{FeatureExtractor, FeatureSet};
use crate::flagging::{AutoFlagger, FlagDecision, FlagOutcome};
use crate::metrics::DetectionMetrics;
use crate::risk::{AnomalyScore, AnomalyScorer};
use crate::storage::ModerationQueue;
use crate::trust::TrustProvider;
use crate::window::{TimeoutStore, WindowStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Everything decided about one event.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub features: FeatureSet,
    pub score: AnomalyScore,
    pub decision: FlagDecision,
    pub outcome: FlagOutcome,
}

pub struct Pipeline {
    extractor: FeatureExtractor,
    scorer: AnomalyScorer,
    flagger: AutoFlagger,
    trust: Arc<dyn TrustProvider>,
    trust_timeout: Duration,
    metrics: Arc<DetectionMetrics>,
}

impl Pipeline {
    /// Store operations are bounded by `dispatch.store_timeout_ms`.
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn WindowStore>,
        queue: Arc<dyn ModerationQueue>,
        trust: Arc<dyn TrustProvider>,
        metrics: Arc<DetectionMetrics>,
    ) -> Self {
        let store: Arc<dyn WindowStore> = Arc::new(TimeoutStore::new(store, config.dispatch.store_timeout()));
        Self {
            extractor: FeatureExtractor::new(store, config),
            scorer: AnomalyScorer::new(config.scoring.clone()),
            flagger: AutoFlagger::new(config.flagging.clone(), queue),
            trust,
            trust_timeout: config.dispatch.trust_timeout(),
            metrics,
        }
    }

    /// Returns `None` only for malformed events. Store outages score an empty
    /// feature set, which never flags.
    pub async fn process(&self, event: &ActionEvent) -> Option<PipelineResult> {
        let started = Instant::now();
        let result = self.run(event).await;
        self.metrics.record_processed(started.elapsed());
        result
    }

    async fn run(&self, event: &ActionEvent) -> Option<PipelineResult> {
        if let Err(e) = event.validate() {
            self.metrics.record_malformed();
            warn!(event_id = %event.event_id, error = %e, "discarding malformed action");
            return None;
        }

        let profile = self.lookup_profile(event).await;
        let features = match self.extractor.extract(event, profile.as_ref()).await {
            Ok(features) => features,
            Err(EngineError::MalformedEvent(reason)) => {
                self.metrics.record_malformed();
                warn!(event_id = %event.event_id, %reason, "discarding malformed action");
                return None;
            }
            Err(e) => {
                self.metrics.record_extraction_failure();
                if e.is_recoverable() {
                    warn!(event_id = %event.event_id, error = %e, "feature extraction failed, scoring empty feature set");
                } else {
                    error!(event_id = %event.event_id, error = %e, "feature extraction failed, scoring empty feature set");
                }
                FeatureSet::default()
            }
        };

        let score = self.scorer.score(&features);
        self.metrics.record_score(event.action_type, score.severity);
        debug!(
            event_id = %event.event_id,
            user_id = %event.user_id,
            action = event.action_type.as_str(),
            score = score.overall,
            confidence = score.confidence,
            severity = score.severity.as_str(),
            reasons = ?score.reason_codes,
            "scored action"
        );

        let (decision, outcome) = self.flagger.flag(event, &score).await;
        self.metrics.record_flag(event.action_type, &outcome);

        Some(PipelineResult {
            event_id: event.event_id,
            user_id: event.user_id,
            features,
            score,
            decision,
            outcome,
        })
    }

    /// A failed or slow lookup leaves the trust group out.
    async fn lookup_profile(&self, event: &ActionEvent) -> Option<UserProfile> {
        match tokio::time::timeout(self.trust_timeout, self.trust.profile(event.user_id)).await {
            Ok(Ok(profile)) => profile,
            Ok(Err(e)) => {
                warn!(user_id = %event.user_id, error = %e, "trust lookup failed");
                None
            }
            Err(_) => {
                warn!(user_id = %event.user_id, timeout = ?self.trust_timeout, "trust lookup timed out");
                None
            }
        }
    }
}
