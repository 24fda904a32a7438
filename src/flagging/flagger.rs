//! Dual-threshold flag decision, priority mapping and the queue write.

use crate::actions::{ActionEvent, ContentType};
use crate::config::FlagConfig;
use crate::features::ReasonCode;
use crate::risk::AnomalyScore;
use crate::storage::{ModerationQueue, NewFlag, UpsertOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const FALLBACK_REASON: &str = "Anomalous activity detected";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDecision {
    pub should_flag: bool,
    /// 0–100; every flagged decision is at least the configured floor
    pub priority: u8,
    pub reason: String,
    pub confidence_score: f64,
    pub content_type: ContentType,
    pub content_id: Uuid,
}

/// What happened to a decision once it reached the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "queue_id")]
pub enum FlagOutcome {
    NotFlagged,
    Inserted(Uuid),
    Merged(Uuid),
    Duplicate(Uuid),
    /// The write failed after all retries
    Dropped,
}

impl FlagOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagOutcome::NotFlagged => "not_flagged",
            FlagOutcome::Inserted(_) => "inserted",
            FlagOutcome::Merged(_) => "merged",
            FlagOutcome::Duplicate(_) => "duplicate",
            FlagOutcome::Dropped => "dropped",
        }
    }
}

impl From<UpsertOutcome> for FlagOutcome {
    fn from(o: UpsertOutcome) -> Self {
        match o {
            UpsertOutcome::Inserted(id) => FlagOutcome::Inserted(id),
            UpsertOutcome::Merged(id) => FlagOutcome::Merged(id),
            UpsertOutcome::Duplicate(id) => FlagOutcome::Duplicate(id),
        }
    }
}

pub struct AutoFlagger {
    config: FlagConfig,
    queue: Arc<dyn ModerationQueue>,
}

impl AutoFlagger {
    pub fn new(config: FlagConfig, queue: Arc<dyn ModerationQueue>) -> Self {
        Self { config, queue }
    }

    /// Flag iff `overall >= min_score` and `confidence >= min_confidence`.
    pub fn decide(&self, score: &AnomalyScore, content_type: ContentType, content_id: Uuid) -> FlagDecision {
        let should_flag =
            score.overall >= self.config.min_score && score.confidence >= self.config.min_confidence;
        FlagDecision {
            should_flag,
            priority: self.priority(score.overall, should_flag),
            reason: self.reason(&score.reason_codes),
            confidence_score: score.confidence,
            content_type,
            content_id,
        }
    }

    /// Flagged scores rescale `[min_score, 1]` onto `[floor, 100]`; the rest map
    /// `[0, min_score)` below the floor.
    pub fn priority(&self, overall: f64, flagged: bool) -> u8 {
        let floor = self.config.min_priority.min(100) as f64;
        let t = self.config.min_score;
        let overall = overall.clamp(0.0, 1.0);
        if flagged {
            let span = 1.0 - t;
            let p = if span <= f64::EPSILON {
                100.0
            } else {
                floor + (overall - t) / span * (100.0 - floor)
            };
            p.floor().clamp(floor, 100.0) as u8
        } else {
            let ceiling = (floor - 1.0).max(0.0);
            if t <= 0.0 {
                return ceiling as u8;
            }
            (overall / t * floor).floor().clamp(0.0, ceiling) as u8
        }
    }

    /// Moderator-facing descriptions of the first few codes, `; `-joined.
    pub fn reason(&self, codes: &BTreeSet<ReasonCode>) -> String {
        if codes.is_empty() {
            return FALLBACK_REASON.to_string();
        }
        codes
            .iter()
            .take(self.config.max_reasons.max(1))
            .map(|c| c.description())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Decide for `event` and write the flag when warranted.
    pub async fn flag(&self, event: &ActionEvent, score: &AnomalyScore) -> (FlagDecision, FlagOutcome) {
        let (content_type, content_id) = event.flag_subject();
        let decision = self.decide(score, content_type, content_id);
        let outcome = self.emit(event.event_id, &decision).await;
        if decision.should_flag {
            info!(
                event_id = %event.event_id,
                user_id = %event.user_id,
                action = event.action_type.as_str(),
                content_type = content_type.as_str(),
                %content_id,
                score = score.overall,
                confidence = score.confidence,
                priority = decision.priority,
                reasons = %decision.reason,
                outcome = ?outcome,
                "auto flag"
            );
        }
        (decision, outcome)
    }

    /// Write a positive decision to the queue, retrying failed writes.
    pub async fn emit(&self, event_id: Uuid, decision: &FlagDecision) -> FlagOutcome {
        if !decision.should_flag {
            return FlagOutcome::NotFlagged;
        }
        let flag = NewFlag {
            event_id,
            content_type: decision.content_type,
            content_id: decision.content_id,
            reason: decision.reason.clone(),
            priority: decision.priority,
            confidence_score: decision.confidence_score,
            created_at: chrono::Utc::now(),
        };

        let attempts = self.config.write_retries + 1;
        for attempt in 1..=attempts {
            match self.queue.upsert(&flag).await {
                Ok(outcome) => return outcome.into(),
                Err(e) if attempt < attempts => {
                    warn!(%event_id, attempt, error = %e, "moderation queue write failed, retrying");
                }
                Err(e) => {
                    error!(
                        %event_id,
                        content_type = decision.content_type.as_str(),
                        content_id = %decision.content_id,
                        error = %e,
                        "dropping auto flag"
                    );
                }
            }
        }
        FlagOutcome::Dropped
    }
}
