//! Moderation queue: where auto-flags land for human review.

mod queue;

pub use queue::SqliteModerationQueue;

use crate::actions::ContentType;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    /// Reviewed and found legitimate
    Approved,
    /// Reviewed and confirmed as abuse
    Rejected,
    Escalated,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Approved => "approved",
            QueueStatus::Rejected => "rejected",
            QueueStatus::Escalated => "escalated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "approved" => Some(QueueStatus::Approved),
            "rejected" => Some(QueueStatus::Rejected),
            "escalated" => Some(QueueStatus::Escalated),
            _ => None,
        }
    }
}

/// A row of the moderation queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationQueueEntry {
    pub id: Uuid,
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub reason: String,
    pub priority: u8,
    pub status: QueueStatus,
    pub auto_flagged: bool,
    pub confidence_score: f64,
    pub report_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// An auto-flag about to be written, tied to the action event that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFlag {
    pub event_id: Uuid,
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub reason: String,
    pub priority: u8,
    pub confidence_score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New pending row
    Inserted(Uuid),
    /// Folded into an existing pending row for the same content
    Merged(Uuid),
    /// This action event was already written
    Duplicate(Uuid),
}

impl UpsertOutcome {
    pub fn queue_id(&self) -> Uuid {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Merged(id) | UpsertOutcome::Duplicate(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeStats {
    pub count: u64,
    pub avg_confidence: f64,
    pub avg_priority: f64,
}

/// Auto-flag aggregates since a cutoff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagStats {
    pub by_type: BTreeMap<ContentType, TypeStats>,
    pub by_status: BTreeMap<QueueStatus, u64>,
}

impl FlagStats {
    pub fn status_count(&self, status: QueueStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.by_status.values().sum()
    }
}

#[async_trait]
pub trait ModerationQueue: Send + Sync {
    /// Insert a pending auto-flag or merge into the pending row for the same
    /// content. Idempotent per `event_id`.
    async fn upsert(&self, flag: &NewFlag) -> Result<UpsertOutcome>;

    /// Record a review decision. Returns `false` if no such row exists.
    async fn review(&self, id: Uuid, status: QueueStatus) -> Result<bool>;

    async fn get(&self, id: Uuid) -> Result<Option<ModerationQueueEntry>>;

    /// Pending rows, highest priority first.
    async fn pending(&self, limit: usize) -> Result<Vec<ModerationQueueEntry>>;

    async fn auto_flag_stats(&self, since: DateTime<Utc>) -> Result<FlagStats>;
}
