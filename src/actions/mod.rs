//! Observed user actions (vote, follow, submission) and the account context they
//! are scored against.

mod hashing;

pub use hashing::IdentityHasher;

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Vote,
    Follow,
    Submission,
}

impl ActionType {
    pub const ALL: [ActionType; 3] = [ActionType::Vote, ActionType::Follow, ActionType::Submission];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Vote => "vote",
            ActionType::Follow => "follow",
            ActionType::Submission => "submission",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ActionType::Vote => 0,
            ActionType::Follow => 1,
            ActionType::Submission => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    /// Maps the handler's vote type (+1 / -1).
    pub fn from_vote_type(vote_type: i16) -> Option<Self> {
        match vote_type {
            1 => Some(VoteDirection::Up),
            -1 => Some(VoteDirection::Down),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

/// What a moderation queue entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    User,
    Submission,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::User => "user",
            ContentType::Submission => "submission",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(ContentType::User),
            "submission" => Some(ContentType::Submission),
            _ => None,
        }
    }
}

/// One observed user action. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub action_type: ActionType,
    /// Clip for votes, followed user for follows, submission for submissions
    pub target_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteDirection>,
    /// Salted SHA-256 of the client IP
    #[serde(default)]
    pub ip_hash: String,
    /// Salted SHA-256 of the normalized user agent
    #[serde(default)]
    pub ua_hash: String,
    pub occurred_at: DateTime<Utc>,
}

impl ActionEvent {
    fn new(
        user_id: Uuid,
        action_type: ActionType,
        target_id: Uuid,
        ip_hash: impl Into<String>,
        ua_hash: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id,
            action_type,
            target_id,
            vote: None,
            ip_hash: ip_hash.into(),
            ua_hash: ua_hash.into(),
            occurred_at,
        }
    }

    pub fn vote(
        user_id: Uuid,
        clip_id: Uuid,
        direction: VoteDirection,
        ip_hash: impl Into<String>,
        ua_hash: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let mut ev = Self::new(user_id, ActionType::Vote, clip_id, ip_hash, ua_hash, occurred_at);
        ev.vote = Some(direction);
        ev
    }

    pub fn follow(
        follower_id: Uuid,
        following_id: Uuid,
        ip_hash: impl Into<String>,
        ua_hash: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(follower_id, ActionType::Follow, following_id, ip_hash, ua_hash, occurred_at)
    }

    pub fn submission(
        user_id: Uuid,
        submission_id: Uuid,
        ip_hash: impl Into<String>,
        ua_hash: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(user_id, ActionType::Submission, submission_id, ip_hash, ua_hash, occurred_at)
    }

    /// Rejects events missing a required identifier.
    pub fn validate(&self) -> Result<()> {
        if self.event_id.is_nil() {
            return Err(EngineError::MalformedEvent("nil event id".into()));
        }
        if self.user_id.is_nil() {
            return Err(EngineError::MalformedEvent("nil user id".into()));
        }
        if self.target_id.is_nil() {
            return Err(EngineError::MalformedEvent(format!(
                "nil target id for {}",
                self.action_type.as_str()
            )));
        }
        if self.ip_hash.trim().is_empty() {
            return Err(EngineError::MalformedEvent("empty ip hash".into()));
        }
        if self.ua_hash.trim().is_empty() {
            return Err(EngineError::MalformedEvent("empty user-agent hash".into()));
        }
        if self.action_type == ActionType::Vote && self.vote.is_none() {
            return Err(EngineError::MalformedEvent("vote without direction".into()));
        }
        Ok(())
    }

    /// Votes and follows flag the acting user; submissions flag the submission.
    pub fn flag_subject(&self) -> (ContentType, Uuid) {
        match self.action_type {
            ActionType::Vote | ActionType::Follow => (ContentType::User, self.user_id),
            ActionType::Submission => (ContentType::Submission, self.target_id),
        }
    }
}

/// Account context supplied by the trust-score service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// 0–100
    pub trust_score: i32,
    pub account_created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(trust_score: i32, account_created_at: DateTime<Utc>) -> Self {
        Self {
            trust_score: trust_score.clamp(0, 100),
            account_created_at,
        }
    }

    /// Whole days between account creation and `at`, never negative.
    pub fn account_age_days(&self, at: DateTime<Utc>) -> i64 {
        (at - self.account_created_at).num_days().max(0)
    }
}
