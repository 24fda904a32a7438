//! Feature extraction: one action plus window-store state → bounded sub-scores.
//!
//! Five groups feed the scorer: velocity, IP/UA correlation, graph patterns,
//! behavioral statistics and the externally supplied trust score. A group that
//! cannot be computed scores 0 and does not count towards confidence.

mod behavioral;
mod extractor;
mod graph;
mod network;
mod trust;
mod velocity;

pub use extractor::FeatureExtractor;

use crate::actions::ActionType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Triggered rule identifiers. Declaration order is reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    CoordinatedVotingDetected,
    CircularFollowPattern,
    IpSharedMultipleAccounts,
    UaSharedMultipleAccounts,
    IpHoppingDetected,
    VoteVelocityHigh,
    FollowVelocityHigh,
    SubmissionVelocityHigh,
    BurstActivityDetected,
    TimingPatternSuspicious,
    VotePatternMonotonous,
    LowTrustScore,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::CoordinatedVotingDetected => "COORDINATED_VOTING_DETECTED",
            ReasonCode::CircularFollowPattern => "CIRCULAR_FOLLOW_PATTERN",
            ReasonCode::IpSharedMultipleAccounts => "IP_SHARED_MULTIPLE_ACCOUNTS",
            ReasonCode::UaSharedMultipleAccounts => "UA_SHARED_MULTIPLE_ACCOUNTS",
            ReasonCode::IpHoppingDetected => "IP_HOPPING_DETECTED",
            ReasonCode::VoteVelocityHigh => "VOTE_VELOCITY_HIGH",
            ReasonCode::FollowVelocityHigh => "FOLLOW_VELOCITY_HIGH",
            ReasonCode::SubmissionVelocityHigh => "SUBMISSION_VELOCITY_HIGH",
            ReasonCode::BurstActivityDetected => "BURST_ACTIVITY_DETECTED",
            ReasonCode::TimingPatternSuspicious => "TIMING_PATTERN_SUSPICIOUS",
            ReasonCode::VotePatternMonotonous => "VOTE_PATTERN_MONOTONOUS",
            ReasonCode::LowTrustScore => "LOW_TRUST_SCORE",
        }
    }

    /// Text shown to moderators.
    pub fn description(&self) -> &'static str {
        match self {
            ReasonCode::CoordinatedVotingDetected => "Coordinated voting pattern",
            ReasonCode::CircularFollowPattern => "Circular follow pattern",
            ReasonCode::IpSharedMultipleAccounts => "Multiple accounts from same IP",
            ReasonCode::UaSharedMultipleAccounts => "Multiple accounts sharing one client",
            ReasonCode::IpHoppingDetected => "Frequent IP address changes",
            ReasonCode::VoteVelocityHigh => "High voting velocity",
            ReasonCode::FollowVelocityHigh => "High follow velocity",
            ReasonCode::SubmissionVelocityHigh => "High submission velocity",
            ReasonCode::BurstActivityDetected => "Burst activity pattern",
            ReasonCode::TimingPatternSuspicious => "Suspicious timing pattern",
            ReasonCode::VotePatternMonotonous => "Monotonous voting pattern",
            ReasonCode::LowTrustScore => "Low trust score",
        }
    }

    pub fn velocity_for(action: ActionType) -> Self {
        match action {
            ActionType::Vote => ReasonCode::VoteVelocityHigh,
            ActionType::Follow => ReasonCode::FollowVelocityHigh,
            ActionType::Submission => ReasonCode::SubmissionVelocityHigh,
        }
    }
}

/// Underlying measurements, kept for logs and moderator context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSignals {
    pub count_5m: i64,
    pub count_1h: i64,
    pub count_24h: i64,
    pub ip_shared_accounts: u64,
    pub distinct_ips: u64,
    pub ua_shared_accounts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinated_accounts: Option<u64>,
    /// Length of the shortest path back to the follower
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_cycle_hops: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_diversity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing_cv: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_score: Option<i32>,
}

/// Per-action features. Every sub-score lies in [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub velocity: f64,
    pub ip_ua: f64,
    pub graph: f64,
    pub behavioral: f64,
    pub trust_contribution: f64,
    pub reason_codes: BTreeSet<ReasonCode>,
    /// Groups (of five) that had enough data to compute
    pub present_feature_count: u8,
    pub account_age_days: i64,
    pub raw: RawSignals,
}

/// Outcome of one feature group.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct GroupScore {
    pub score: f64,
    pub present: bool,
    pub codes: Vec<ReasonCode>,
}

impl GroupScore {
    pub(crate) fn absent() -> Self {
        Self::default()
    }
}

/// Probabilistic OR: one strong signal dominates, weak ones accumulate, result ≤ 1.
pub(crate) fn noisy_or(signals: &[f64]) -> f64 {
    1.0 - signals
        .iter()
        .map(|s| 1.0 - s.clamp(0.0, 1.0))
        .product::<f64>()
}

/// Strength of a count-based rule: 1.0 at or above `threshold`, a linear ramp up
/// to `ceiling` between 2 and the threshold, 0 for a single observation.
pub(crate) fn ramp(count: u64, threshold: u64, ceiling: f64) -> f64 {
    if count >= threshold {
        1.0
    } else if count <= 1 || threshold <= 2 {
        0.0
    } else {
        ceiling * (count - 1) as f64 / (threshold - 1) as f64
    }
}
