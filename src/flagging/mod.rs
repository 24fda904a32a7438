//! Auto-flagging: turns an anomaly score into a moderation-queue decision.

mod flagger;

pub use flagger::{AutoFlagger, FlagDecision, FlagOutcome};
