//! Anomaly scoring: weighted feature combination, severity banding and confidence.

mod engine;

pub use engine::{AnomalyScore, AnomalyScorer, Severity};
