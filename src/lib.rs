//! Abuse Engine — real-time anomaly detection and auto-flagging for user actions.
//!
//! Modular structure:
//! - [`actions`] — Vote, follow and submission events; salted identity hashing
//! - [`window`] — TTL-scoped counter/set/list store behind an async trait
//! - [`features`] — Velocity, IP/UA, graph, behavioral and trust feature extraction
//! - [`risk`] — Weighted anomaly score, severity bands and confidence
//! - [`flagging`] — Dual-threshold auto-flag decision and queue write
//! - [`storage`] — SQLite moderation queue
//! - [`trust`] — Trust-score lookup
//! - [`metrics`] — Detection counters and false-positive health
//! - [`monitor`] — Non-blocking entry points and worker pool
//! - [`logging`] — Structured JSON logging

pub mod actions;
pub mod config;
pub mod error;
pub mod features;
pub mod flagging;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod risk;
pub mod storage;
pub mod trust;
pub mod window;

pub use actions::{ActionEvent, ActionType, ContentType, IdentityHasher, UserProfile, VoteDirection};
pub use config::EngineConfig;
pub use error::{EngineError, Result, StoreError};
pub use features::{FeatureExtractor, FeatureSet, ReasonCode};
pub use flagging::{AutoFlagger, FlagDecision, FlagOutcome};
pub use logging::StructuredLogger;
pub use crate::metrics::{DetectionMetrics, FalsePositiveReport, HealthStatus, MetricsSnapshot};
pub use monitor::{AbuseMonitor, Dispatch, MonitorReport, Pipeline, PipelineResult};
pub use risk::{AnomalyScore, AnomalyScorer, Severity};
pub use storage::{ModerationQueue, ModerationQueueEntry, QueueStatus, SqliteModerationQueue};
pub use trust::{StaticTrustProvider, TrustProvider};
pub use window::{MemoryWindowStore, WindowStore};
