//! Engine configuration. Every rule threshold and weight lives here so FPR tuning
//! never needs a code change.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "ABUSE_ENGINE_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-action velocity thresholds
    pub velocity: VelocityConfig,
    /// Shared-IP, IP-hopping and UA correlation rules
    pub network: NetworkConfig,
    /// Coordinated voting, follow cycles, burst patterns
    pub graph: GraphConfig,
    /// Vote diversity and timing regularity
    pub behavioral: BehavioralConfig,
    /// Trust score banding
    pub trust: TrustConfig,
    /// Weights, severity bands, confidence
    pub scoring: ScoringConfig,
    /// Auto-flag thresholds and priority mapping
    pub flagging: FlagConfig,
    /// Work queue and timeouts
    pub dispatch: DispatchConfig,
    /// Salt for IP / user-agent hashing
    pub identity: IdentityConfig,
    /// Moderation queue database
    pub queue: QueueConfig,
    /// FPR health target
    pub monitoring: MonitoringConfig,
    /// Logging
    pub log: LogConfig,
}

/// Counts that saturate the velocity sub-score. `None` disables a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionThresholds {
    pub five_min: Option<u32>,
    pub hourly: Option<u32>,
    pub daily: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    pub vote: ActionThresholds,
    pub follow: ActionThresholds,
    pub submission: ActionThresholds,
    /// Highest score a window can reach while its count is still below threshold
    pub below_threshold_ceiling: f64,
    /// Exponent applied to count/threshold below saturation (< 1 is sub-linear)
    pub sublinear_exponent: f64,
    /// Velocity sub-score above which the velocity reason code fires
    pub rule_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Distinct accounts on one IP hash that trigger the shared-IP rule
    pub shared_ip_min_accounts: u64,
    /// Distinct IP hashes per user above which IP hopping fires
    pub ip_hop_max_distinct: u64,
    /// Distinct accounts sharing IP + UA hash that trigger UA correlation
    pub shared_ua_min_accounts: u64,
    /// Highest strength of a signal that has not reached its rule
    pub weak_signal_ceiling: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Distinct accounts from one IP voting on one target
    pub coordinated_min_accounts: u64,
    /// Longest path B→…→A searched when A follows B
    pub cycle_max_hops: usize,
    /// Follow edges expanded per node during the cycle search
    pub cycle_max_fanout: usize,
    /// Score for a plain mutual follow (path of length 1)
    pub mutual_follow_score: f64,
    /// Hourly rate over baseline that starts the burst score
    pub burst_ratio_threshold: f64,
    /// Actions outside the current hour required before a baseline exists
    pub burst_min_history: u64,
    pub burst_rule_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralConfig {
    pub min_votes_for_diversity: u64,
    /// Diversity below this marks the vote pattern monotonous
    pub diversity_rule_threshold: f64,
    /// Timestamps (K) used for timing entropy
    pub timing_samples: usize,
    pub min_timing_samples: usize,
    /// Timestamps retained per user and action type
    pub timing_history_cap: usize,
    /// Coefficient of variation of intervals below this is machine-like
    pub timing_cv_rule_threshold: f64,
    pub monotony_weight: f64,
    pub regularity_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    pub trusted_min: i32,
    pub neutral_min: i32,
    /// Trust scores below this are low-trust (LOW_TRUST_SCORE)
    pub low_min: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub velocity: f64,
    pub ip_ua: f64,
    pub graph: f64,
    pub behavioral: f64,
    pub trust: f64,
}

/// Lower bounds of each severity band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub bands: SeverityBands,
    pub confidence_per_group: f64,
    pub age_bonus: f64,
    /// Account age (days) strictly above which the age bonus applies
    pub age_bonus_after_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagConfig {
    pub min_score: f64,
    pub min_confidence: f64,
    /// Lowest priority a flagged item can get
    pub min_priority: u8,
    /// Reason descriptions kept in the queue entry
    pub max_reasons: usize,
    /// Extra attempts after a failed queue write
    pub write_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Bounded work queue between action handlers and workers
    pub queue_capacity: usize,
    pub workers: usize,
    pub store_timeout_ms: u64,
    pub trust_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// SQLite database holding the moderation queue
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub fpr_target: f64,
    /// Look-back used for FPR and auto-flag statistics
    pub review_window_hours: i64,
    /// Serve Prometheus metrics on this port; off when unset
    pub prometheus_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            vote: ActionThresholds {
                five_min: Some(2),
                hourly: Some(10),
                daily: None,
            },
            follow: ActionThresholds {
                five_min: Some(3),
                hourly: Some(15),
                daily: None,
            },
            submission: ActionThresholds {
                five_min: None,
                hourly: Some(3),
                daily: Some(8),
            },
            below_threshold_ceiling: 0.6,
            sublinear_exponent: 0.5,
            rule_threshold: 0.7,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            shared_ip_min_accounts: 5,
            ip_hop_max_distinct: 5,
            shared_ua_min_accounts: 4,
            weak_signal_ceiling: 0.5,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            coordinated_min_accounts: 5,
            cycle_max_hops: 3,
            cycle_max_fanout: 256,
            mutual_follow_score: 0.3,
            burst_ratio_threshold: 3.0,
            burst_min_history: 10,
            burst_rule_threshold: 0.7,
        }
    }
}

impl Default for BehavioralConfig {
    fn default() -> Self {
        Self {
            min_votes_for_diversity: 5,
            diversity_rule_threshold: 0.2,
            timing_samples: 10,
            min_timing_samples: 5,
            timing_history_cap: 20,
            timing_cv_rule_threshold: 0.1,
            monotony_weight: 0.4,
            regularity_weight: 0.6,
        }
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            trusted_min: 80,
            neutral_min: 50,
            low_min: 30,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            velocity: 0.25,
            ip_ua: 0.20,
            graph: 0.25,
            behavioral: 0.15,
            trust: 0.15,
        }
    }
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            low: 0.30,
            medium: 0.50,
            high: 0.70,
            critical: 0.85,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            bands: SeverityBands::default(),
            confidence_per_group: 0.2,
            age_bonus: 0.1,
            age_bonus_after_days: 30,
        }
    }
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            min_score: 0.75,
            min_confidence: 0.60,
            min_priority: 50,
            max_reasons: 3,
            write_retries: 1,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            workers: 4,
            store_timeout_ms: 50,
            trust_timeout_ms: 50,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            salt: "change-me".to_string(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("abuse-queue.db"),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            fpr_target: 0.02,
            review_window_hours: 24 * 7,
            prometheus_port: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl DispatchConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn trust_timeout(&self) -> Duration {
        Duration::from_millis(self.trust_timeout_ms)
    }
}

impl EngineConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path)
            .map_err(EngineError::from)
            .and_then(|data| serde_json::from_str::<EngineConfig>(&data).map_err(EngineError::from))
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config unreadable; using defaults");
                Self::default()
            }
        }
    }

    /// Path from `ABUSE_ENGINE_CONFIG`, or `abuse-engine.json`.
    pub fn path_from_env() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("abuse-engine.json"))
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.scoring.weights;
        for (name, value) in [
            ("velocity", w.velocity),
            ("ip_ua", w.ip_ua),
            ("graph", w.graph),
            ("behavioral", w.behavioral),
            ("trust", w.trust),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(EngineError::Configuration(format!(
                    "scoring weight {name} must be a non-negative number, got {value}"
                )));
            }
        }

        let b = &self.scoring.bands;
        if !(b.low <= b.medium && b.medium <= b.high && b.high <= b.critical) {
            return Err(EngineError::Configuration(
                "severity bands must be ascending".to_string(),
            ));
        }

        for (name, value) in [
            ("flagging.min_score", self.flagging.min_score),
            ("flagging.min_confidence", self.flagging.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.flagging.min_priority > 100 {
            return Err(EngineError::Configuration(
                "flagging.min_priority must be at most 100".to_string(),
            ));
        }

        for (action, t) in [
            ("vote", &self.velocity.vote),
            ("follow", &self.velocity.follow),
            ("submission", &self.velocity.submission),
        ] {
            if [t.five_min, t.hourly, t.daily].contains(&Some(0)) {
                return Err(EngineError::Configuration(format!(
                    "velocity thresholds for {action} must be positive"
                )));
            }
        }

        let account_rules = [
            ("network.shared_ip_min_accounts", self.network.shared_ip_min_accounts),
            ("network.shared_ua_min_accounts", self.network.shared_ua_min_accounts),
            ("graph.coordinated_min_accounts", self.graph.coordinated_min_accounts),
        ];
        if let Some((name, _)) = account_rules.iter().find(|(_, v)| *v < 2) {
            return Err(EngineError::Configuration(format!("{name} must be at least 2")));
        }
        if self.graph.burst_ratio_threshold <= 0.0 {
            return Err(EngineError::Configuration(
                "graph.burst_ratio_threshold must be positive".to_string(),
            ));
        }
        if self.behavioral.min_timing_samples < 3
            || self.behavioral.timing_samples < self.behavioral.min_timing_samples
            || self.behavioral.timing_history_cap < self.behavioral.timing_samples
        {
            return Err(EngineError::Configuration(
                "behavioral timing samples must satisfy 3 <= min <= samples <= cap".to_string(),
            ));
        }

        if self.dispatch.workers == 0 {
            return Err(EngineError::Configuration("dispatch.workers must be positive".to_string()));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(EngineError::Configuration(
                "dispatch.queue_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let c = EngineConfig::default();
        assert_eq!(c.velocity.vote.five_min, Some(2));
        assert_eq!(c.velocity.follow.hourly, Some(15));
        assert_eq!(c.velocity.submission.daily, Some(8));
        assert_eq!(c.network.shared_ip_min_accounts, 5);
        assert_eq!(c.flagging.min_score, 0.75);
        assert_eq!(c.flagging.min_confidence, 0.60);
        let w = c.scoring.weights;
        assert!((w.velocity + w.ip_ua + w.graph + w.behavioral + w.trust - 1.0).abs() < 1e-9);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{ "flagging": { "min_score": 0.8 }, "network": { "shared_ip_min_accounts": 7 } }"#;
        let c: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.flagging.min_score, 0.8);
        assert_eq!(c.flagging.min_confidence, 0.60);
        assert_eq!(c.network.shared_ip_min_accounts, 7);
        assert_eq!(c.network.ip_hop_max_distinct, 5);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let c = EngineConfig::load(Path::new("definitely-not-here.json"));
        assert_eq!(c.dispatch.workers, 4);
    }

    #[test]
    fn load_invalid_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let c = EngineConfig::load(&path);
        assert_eq!(c.flagging.min_score, 0.75);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = EngineConfig::default();
        c.scoring.weights.graph = -0.1;
        assert!(matches!(c.validate(), Err(EngineError::Configuration(_))));

        let mut c = EngineConfig::default();
        c.velocity.vote.five_min = Some(0);
        assert!(c.validate().is_err());

        let mut c = EngineConfig::default();
        c.dispatch.workers = 0;
        assert!(c.validate().is_err());

        let mut c = EngineConfig::default();
        c.flagging.min_confidence = 1.5;
        assert!(c.validate().is_err());
    }
}
