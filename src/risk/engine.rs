//! Combines feature sub-scores into an overall anomaly score and severity band.

use crate::config::{ScoringConfig, SeverityBands};
use crate::features::{FeatureSet, ReasonCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::None,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Bands are closed at their lower bound.
    pub fn from_score(score: f64, bands: &SeverityBands) -> Self {
        if score >= bands.critical {
            Severity::Critical
        } else if score >= bands.high {
            Severity::High
        } else if score >= bands.medium {
            Severity::Medium
        } else if score >= bands.low {
            Severity::Low
        } else {
            Severity::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

/// Scoring result for a single action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub overall: f64,
    pub confidence: f64,
    pub severity: Severity,
    pub reason_codes: BTreeSet<ReasonCode>,
}

impl AnomalyScore {
    pub fn is_anomalous(&self) -> bool {
        self.severity != Severity::None
    }
}

pub struct AnomalyScorer {
    config: ScoringConfig,
}

impl AnomalyScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, features: &FeatureSet) -> AnomalyScore {
        let w = &self.config.weights;
        let overall = (w.velocity * features.velocity
            + w.ip_ua * features.ip_ua
            + w.graph * features.graph
            + w.behavioral * features.behavioral
            + w.trust * features.trust_contribution)
            .clamp(0.0, 1.0);

        AnomalyScore {
            overall,
            confidence: self.confidence(features),
            severity: Severity::from_score(overall, &self.config.bands),
            reason_codes: features.reason_codes.clone(),
        }
    }

    /// 0.2 per computed feature group, plus a bonus for established accounts.
    fn confidence(&self, features: &FeatureSet) -> f64 {
        let mut confidence = self.config.confidence_per_group * features.present_feature_count as f64;
        if features.account_age_days > self.config.age_bonus_after_days {
            confidence += self.config.age_bonus;
        }
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(v: f64, n: f64, g: f64, b: f64, t: f64, present: u8) -> FeatureSet {
        FeatureSet {
            velocity: v,
            ip_ua: n,
            graph: g,
            behavioral: b,
            trust_contribution: t,
            present_feature_count: present,
            ..Default::default()
        }
    }

    #[test]
    fn weighted_sum() {
        let scorer = AnomalyScorer::new(ScoringConfig::default());
        let s = scorer.score(&features(1.0, 1.0, 1.0, 0.0, 0.9, 4));
        assert!((s.overall - 0.835).abs() < 1e-9);
        assert_eq!(s.severity, Severity::High);
        assert!((s.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn bounded_for_extreme_inputs() {
        let scorer = AnomalyScorer::new(ScoringConfig::default());
        let max = scorer.score(&features(1.0, 1.0, 1.0, 1.0, 1.0, 5));
        assert!(max.overall <= 1.0);
        assert_eq!(max.severity, Severity::Critical);
        assert!(max.confidence <= 1.0);

        let zero = scorer.score(&FeatureSet::default());
        assert_eq!(zero.overall, 0.0);
        assert_eq!(zero.confidence, 0.0);
        assert_eq!(zero.severity, Severity::None);
        assert!(!zero.is_anomalous());
    }

    #[test]
    fn severity_bands_closed_below() {
        let bands = SeverityBands::default();
        assert_eq!(Severity::from_score(0.2999, &bands), Severity::None);
        assert_eq!(Severity::from_score(0.30, &bands), Severity::Low);
        assert_eq!(Severity::from_score(0.50, &bands), Severity::Medium);
        assert_eq!(Severity::from_score(0.6999, &bands), Severity::Medium);
        assert_eq!(Severity::from_score(0.70, &bands), Severity::High);
        assert_eq!(Severity::from_score(0.85, &bands), Severity::Critical);
    }

    #[test]
    fn confidence_grows_with_present_groups() {
        let scorer = AnomalyScorer::new(ScoringConfig::default());
        let mut last = -1.0;
        for present in 0..=5 {
            let c = scorer.score(&features(0.0, 0.0, 0.0, 0.0, 0.0, present)).confidence;
            assert!(c > last);
            last = c;
        }
        assert!((last - 1.0).abs() < 1e-9);
    }

    #[test]
    fn age_bonus_after_thirty_days_capped() {
        let scorer = AnomalyScorer::new(ScoringConfig::default());
        let mut f = features(0.0, 0.0, 0.0, 0.0, 0.0, 3);
        f.account_age_days = 30;
        assert!((scorer.score(&f).confidence - 0.6).abs() < 1e-9);
        f.account_age_days = 31;
        assert!((scorer.score(&f).confidence - 0.7).abs() < 1e-9);
        f.present_feature_count = 5;
        assert_eq!(scorer.score(&f).confidence, 1.0);
    }

    #[test]
    fn quiet_action_scores_none() {
        // a single action from an average user: weak velocity, neutral trust
        let scorer = AnomalyScorer::new(ScoringConfig::default());
        let s = scorer.score(&features(0.4, 0.0, 0.0, 0.0, 0.3, 4));
        assert!(s.overall < 0.30);
        assert_eq!(s.severity, Severity::None);
    }
}
