//! Vote diversity and inter-action timing regularity.

use super::{GroupScore, ReasonCode};
use crate::actions::{ActionType, VoteDirection};
use crate::config::BehavioralConfig;
use crate::window::{keys, StoreResult, WindowStore};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct BehavioralSignals {
    /// 1.0 for an even up/down split, 0.0 for all one direction
    pub vote_diversity: Option<f64>,
    /// Coefficient of variation of recent inter-action intervals
    pub timing_cv: Option<f64>,
}

pub(crate) async fn read(
    store: &dyn WindowStore,
    action: ActionType,
    user_id: Uuid,
    cfg: &BehavioralConfig,
) -> StoreResult<BehavioralSignals> {
    let vote_diversity = if action == ActionType::Vote {
        let up = store.counter(&keys::votes(VoteDirection::Up, user_id)).await?;
        let down = store.counter(&keys::votes(VoteDirection::Down, user_id)).await?;
        vote_diversity(up, down, cfg)
    } else {
        None
    };

    let raw = store
        .list_range(&keys::timing(action, user_id), cfg.timing_samples)
        .await?;
    // entries we cannot parse are skipped rather than failing the group
    let stamps: Vec<i64> = raw.iter().filter_map(|s| s.parse().ok()).collect();

    Ok(BehavioralSignals {
        vote_diversity,
        timing_cv: timing_cv(&stamps, cfg),
    })
}

pub(crate) fn vote_diversity(up: i64, down: i64, cfg: &BehavioralConfig) -> Option<f64> {
    let total = up.max(0) + down.max(0);
    if total < cfg.min_votes_for_diversity as i64 {
        return None;
    }
    let up_ratio = up.max(0) as f64 / total as f64;
    Some(1.0 - 2.0 * (up_ratio - 0.5).abs())
}

/// Population coefficient of variation over positive intervals between the
/// given millisecond timestamps, in any order.
pub(crate) fn timing_cv(stamps: &[i64], cfg: &BehavioralConfig) -> Option<f64> {
    if stamps.len() < cfg.min_timing_samples {
        return None;
    }
    let mut sorted = stamps.to_vec();
    sorted.sort_unstable();
    let intervals: Vec<f64> = sorted
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64)
        .filter(|d| *d > 0.0)
        .collect();
    if intervals.len() < 2 {
        return None;
    }

    let n = intervals.len() as f64;
    let mean = intervals.iter().sum::<f64>() / n;
    let variance = intervals.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt() / mean)
}

pub(crate) fn score(signals: &BehavioralSignals, cfg: &BehavioralConfig) -> GroupScore {
    if signals.vote_diversity.is_none() && signals.timing_cv.is_none() {
        return GroupScore::absent();
    }

    let mut codes = Vec::new();
    let monotony = match signals.vote_diversity {
        Some(d) => {
            if d < cfg.diversity_rule_threshold {
                codes.push(ReasonCode::VotePatternMonotonous);
            }
            1.0 - d.clamp(0.0, 1.0)
        }
        None => 0.0,
    };
    let regularity = match signals.timing_cv {
        Some(cv) => {
            if cv < cfg.timing_cv_rule_threshold {
                codes.push(ReasonCode::TimingPatternSuspicious);
            }
            1.0 - cv.clamp(0.0, 1.0)
        }
        None => 0.0,
    };

    GroupScore {
        score: (cfg.monotony_weight * monotony + cfg.regularity_weight * regularity).clamp(0.0, 1.0),
        present: true,
        codes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diversity_needs_five_votes() {
        let cfg = BehavioralConfig::default();
        assert_eq!(vote_diversity(4, 0, &cfg), None);
        assert_eq!(vote_diversity(5, 0, &cfg), Some(0.0));
        assert_eq!(vote_diversity(5, 5, &cfg), Some(1.0));
    }

    #[test]
    fn metronomic_timing_is_flagged() {
        let cfg = BehavioralConfig::default();
        let stamps: Vec<i64> = (0..10).map(|i| 1_000_000 + i * 5_000).collect();
        let cv = timing_cv(&stamps, &cfg).unwrap();
        assert!(cv.abs() < 1e-12);

        let g = score(&BehavioralSignals { vote_diversity: None, timing_cv: Some(cv) }, &cfg);
        assert!((g.score - 0.6).abs() < 1e-12);
        assert_eq!(g.codes, vec![ReasonCode::TimingPatternSuspicious]);
    }

    #[test]
    fn irregular_timing_is_not_flagged() {
        let cfg = BehavioralConfig::default();
        let stamps = [0, 1_000, 9_000, 10_000, 40_000, 41_000];
        let cv = timing_cv(&stamps, &cfg).unwrap();
        assert!(cv > cfg.timing_cv_rule_threshold);
    }

    #[test]
    fn timing_needs_enough_samples() {
        let cfg = BehavioralConfig::default();
        assert_eq!(timing_cv(&[0, 10, 20, 30], &cfg), None);
        // duplicates leave fewer than two positive intervals
        assert_eq!(timing_cv(&[5, 5, 5, 5, 9], &cfg), None);
    }

    #[test]
    fn all_upvotes_and_regular_timing_max_out() {
        let cfg = BehavioralConfig::default();
        let g = score(
            &BehavioralSignals {
                vote_diversity: Some(0.0),
                timing_cv: Some(0.0),
            },
            &cfg,
        );
        assert!((g.score - 1.0).abs() < 1e-12);
        assert_eq!(
            g.codes,
            vec![ReasonCode::VotePatternMonotonous, ReasonCode::TimingPatternSuspicious]
        );
    }

    #[test]
    fn nothing_measured_is_absent() {
        let g = score(&BehavioralSignals::default(), &BehavioralConfig::default());
        assert!(!g.present);
    }
}
