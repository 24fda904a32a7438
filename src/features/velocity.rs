//! Burst and sustained action rates over 5 min / 1 h / 24 h windows.

use super::{GroupScore, ReasonCode};
use crate::actions::ActionType;
use crate::config::VelocityConfig;
use crate::window::keys::{self, VelocityWindow};
use crate::window::{StoreResult, WindowStore};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct VelocityCounts {
    pub five_min: i64,
    pub hour: i64,
    pub day: i64,
}

pub(crate) async fn read(
    store: &dyn WindowStore,
    action: ActionType,
    user_id: Uuid,
) -> StoreResult<VelocityCounts> {
    Ok(VelocityCounts {
        five_min: store.counter(&keys::velocity(action, user_id, VelocityWindow::FiveMin)).await?,
        hour: store.counter(&keys::velocity(action, user_id, VelocityWindow::Hour)).await?,
        day: store.counter(&keys::velocity(action, user_id, VelocityWindow::Day)).await?,
    })
}

/// 1.0 once `count` reaches `threshold`; below it a concave curve capped at the
/// configured ceiling.
pub(crate) fn window_score(count: i64, threshold: u32, cfg: &VelocityConfig) -> f64 {
    if count <= 0 {
        return 0.0;
    }
    let threshold = threshold.max(1) as f64;
    let ratio = count as f64 / threshold;
    if ratio >= 1.0 {
        1.0
    } else {
        cfg.below_threshold_ceiling * ratio.powf(cfg.sublinear_exponent)
    }
}

pub(crate) fn score(action: ActionType, counts: &VelocityCounts, cfg: &VelocityConfig) -> GroupScore {
    let thresholds = match action {
        ActionType::Vote => cfg.vote,
        ActionType::Follow => cfg.follow,
        ActionType::Submission => cfg.submission,
    };
    let score = [
        (counts.five_min, thresholds.five_min),
        (counts.hour, thresholds.hourly),
        (counts.day, thresholds.daily),
    ]
    .iter()
    .filter_map(|(count, threshold)| threshold.map(|t| window_score(*count, t, cfg)))
    .fold(0.0f64, f64::max)
    .clamp(0.0, 1.0);

    let mut codes = Vec::new();
    if score > cfg.rule_threshold {
        codes.push(ReasonCode::velocity_for(action));
    }
    GroupScore {
        score,
        present: true,
        codes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(five_min: i64, hour: i64, day: i64) -> VelocityCounts {
        VelocityCounts { five_min, hour, day }
    }

    #[test]
    fn saturates_at_threshold() {
        let cfg = VelocityConfig::default();
        assert_eq!(window_score(2, 2, &cfg), 1.0);
        assert_eq!(window_score(3, 2, &cfg), 1.0);
        assert_eq!(window_score(0, 2, &cfg), 0.0);
        let below = window_score(1, 2, &cfg);
        assert!(below > 0.0 && below <= cfg.below_threshold_ceiling);
    }

    #[test]
    fn below_threshold_is_monotonic_and_sub_linear() {
        let cfg = VelocityConfig::default();
        let a = window_score(2, 10, &cfg);
        let b = window_score(5, 10, &cfg);
        let c = window_score(9, 10, &cfg);
        assert!(a < b && b < c && c < 1.0);
        // concave: doubling the count less than doubles the score
        assert!(window_score(4, 10, &cfg) < 2.0 * a);
    }

    #[test]
    fn three_votes_in_five_minutes_fire_the_rule() {
        let cfg = VelocityConfig::default();
        let g = score(ActionType::Vote, &counts(3, 3, 3), &cfg);
        assert_eq!(g.score, 1.0);
        assert_eq!(g.codes, vec![ReasonCode::VoteVelocityHigh]);
    }

    #[test]
    fn submissions_use_hourly_and_daily_windows() {
        let cfg = VelocityConfig::default();
        // 5-minute window is disabled for submissions
        let g = score(ActionType::Submission, &counts(2, 2, 2), &cfg);
        assert!(g.score < cfg.rule_threshold);
        assert!(g.codes.is_empty());

        let g = score(ActionType::Submission, &counts(1, 1, 8), &cfg);
        assert_eq!(g.score, 1.0);
        assert_eq!(g.codes, vec![ReasonCode::SubmissionVelocityHigh]);
    }

    #[test]
    fn single_follow_is_quiet() {
        let cfg = VelocityConfig::default();
        let g = score(ActionType::Follow, &counts(1, 1, 1), &cfg);
        assert!(g.present);
        assert!(g.codes.is_empty());
        assert!(g.score < 0.5);
    }
}
