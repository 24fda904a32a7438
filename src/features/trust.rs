use super::{GroupScore, ReasonCode};
use crate::config::TrustConfig;

/// Maps a 0..=100 trust score onto a risk contribution: low trust, high risk.
pub(crate) fn contribution(trust: i32, cfg: &TrustConfig) -> f64 {
    if trust >= cfg.trusted_min {
        0.0
    } else if trust >= cfg.neutral_min {
        0.3
    } else if trust >= cfg.low_min {
        0.6
    } else {
        0.9
    }
}

pub(crate) fn score(trust: Option<i32>, cfg: &TrustConfig) -> GroupScore {
    match trust {
        None => GroupScore::absent(),
        Some(t) => {
            let mut codes = Vec::new();
            if t < cfg.low_min {
                codes.push(ReasonCode::LowTrustScore);
            }
            GroupScore {
                score: contribution(t, cfg),
                present: true,
                codes,
            }
        }
    }
}
