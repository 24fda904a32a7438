//! Graph patterns over the 7-day edge window: coordinated voting, circular
//! follows, and bursts against the user's own baseline.

use super::velocity::VelocityCounts;
use super::{noisy_or, ramp, GroupScore, ReasonCode};
use crate::actions::{ActionEvent, ActionType};
use crate::config::{GraphConfig, NetworkConfig};
use crate::window::{keys, StoreResult, WindowStore};
use std::collections::HashSet;
use uuid::Uuid;

/// Hours of the 24 h window that lie outside the current hour.
const BASELINE_HOURS: f64 = 23.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct GraphSignals {
    /// Accounts from the event's IP that voted on the same target
    pub coordinated_accounts: Option<u64>,
    /// `Some(None)` when the search ran and found no path back
    pub follow_cycle: Option<Option<usize>>,
    pub burst_ratio: Option<f64>,
}

pub(crate) async fn read(
    store: &dyn WindowStore,
    event: &ActionEvent,
    velocity: Option<&VelocityCounts>,
    cfg: &GraphConfig,
) -> StoreResult<GraphSignals> {
    let mut signals = GraphSignals {
        burst_ratio: velocity.and_then(|v| burst_ratio(v, cfg)),
        ..Default::default()
    };
    match event.action_type {
        ActionType::Vote => {
            let key = keys::target_voters(event.target_id, &event.ip_hash);
            signals.coordinated_accounts = Some(store.set_card(&key).await?);
        }
        ActionType::Follow => {
            let hops = shortest_path_back(
                store,
                event.target_id,
                event.user_id,
                cfg.cycle_max_hops,
                cfg.cycle_max_fanout,
            )
            .await?;
            signals.follow_cycle = Some(hops);
        }
        ActionType::Submission => {}
    }
    Ok(signals)
}

/// Breadth-first search for a directed path `from → … → to` of at most
/// `max_hops` edges. Each frontier is capped at `fanout` nodes.
pub(crate) async fn shortest_path_back(
    store: &dyn WindowStore,
    from: Uuid,
    to: Uuid,
    max_hops: usize,
    fanout: usize,
) -> StoreResult<Option<usize>> {
    if from == to {
        return Ok(None);
    }
    let target = to.to_string();
    let mut frontier = vec![from.to_string()];
    let mut visited: HashSet<String> = frontier.iter().cloned().collect();

    for hop in 1..=max_hops {
        let mut next = Vec::new();
        for node in &frontier {
            for edge in store.set_members(&keys::follows(node)).await? {
                if edge == target {
                    return Ok(Some(hop));
                }
                if next.len() < fanout && visited.insert(edge.clone()) {
                    next.push(edge);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    Ok(None)
}

/// Hourly count relative to the hourly baseline from the rest of the day.
/// `None` until the user has enough history outside the current hour.
pub(crate) fn burst_ratio(counts: &VelocityCounts, cfg: &GraphConfig) -> Option<f64> {
    let history = (counts.day - counts.hour).max(0) as u64;
    if history < cfg.burst_min_history {
        return None;
    }
    let baseline = (history as f64 / BASELINE_HOURS).max(1.0);
    Some(counts.hour.max(0) as f64 / baseline)
}

/// `1 - e^(-excess / threshold)` for the part of the ratio above the threshold.
pub(crate) fn burst_score(ratio: f64, cfg: &GraphConfig) -> f64 {
    let excess = ratio - cfg.burst_ratio_threshold;
    if excess <= 0.0 {
        return 0.0;
    }
    (1.0 - (-excess / cfg.burst_ratio_threshold).exp()).clamp(0.0, 1.0)
}

pub(crate) fn score(signals: &GraphSignals, cfg: &GraphConfig, network: &NetworkConfig) -> GroupScore {
    let mut codes = Vec::new();

    let coordinated = match signals.coordinated_accounts {
        Some(n) => {
            if n >= cfg.coordinated_min_accounts {
                codes.push(ReasonCode::CoordinatedVotingDetected);
            }
            ramp(n, cfg.coordinated_min_accounts, network.weak_signal_ceiling)
        }
        None => 0.0,
    };

    let circular = match signals.follow_cycle {
        Some(Some(1)) => cfg.mutual_follow_score,
        Some(Some(_)) => {
            codes.push(ReasonCode::CircularFollowPattern);
            1.0
        }
        _ => 0.0,
    };

    let burst = match signals.burst_ratio {
        Some(ratio) => {
            let s = burst_score(ratio, cfg);
            if s > cfg.burst_rule_threshold {
                codes.push(ReasonCode::BurstActivityDetected);
            }
            s
        }
        None => 0.0,
    };

    let present = signals.coordinated_accounts.is_some()
        || signals.follow_cycle.is_some()
        || signals.burst_ratio.is_some();
    if !present {
        return GroupScore::absent();
    }
    GroupScore {
        score: noisy_or(&[coordinated, circular, burst]),
        present,
        codes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{MemoryWindowStore, WINDOW_7_DAYS};

    async fn follow(store: &MemoryWindowStore, a: Uuid, b: Uuid) {
        store
            .set_add(&keys::follows(&a.to_string()), &b.to_string(), WINDOW_7_DAYS)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn finds_three_cycle() {
        let store = MemoryWindowStore::default();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        follow(&store, b, c).await;
        follow(&store, c, a).await;
        // A is about to follow B: B→C→A already exists
        let hops = shortest_path_back(&store, b, a, 3, 256).await.unwrap();
        assert_eq!(hops, Some(2));
    }

    #[tokio::test]
    async fn respects_hop_bound() {
        let store = MemoryWindowStore::default();
        let nodes: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        // B → n1 → n2 → n3 → A is four hops
        for pair in nodes.windows(2) {
            follow(&store, pair[0], pair[1]).await;
        }
        let (b, a) = (nodes[0], nodes[4]);
        assert_eq!(shortest_path_back(&store, b, a, 3, 256).await.unwrap(), None);
        assert_eq!(shortest_path_back(&store, b, a, 4, 256).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn mutual_follow_is_one_hop() {
        let store = MemoryWindowStore::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        follow(&store, b, a).await;
        assert_eq!(shortest_path_back(&store, b, a, 3, 256).await.unwrap(), Some(1));

        let g = score(
            &GraphSignals {
                follow_cycle: Some(Some(1)),
                ..Default::default()
            },
            &GraphConfig::default(),
            &NetworkConfig::default(),
        );
        assert!(g.codes.is_empty());
        assert!((g.score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn burst_needs_history() {
        let cfg = GraphConfig::default();
        let fresh = VelocityCounts { five_min: 5, hour: 5, day: 5 };
        assert_eq!(burst_ratio(&fresh, &cfg), None);

        // 23 actions spread over the day, then 20 in the last hour
        let spike = VelocityCounts { five_min: 5, hour: 20, day: 43 };
        let ratio = burst_ratio(&spike, &cfg).unwrap();
        assert!((ratio - 20.0).abs() < 1e-9);
        assert!(burst_score(ratio, &cfg) > cfg.burst_rule_threshold);

        let steady = VelocityCounts { five_min: 0, hour: 2, day: 48 };
        let ratio = burst_ratio(&steady, &cfg).unwrap();
        assert_eq!(burst_score(ratio, &cfg), 0.0);
    }

    #[test]
    fn coordinated_voting_fires_at_threshold() {
        let cfg = GraphConfig::default();
        let signals = GraphSignals {
            coordinated_accounts: Some(5),
            ..Default::default()
        };
        let g = score(&signals, &cfg, &NetworkConfig::default());
        assert_eq!(g.score, 1.0);
        assert_eq!(g.codes, vec![ReasonCode::CoordinatedVotingDetected]);
    }

    #[test]
    fn no_signals_is_absent() {
        let g = score(&GraphSignals::default(), &GraphConfig::default(), &NetworkConfig::default());
        assert!(!g.present);
        assert_eq!(g.score, 0.0);
    }
}
