//! Records an action in the window store, then reads every feature group back.

use super::{behavioral, graph, network, trust, velocity, FeatureSet, GroupScore, RawSignals};
use crate::actions::{ActionEvent, ActionType, UserProfile};
use crate::config::{BehavioralConfig, EngineConfig, GraphConfig, NetworkConfig, TrustConfig, VelocityConfig};
use crate::error::{EngineError, Result};
use crate::window::keys::{self, VelocityWindow};
use crate::window::{StoreResult, WindowStore, WINDOW_24_HOURS, WINDOW_7_DAYS};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct FeatureExtractor {
    store: Arc<dyn WindowStore>,
    velocity: VelocityConfig,
    network: NetworkConfig,
    graph: GraphConfig,
    behavioral: BehavioralConfig,
    trust: TrustConfig,
}

impl FeatureExtractor {
    pub fn new(store: Arc<dyn WindowStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            velocity: config.velocity.clone(),
            network: config.network.clone(),
            graph: config.graph.clone(),
            behavioral: config.behavioral.clone(),
            trust: config.trust.clone(),
        }
    }

    /// Track `event` and compute its features.
    ///
    /// Tracking happens once per `event_id`; a replayed event only reads. Failed
    /// groups are left out of the result. Only when the store cannot be reached
    /// at all does this return [`EngineError::Store`].
    pub async fn extract(&self, event: &ActionEvent, profile: Option<&UserProfile>) -> Result<FeatureSet> {
        event.validate()?;
        let store = self.store.as_ref();

        let claim = store
            .set_add(&keys::seen_event(event.event_id), "1", WINDOW_24_HOURS)
            .await;
        match &claim {
            Ok(true) => {
                if let Err(e) = self.track(event).await {
                    warn!(event_id = %event.event_id, error = %e, "tracking incomplete");
                }
            }
            Ok(false) => debug!(event_id = %event.event_id, "event already tracked, reading only"),
            Err(e) => warn!(event_id = %event.event_id, error = %e, "could not claim event, skipping tracking"),
        }

        let velocity = velocity::read(store, event.action_type, event.user_id).await;
        let network = network::read(store, event).await;
        let graph = graph::read(store, event, velocity.as_ref().ok(), &self.graph).await;
        let behavioral = behavioral::read(store, event.action_type, event.user_id, &self.behavioral).await;

        if let (Err(_), Err(e), Err(_), Err(_)) = (&claim, &velocity, &network, &behavioral) {
            return Err(EngineError::Store(e.clone()));
        }

        let mut raw = RawSignals {
            trust_score: profile.map(|p| p.trust_score),
            ..Default::default()
        };

        let v = match &velocity {
            Ok(counts) => {
                raw.count_5m = counts.five_min;
                raw.count_1h = counts.hour;
                raw.count_24h = counts.day;
                velocity::score(event.action_type, counts, &self.velocity)
            }
            Err(e) => absent("velocity", event, e),
        };
        let n = match &network {
            Ok(counts) => {
                raw.ip_shared_accounts = counts.ip_shared_accounts;
                raw.distinct_ips = counts.distinct_ips;
                raw.ua_shared_accounts = counts.ua_shared_accounts;
                network::score(counts, &self.network)
            }
            Err(e) => absent("network", event, e),
        };
        let g = match &graph {
            Ok(signals) => {
                raw.coordinated_accounts = signals.coordinated_accounts;
                raw.follow_cycle_hops = signals.follow_cycle.flatten();
                raw.burst_ratio = signals.burst_ratio;
                graph::score(signals, &self.graph, &self.network)
            }
            Err(e) => absent("graph", event, e),
        };
        let b = match &behavioral {
            Ok(signals) => {
                raw.vote_diversity = signals.vote_diversity;
                raw.timing_cv = signals.timing_cv;
                behavioral::score(signals, &self.behavioral)
            }
            Err(e) => absent("behavioral", event, e),
        };
        let t = trust::score(raw.trust_score, &self.trust);

        let groups = [&v, &n, &g, &b, &t];
        let reason_codes: BTreeSet<_> = groups.iter().flat_map(|g| g.codes.iter().copied()).collect();
        let present_feature_count = groups.iter().filter(|g| g.present).count() as u8;

        Ok(FeatureSet {
            velocity: v.score.clamp(0.0, 1.0),
            ip_ua: n.score.clamp(0.0, 1.0),
            graph: g.score.clamp(0.0, 1.0),
            behavioral: b.score.clamp(0.0, 1.0),
            trust_contribution: t.score.clamp(0.0, 1.0),
            reason_codes,
            present_feature_count,
            account_age_days: profile.map_or(0, |p| p.account_age_days(event.occurred_at)),
            raw,
        })
    }

    async fn track(&self, event: &ActionEvent) -> StoreResult<()> {
        let store = self.store.as_ref();
        let user = event.user_id.to_string();

        for window in VelocityWindow::ALL {
            store
                .incr(&keys::velocity(event.action_type, event.user_id, window), window.ttl())
                .await?;
        }

        store.set_add(&keys::ip_users(&event.ip_hash), &user, WINDOW_24_HOURS).await?;
        store
            .set_add(&keys::user_ips(event.user_id), &event.ip_hash, WINDOW_24_HOURS)
            .await?;
        store
            .set_add(&keys::ua_users(&event.ip_hash, &event.ua_hash), &user, WINDOW_24_HOURS)
            .await?;

        store
            .list_push(
                &keys::timing(event.action_type, event.user_id),
                &event.occurred_at.timestamp_millis().to_string(),
                self.behavioral.timing_history_cap,
                WINDOW_24_HOURS,
            )
            .await?;

        match event.action_type {
            ActionType::Vote => {
                if let Some(direction) = event.vote {
                    store.incr(&keys::votes(direction, event.user_id), WINDOW_24_HOURS).await?;
                }
                store
                    .set_add(&keys::target_voters(event.target_id, &event.ip_hash), &user, WINDOW_7_DAYS)
                    .await?;
            }
            ActionType::Follow => {
                store
                    .set_add(&keys::follows(&user), &event.target_id.to_string(), WINDOW_7_DAYS)
                    .await?;
            }
            ActionType::Submission => {}
        }
        Ok(())
    }
}

fn absent(group: &'static str, event: &ActionEvent, err: &crate::error::StoreError) -> GroupScore {
    warn!(group, event_id = %event.event_id, error = %err, "feature group unavailable");
    GroupScore::absent()
}
