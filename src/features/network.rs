//! Shared-IP, IP-hopping and user-agent correlation within the 24 h window.

use super::{noisy_or, ramp, GroupScore, ReasonCode};
use crate::actions::ActionEvent;
use crate::config::NetworkConfig;
use crate::window::{keys, StoreResult, WindowStore};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct NetworkCounts {
    /// Distinct users behind the event's IP hash
    pub ip_shared_accounts: u64,
    /// Distinct IP hashes the user acted from
    pub distinct_ips: u64,
    /// Distinct users with the same IP + UA hash
    pub ua_shared_accounts: u64,
}

pub(crate) async fn read(store: &dyn WindowStore, event: &ActionEvent) -> StoreResult<NetworkCounts> {
    Ok(NetworkCounts {
        ip_shared_accounts: store.set_card(&keys::ip_users(&event.ip_hash)).await?,
        distinct_ips: store.set_card(&keys::user_ips(event.user_id)).await?,
        ua_shared_accounts: store
            .set_card(&keys::ua_users(&event.ip_hash, &event.ua_hash))
            .await?,
    })
}

pub(crate) fn score(counts: &NetworkCounts, cfg: &NetworkConfig) -> GroupScore {
    let ceiling = cfg.weak_signal_ceiling;
    let shared_ip = ramp(counts.ip_shared_accounts, cfg.shared_ip_min_accounts, ceiling);
    // hopping fires strictly above the configured distinct-IP count
    let hopping = ramp(counts.distinct_ips, cfg.ip_hop_max_distinct + 1, ceiling);
    let shared_ua = ramp(counts.ua_shared_accounts, cfg.shared_ua_min_accounts, ceiling);

    let mut codes = Vec::new();
    if counts.ip_shared_accounts >= cfg.shared_ip_min_accounts {
        codes.push(ReasonCode::IpSharedMultipleAccounts);
    }
    if counts.ua_shared_accounts >= cfg.shared_ua_min_accounts {
        codes.push(ReasonCode::UaSharedMultipleAccounts);
    }
    if counts.distinct_ips > cfg.ip_hop_max_distinct {
        codes.push(ReasonCode::IpHoppingDetected);
    }

    GroupScore {
        score: noisy_or(&[shared_ip, hopping, shared_ua]),
        present: true,
        codes,
    }
}
