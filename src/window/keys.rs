//! Key layout. Every signal has its own prefix so distinct signals never collide.

use crate::actions::{ActionType, VoteDirection};
use uuid::Uuid;

const PREFIX: &str = "abuse";

/// Velocity window label used in counter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityWindow {
    FiveMin,
    Hour,
    Day,
}

impl VelocityWindow {
    pub const ALL: [VelocityWindow; 3] =
        [VelocityWindow::FiveMin, VelocityWindow::Hour, VelocityWindow::Day];

    pub fn as_str(&self) -> &'static str {
        match self {
            VelocityWindow::FiveMin => "5m",
            VelocityWindow::Hour => "1h",
            VelocityWindow::Day => "24h",
        }
    }

    pub fn ttl(&self) -> std::time::Duration {
        match self {
            VelocityWindow::FiveMin => super::WINDOW_5_MIN,
            VelocityWindow::Hour => super::WINDOW_1_HOUR,
            VelocityWindow::Day => super::WINDOW_24_HOURS,
        }
    }
}

/// Marks an action event as already tracked.
pub fn seen_event(event_id: Uuid) -> String {
    format!("{PREFIX}:seen:{event_id}")
}

pub fn velocity(action: ActionType, user_id: Uuid, window: VelocityWindow) -> String {
    format!("{PREFIX}:velocity:{}:{}:{user_id}", action.as_str(), window.as_str())
}

/// Users seen behind one IP hash.
pub fn ip_users(ip_hash: &str) -> String {
    format!("{PREFIX}:ip:users:{ip_hash}")
}

/// IP hashes used by one user.
pub fn user_ips(user_id: Uuid) -> String {
    format!("{PREFIX}:ip:history:{user_id}")
}

/// Users sharing one UA hash from one IP hash.
pub fn ua_users(ip_hash: &str, ua_hash: &str) -> String {
    format!("{PREFIX}:ua:users:{ip_hash}:{ua_hash}")
}

/// Voters on one target from one IP hash.
pub fn target_voters(target_id: Uuid, ip_hash: &str) -> String {
    format!("{PREFIX}:graph:voters:{target_id}:{ip_hash}")
}

/// Outgoing follow edges of one user.
pub fn follows(user_id: &str) -> String {
    format!("{PREFIX}:graph:follows:{user_id}")
}

pub fn votes(direction: VoteDirection, user_id: Uuid) -> String {
    format!("{PREFIX}:votes:{}:{user_id}", direction.as_str())
}

pub fn timing(action: ActionType, user_id: Uuid) -> String {
    format!("{PREFIX}:timing:{}:{user_id}", action.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_by_signal() {
        let u = Uuid::nil();
        let keys = [
            velocity(ActionType::Vote, u, VelocityWindow::FiveMin),
            velocity(ActionType::Vote, u, VelocityWindow::Hour),
            velocity(ActionType::Follow, u, VelocityWindow::FiveMin),
            ip_users("h"),
            user_ips(u),
            ua_users("h", "h"),
            target_voters(u, "h"),
            follows(&u.to_string()),
            votes(VoteDirection::Up, u),
            votes(VoteDirection::Down, u),
            timing(ActionType::Vote, u),
            seen_event(u),
        ];
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }
}
