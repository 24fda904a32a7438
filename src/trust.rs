//! Account context lookup. Trust scores are computed elsewhere; the engine only reads them.

use crate::actions::UserProfile;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait TrustProvider: Send + Sync {
    /// `Ok(None)` for an unknown user.
    async fn profile(&self, user_id: Uuid) -> Result<Option<UserProfile>>;
}

/// Fixed profiles held in memory, for replays and tests.
#[derive(Default)]
pub struct StaticTrustProvider {
    profiles: RwLock<HashMap<Uuid, UserProfile>>,
}

impl StaticTrustProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: Uuid, profile: UserProfile) {
        if let Ok(mut map) = self.profiles.write() {
            map.insert(user_id, profile);
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TrustProvider for StaticTrustProvider {
    async fn profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let map = self.profiles.read().map_err(|_| crate::error::EngineError::TrustLookup {
            user_id,
            message: "profile table lock poisoned".into(),
        })?;
        Ok(map.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn returns_inserted_profiles() {
        let provider = StaticTrustProvider::new();
        let user = Uuid::new_v4();
        assert!(provider.profile(user).await.unwrap().is_none());

        provider.insert(user, UserProfile::new(42, Utc::now()));
        assert_eq!(provider.profile(user).await.unwrap().unwrap().trust_score, 42);
        assert_eq!(provider.len(), 1);
    }
}
