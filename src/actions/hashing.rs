//! Salted SHA-256 of client IPs and user agents. Raw values never reach the store.

use sha2::{Digest, Sha256};

/// User agents are truncated before hashing so trivially long variants group together.
const MAX_UA_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct IdentityHasher {
    salt: String,
}

impl IdentityHasher {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    pub fn hash_ip(&self, ip: &str) -> String {
        self.digest("ip", ip.trim())
    }

    pub fn hash_user_agent(&self, user_agent: &str) -> String {
        self.digest("ua", &normalize_user_agent(user_agent))
    }

    fn digest(&self, domain: &str, value: &str) -> String {
        let mut h = Sha256::new();
        h.update(self.salt.as_bytes());
        h.update([0u8]);
        h.update(domain.as_bytes());
        h.update([0u8]);
        h.update(value.as_bytes());
        format!("{:x}", h.finalize())
    }
}

fn normalize_user_agent(ua: &str) -> String {
    ua.trim().chars().take(MAX_UA_LEN).collect::<String>().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_stable_and_salted() {
        let a = IdentityHasher::new("salt-a");
        let b = IdentityHasher::new("salt-b");
        assert_eq!(a.hash_ip("10.0.0.1"), a.hash_ip("10.0.0.1"));
        assert_ne!(a.hash_ip("10.0.0.1"), b.hash_ip("10.0.0.1"));
        assert_eq!(a.hash_ip("10.0.0.1").len(), 64);
    }

    #[test]
    fn ip_and_ua_domains_differ() {
        let h = IdentityHasher::new("s");
        assert_ne!(h.hash_ip("x"), h.hash_user_agent("x"));
    }

    #[test]
    fn user_agent_is_normalized() {
        let h = IdentityHasher::new("s");
        assert_eq!(h.hash_user_agent("Mozilla/5.0 "), h.hash_user_agent("mozilla/5.0"));
        let long_a = format!("{}{}", "a".repeat(MAX_UA_LEN), "tail-one");
        let long_b = format!("{}{}", "a".repeat(MAX_UA_LEN), "tail-two");
        assert_eq!(h.hash_user_agent(&long_a), h.hash_user_agent(&long_b));
    }
}
