//! In-process window store with lazy expiry against an injectable clock.

use super::{StoreResult, WindowStore};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Writes between sweeps of expired keys.
const SWEEP_EVERY: u64 = 1024;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Simulated time for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.millis.load(Ordering::SeqCst);
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    }
}

#[derive(Debug)]
enum Value {
    Counter(i64),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Counter(_) => "counter",
            Value::Set(_) => "set",
            Value::List(_) => "list",
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: i64,
}

pub struct MemoryWindowStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    writes: AtomicU64,
}

impl Default for MemoryWindowStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryWindowStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            writes: AtomicU64::new(0),
        }
    }

    /// Live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = self.now_ms();
        match self.entries.lock() {
            Ok(map) => map.values().filter(|e| e.expires_at > now).count(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.now_ms();
        match self.entries.lock() {
            Ok(mut map) => {
                let before = map.len();
                map.retain(|_, e| e.expires_at > now);
                before - map.len()
            }
            Err(_) => 0,
        }
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn note_write(&self) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let purged = self.purge_expired();
            tracing::debug!(purged, "swept expired window keys");
        }
    }

    /// Live entry for `key`, dropping it first if it has expired.
    fn live<'a>(map: &'a mut HashMap<String, Entry>, key: &str, now: i64) -> Option<&'a mut Entry> {
        if map.get(key).is_some_and(|e| e.expires_at <= now) {
            map.remove(key);
        }
        map.get_mut(key)
    }
}

fn ttl_ms(ttl: Duration) -> i64 {
    ttl.as_millis().min(i64::MAX as u128) as i64
}

fn wrong_type(key: &str, expected: &'static str, found: &Value) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let now = self.now_ms();
        let out = {
            let mut map = self.lock()?;
            match Self::live(&mut map, key, now) {
                Some(entry) => match &mut entry.value {
                    Value::Counter(n) => {
                        *n += 1;
                        *n
                    }
                    other => return Err(wrong_type(key, "counter", other)),
                },
                None => {
                    map.insert(
                        key.to_string(),
                        Entry {
                            value: Value::Counter(1),
                            expires_at: now.saturating_add(ttl_ms(ttl)),
                        },
                    );
                    1
                }
            }
        };
        self.note_write();
        Ok(out)
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.now_ms();
        let expires_at = now.saturating_add(ttl_ms(ttl));
        let added = {
            let mut map = self.lock()?;
            match Self::live(&mut map, key, now) {
                Some(entry) => {
                    let added = match &mut entry.value {
                        Value::Set(s) => s.insert(member.to_string()),
                        other => return Err(wrong_type(key, "set", other)),
                    };
                    entry.expires_at = expires_at;
                    added
                }
                None => {
                    let mut s = HashSet::new();
                    s.insert(member.to_string());
                    map.insert(
                        key.to_string(),
                        Entry {
                            value: Value::Set(s),
                            expires_at,
                        },
                    );
                    true
                }
            }
        };
        self.note_write();
        Ok(added)
    }

    async fn set_card(&self, key: &str) -> StoreResult<u64> {
        let now = self.now_ms();
        let mut map = self.lock()?;
        match Self::live(&mut map, key, now) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::Set(s) => Ok(s.len() as u64),
                other => Err(wrong_type(key, "set", other)),
            },
        }
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let now = self.now_ms();
        let mut map = self.lock()?;
        match Self::live(&mut map, key, now) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Set(s) => {
                    let mut members: Vec<String> = s.iter().cloned().collect();
                    members.sort();
                    Ok(members)
                }
                other => Err(wrong_type(key, "set", other)),
            },
        }
    }

    async fn list_push(&self, key: &str, value: &str, cap: usize, ttl: Duration) -> StoreResult<()> {
        let now = self.now_ms();
        let expires_at = now.saturating_add(ttl_ms(ttl));
        {
            let mut map = self.lock()?;
            match Self::live(&mut map, key, now) {
                Some(entry) => {
                    match &mut entry.value {
                        Value::List(l) => {
                            l.push_front(value.to_string());
                            l.truncate(cap);
                        }
                        other => return Err(wrong_type(key, "list", other)),
                    }
                    entry.expires_at = expires_at;
                }
                None => {
                    let mut l = VecDeque::new();
                    l.push_front(value.to_string());
                    l.truncate(cap);
                    map.insert(
                        key.to_string(),
                        Entry {
                            value: Value::List(l),
                            expires_at,
                        },
                    );
                }
            }
        }
        self.note_write();
        Ok(())
    }

    async fn list_range(&self, key: &str, limit: usize) -> StoreResult<Vec<String>> {
        let now = self.now_ms();
        let mut map = self.lock()?;
        match Self::live(&mut map, key, now) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::List(l) => Ok(l.iter().take(limit).cloned().collect()),
                other => Err(wrong_type(key, "list", other)),
            },
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.now_ms();
        let mut map = self.lock()?;
        match Self::live(&mut map, key, now) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Counter(n) => Ok(Some(n.to_string())),
                other => Err(wrong_type(key, "counter", other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (Arc<ManualClock>, MemoryWindowStore) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryWindowStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn counter_window_is_fixed_from_first_increment() {
        let (clock, store) = store();
        let ttl = Duration::from_secs(300);
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
        clock.advance(Duration::from_secs(200));
        assert_eq!(store.incr("c", ttl).await.unwrap(), 2);
        clock.advance(Duration::from_secs(101));
        assert_eq!(store.counter("c").await.unwrap(), 0);
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_add_reports_new_members_and_refreshes_ttl() {
        let (clock, store) = store();
        let ttl = Duration::from_secs(60);
        assert!(store.set_add("s", "a", ttl).await.unwrap());
        assert!(!store.set_add("s", "a", ttl).await.unwrap());
        clock.advance(Duration::from_secs(50));
        assert!(store.set_add("s", "b", ttl).await.unwrap());
        clock.advance(Duration::from_secs(50));
        assert_eq!(store.set_card("s").await.unwrap(), 2);
        assert_eq!(store.set_members("s").await.unwrap(), vec!["a", "b"]);
        clock.advance(Duration::from_secs(11));
        assert_eq!(store.set_card("s").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_is_capped_newest_first() {
        let (_clock, store) = store();
        for i in 0..5 {
            store
                .list_push("l", &i.to_string(), 3, Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(store.list_range("l", 10).await.unwrap(), vec!["4", "3", "2"]);
        assert_eq!(store.list_range("l", 2).await.unwrap(), vec!["4", "3"]);
    }

    #[tokio::test]
    async fn wrong_type_is_an_error() {
        let (_clock, store) = store();
        store.incr("k", Duration::from_secs(60)).await.unwrap();
        let err = store.set_add("k", "m", Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, StoreError::WrongType { expected: "set", found: "counter", .. }));
    }

    #[tokio::test]
    async fn purge_removes_only_expired_keys() {
        let (clock, store) = store();
        store.incr("short", Duration::from_secs(10)).await.unwrap();
        store.incr("long", Duration::from_secs(100)).await.unwrap();
        clock.advance(Duration::from_secs(20));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}
