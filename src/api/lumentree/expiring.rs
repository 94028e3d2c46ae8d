use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Local, TimeDelta};

use crate::clock::Clock;

/// Keyed values that go stale after the time-to-live.
pub struct ExpiringCache<V> {
    clock: Arc<dyn Clock>,
    time_to_live: TimeDelta,
    entries: Mutex<HashMap<String, (DateTime<Local>, V)>>,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new(clock: Arc<dyn Clock>, time_to_live: TimeDelta) -> Self {
        Self { clock, time_to_live, entries: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some((inserted_at, value)) if now - *inserted_at < self.time_to_live => {
                Some(value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.into(), (now, value));
    }
}
