use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::ConductorError;
use super::store::StateStore;

/// Longest expiry honoured; larger TTLs are capped to it.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Process-local [`StateStore`]. Contents are lost on exit.
pub struct MemoryStore {
    entries: DashMap<String, (Vec<u8>, Instant)>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every operation fails and
    /// `ping` reports false.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().1 > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<(), ConductorError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConductorError::Persistence("memory store unavailable".into()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ConductorError> {
        self.ensure_available()?;
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if entry.1 > now => return Ok(Some(entry.0.clone())),
            Some(_) => None,
            None => return Ok(None),
        };
        // Expired: the read guard is gone, so removal cannot deadlock the shard.
        self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), ConductorError> {
        self.ensure_available()?;
        let expires = Instant::now()
            .checked_add(ttl.min(MAX_TTL))
            .ok_or_else(|| ConductorError::Persistence(format!("ttl {:?} is out of range", ttl)))?;
        self.entries.insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, ConductorError> {
        self.ensure_available()?;
        let now = Instant::now();
        Ok(self.entries.remove(key).is_some_and(|(_, (_, expires))| expires > now))
    }

    async fn ping(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
