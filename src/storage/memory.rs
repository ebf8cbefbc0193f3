//! In-memory storage backend
//!
//! DashMap-backed implementation of both storage traits. Expiry is lazy:
//! entries are dropped when a read finds them stale.

use super::{GrantStore, KvStore};
use crate::Result;
use crate::model::{AuthGrant, PendingAuthorization, RegisteredClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
struct KvEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct CounterEntry {
    count: u64,
    window_ends: DateTime<Utc>,
}

/// In-memory store suitable for single-process deployments and tests
#[derive(Default)]
pub struct MemoryStore {
    kv: DashMap<String, KvEntry>,
    counters: DashMap<String, CounterEntry>,
    clients: DashMap<String, RegisteredClient>,
    pending: DashMap<String, PendingAuthorization>,
    grants: DashMap<String, AuthGrant>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.kv.get(key) {
            if let Some(expires_at) = entry.expires_at
                && Utc::now() > expires_at
            {
                drop(entry);
                self.kv.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .map(|ttl| Utc::now() + ttl)
        });
        self.kv
            .insert(key.to_string(), KvEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.kv.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<u64> {
        let now = Utc::now();
        let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert(CounterEntry {
                count: 0,
                window_ends: now + window,
            });
        if now > entry.window_ends {
            entry.count = 0;
            entry.window_ends = now + window;
        }
        entry.count += 1;
        Ok(entry.count)
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn save_client(&self, client: &RegisteredClient) -> Result<()> {
        self.clients.insert(client.id.clone(), client.clone());
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<RegisteredClient>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn save_pending(&self, pending: &PendingAuthorization) -> Result<()> {
        self.pending.insert(pending.code.clone(), pending.clone());
        Ok(())
    }

    async fn take_pending(&self, code: &str) -> Result<Option<PendingAuthorization>> {
        Ok(self.pending.remove(code).map(|(_, pending)| pending))
    }

    async fn save_grant(&self, token: &str, grant: &AuthGrant) -> Result<()> {
        self.grants.insert(token.to_string(), grant.clone());
        Ok(())
    }

    async fn get_grant(&self, token: &str) -> Result<Option<AuthGrant>> {
        Ok(self.grants.get(token).map(|g| g.clone()))
    }

    async fn delete_grant(&self, token: &str) -> Result<()> {
        self.grants.remove(token);
        Ok(())
    }
}
