//! Storage interfaces for the gateway
//!
//! The gateway holds no durable state of its own. Issued tokens, registered
//! clients, the constraint cache, and the rate counter all live behind these
//! traits so a deployment can plug in whatever backing store it runs on.
//! The bundled implementation is in-memory.

pub mod memory;

pub use memory::MemoryStore;

use crate::Result;
use crate::model::{AuthGrant, PendingAuthorization, RegisteredClient};
use async_trait::async_trait;
use std::time::Duration;

/// Generic key/value storage with optional TTL.
///
/// The constraint cache and the rate counter are built on this. Callers that
/// use it as a cache must treat every error as a miss.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Increment a windowed counter and return the new count. Counters reset
    /// when their window elapses.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64>;
}

/// Storage for OAuth state the gateway issues: registered clients, pending
/// authorization codes, and MCP tokens bound to their grants.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn save_client(&self, client: &RegisteredClient) -> Result<()>;

    async fn get_client(&self, client_id: &str) -> Result<Option<RegisteredClient>>;

    async fn save_pending(&self, pending: &PendingAuthorization) -> Result<()>;

    /// Remove and return a pending authorization. Codes are one-time use;
    /// the removal and the read are a single operation.
    async fn take_pending(&self, code: &str) -> Result<Option<PendingAuthorization>>;

    async fn save_grant(&self, token: &str, grant: &AuthGrant) -> Result<()>;

    async fn get_grant(&self, token: &str) -> Result<Option<AuthGrant>>;

    async fn delete_grant(&self, token: &str) -> Result<()>;
}
