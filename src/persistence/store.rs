use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ConductorError;

/// Key-value store with per-entry expiry, used for agent state.
///
/// Callers treat every error from a store as a soft failure.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Value for `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ConductorError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), ConductorError>;

    /// Returns true if a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, ConductorError>;

    /// Liveness probe. Never fails, only reports.
    async fn ping(&self) -> bool;

    fn backend_name(&self) -> &str;
}
