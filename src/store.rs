//! Pluggable session persistence
//!
//! In stateful mode the transport keeps live [`Session`](crate::Session)
//! aggregates in memory and persists their projection through a
//! [`SessionStore`], so sessions survive instance restarts on serverless
//! platforms. The in-memory store realizes the TTL with one abortable timer
//! per id; external key-value stores should realize it natively.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Persistable projection of a session: no streams, no pending requests,
/// no timers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub id: String,
    pub initialized: bool,
    pub protocol_version: String,
}

/// Session persistence interface.
///
/// Implementations may be backed by memory, Redis, or any key-value store
/// with native expiry. All operations are async and object-safe.
pub trait SessionStore: Send + Sync + 'static {
    /// Fetch the session data for `id`, if present and unexpired.
    fn get(&self, id: &str) -> BoxFuture<'_, Option<SessionData>>;

    /// Store `data` under `id` with the given time-to-live. Overwriting an
    /// entry resets its TTL.
    fn set(&self, id: &str, data: SessionData, ttl: Duration) -> BoxFuture<'_, ()>;

    /// Remove the entry for `id`, if any.
    fn delete(&self, id: &str) -> BoxFuture<'_, ()>;
}

struct StoredEntry {
    data: SessionData,
    /// Auto-removal timer; aborted when the entry is replaced or deleted.
    expiry: JoinHandle<()>,
}

/// In-memory [`SessionStore`] with per-id expiry timers.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    entries: Arc<Mutex<HashMap<String, StoredEntry>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &str) -> BoxFuture<'_, Option<SessionData>> {
        let id = id.to_string();
        Box::pin(async move {
            let entries = self.entries.lock().await;
            entries.get(&id).map(|entry| entry.data.clone())
        })
    }

    fn set(&self, id: &str, data: SessionData, ttl: Duration) -> BoxFuture<'_, ()> {
        let id = id.to_string();
        Box::pin(async move {
            let entries_handle = self.entries.clone();
            let expiry_id = id.clone();
            let expiry = tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                let mut entries = entries_handle.lock().await;
                if entries.remove(&expiry_id).is_some() {
                    tracing::debug!(session_id = %expiry_id, "Stored session expired");
                }
            });

            let mut entries = self.entries.lock().await;
            if let Some(previous) = entries.insert(id, StoredEntry { data, expiry }) {
                previous.expiry.abort();
            }
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, ()> {
        let id = id.to_string();
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.remove(&id) {
                entry.expiry.abort();
            }
        })
    }
}
