//! Session manager for tracking all connected clients

use super::connection::SessionHandle;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Manages all active client sessions
pub struct SessionManager {
    next_id: AtomicU64,
    /// Map of session id -> session handle
    sessions: Arc<RwLock<HashMap<u64, SessionHandle>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Allocate an id for a new session
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn register(&self, handle: SessionHandle) {
        self.sessions.write().await.insert(handle.id, handle);
    }

    pub async fn unregister(&self, id: u64) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    /// Ids and addresses of connected clients, ordered by id
    pub async fn connected_clients(&self) -> Vec<(u64, SocketAddr)> {
        let sessions = self.sessions.read().await;
        let mut clients: Vec<_> = sessions.values().map(|h| (h.id, h.addr)).collect();
        clients.sort_unstable();
        clients
    }

    /// Get the number of connected clients
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
