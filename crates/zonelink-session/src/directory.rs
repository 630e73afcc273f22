//! The presence directory: online, non-room connections by display name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use zonelink_transport::ConnectionId;

use crate::{Peer, lock};

/// Process-wide map from lowercased display name to connection.
///
/// Only connections that completed `Connect` on the direct listener are
/// registered. Room connections never appear here.
#[derive(Default)]
pub struct PresenceDirectory {
    online: Mutex<HashMap<String, Arc<Peer>>>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `peer` under `name`, returning whoever held it before.
    pub fn register(&self, name: &str, peer: Arc<Peer>) -> Option<Arc<Peer>> {
        let previous = lock(&self.online).insert(name.to_lowercase(), peer);
        if let Some(previous) = &previous {
            tracing::warn!(name, replaced = %previous.id(), "display name registered twice");
        }
        previous
    }

    /// Removes `name` if it is still held by connection `id`.
    ///
    /// A stale connection going away must not evict a newer one that
    /// took the same name.
    pub fn unregister(&self, name: &str, id: ConnectionId) -> bool {
        let mut online = lock(&self.online);
        let key = name.to_lowercase();
        match online.get(&key) {
            Some(current) if current.id() == id => {
                online.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Case-insensitive exact lookup.
    pub fn find(&self, name: &str) -> Option<Arc<Peer>> {
        lock(&self.online).get(&name.to_lowercase()).cloned()
    }

    /// Every online connection whose watch list contains `name`.
    pub fn watchers_of(&self, name: &str) -> Vec<Arc<Peer>> {
        let online = lock(&self.online);
        online
            .values()
            .filter(|peer| peer.profile().is_watching(name))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.online).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.online).is_empty()
    }
}
