//! The shared handle for one connection.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use zonelink_protocol::{Presence, Scope};
use zonelink_transport::ConnectionId;

use crate::outbox::{Outbox, WriteReceiver};
use crate::{Phase, lock};

/// What the server knows about the user behind a connection.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub phase: Phase,
    pub user_id: i32,
    /// Display name; empty until the security exchange resolves it.
    pub name: String,
    pub presence: Presence,
    /// Lowercased names this connection wants presence updates for.
    watching: HashSet<String>,
    /// Short id assigned by the lobby, for room connections.
    pub short_id: Option<i16>,
}

impl Profile {
    /// Adds a name to the watch list. Returns `false` if already watched.
    pub fn watch(&mut self, name: &str) -> bool {
        self.watching.insert(name.to_lowercase())
    }

    pub fn is_watching(&self, name: &str) -> bool {
        self.watching.contains(&name.to_lowercase())
    }

    pub fn watch_count(&self) -> usize {
        self.watching.len()
    }
}

/// One connection, shared between its own handler and every other
/// connection that routes to it.
pub struct Peer {
    id: ConnectionId,
    addr: SocketAddr,
    scope: Scope,
    outbox: Outbox,
    profile: Mutex<Profile>,
}

impl Peer {
    /// Creates a peer in the `Connecting` phase, returning the stream of
    /// buffers its writer must put on the socket.
    pub fn new(id: ConnectionId, addr: SocketAddr, scope: Scope) -> (Arc<Self>, WriteReceiver) {
        let (outbox, writes) = Outbox::new();
        let peer = Arc::new(Self {
            id,
            addr,
            scope,
            outbox,
            profile: Mutex::new(Profile::default()),
        });
        (peer, writes)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Locks the profile. Keep the guard short; never hold it while
    /// taking the directory or a lobby lock.
    pub fn profile(&self) -> MutexGuard<'_, Profile> {
        lock(&self.profile)
    }

    pub fn phase(&self) -> Phase {
        self.profile().phase
    }

    pub fn name(&self) -> String {
        self.profile().name.clone()
    }

    pub fn presence(&self) -> Presence {
        self.profile().presence
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
