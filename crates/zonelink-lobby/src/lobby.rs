//! A roster behind a lock, delivering to member outboxes.

use std::sync::{Arc, Mutex};

use zonelink_protocol::InfoRecord;
use zonelink_session::{Peer, lock};
use zonelink_transport::ConnectionId;

use crate::{Delivery, LobbyError, Roster};

/// The chat room served on one listener port.
///
/// Deliveries are queued while the roster lock is held, so every member
/// observes joins, leaves, and chat lines in the same order.
pub struct Lobby {
    port: u16,
    roster: Mutex<Roster>,
}

impl Lobby {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            roster: Mutex::new(Roster::new()),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Adds `peer` to the room and records its short id on its profile.
    pub fn join(&self, peer: &Arc<Peer>, user_id: i32, name: &str) -> Result<i16, LobbyError> {
        let mut roster = lock(&self.roster);
        let (short_id, deliveries) = roster.join(peer, user_id, name)?;
        peer.profile().short_id = Some(short_id);
        tracing::info!(port = self.port, conn_id = %peer.id(), name, short_id, "joined lobby");
        deliver(deliveries);
        Ok(short_id)
    }

    pub fn leave(&self, id: ConnectionId) -> Result<(), LobbyError> {
        let mut roster = lock(&self.roster);
        let deliveries = roster.leave(id)?;
        tracing::info!(port = self.port, conn_id = %id, remaining = roster.len(), "left lobby");
        deliver(deliveries);
        Ok(())
    }

    pub fn talk(&self, id: ConnectionId, text: &str) -> Result<(), LobbyError> {
        let mut roster = lock(&self.roster);
        let deliveries = roster.talk(id, text)?;
        tracing::debug!(port = self.port, conn_id = %id, "chat line");
        deliver(deliveries);
        Ok(())
    }

    pub fn member_count(&self) -> usize {
        lock(&self.roster).len()
    }

    pub fn members(&self) -> Vec<InfoRecord> {
        lock(&self.roster).records()
    }
}

fn deliver(deliveries: Vec<Delivery>) {
    for Delivery { to, message } in deliveries {
        if let Err(e) = to.outbox().send(&message) {
            tracing::warn!(conn_id = %to.id(), error = %e, "lobby message dropped");
        }
    }
}
