//! Lobby state without locks or I/O.
//!
//! Every mutating method applies its change and returns the messages it
//! implies, in the order they must be queued. The caller decides how to
//! deliver them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use zonelink_protocol::{
    InfoRecord, RoomAccessed, RoomEnter, RoomInfo, RoomLeave, ServerMessage, TalkById, TalkByName,
};
use zonelink_session::Peer;
use zonelink_transport::ConnectionId;

use crate::LobbyError;

/// Lowest short id handed to a lobby member.
pub const FIRST_SHORT_ID: i16 = 371;

/// One message bound for one member.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub to: Arc<Peer>,
    pub message: ServerMessage,
}

impl Delivery {
    fn new(to: &Arc<Peer>, message: impl Into<ServerMessage>) -> Self {
        Self {
            to: Arc::clone(to),
            message: message.into(),
        }
    }
}

struct Member {
    peer: Arc<Peer>,
    record: InfoRecord,
}

#[derive(Debug, Clone)]
struct ChatLine {
    short_id: i16,
    text: String,
}

/// Members, in join order, and the chat history.
#[derive(Default)]
pub struct Roster {
    members: Vec<Member>,
    log: Vec<ChatLine>,
    /// Short ids referenced by at least one line in the log.
    logged: HashSet<i16>,
    /// Names of departed members whose lines are still in the log.
    departed: HashMap<i16, String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of retained chat lines.
    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.position(id).is_some()
    }

    /// Roster records of the current members, in join order.
    pub fn records(&self) -> Vec<InfoRecord> {
        self.members.iter().map(|m| m.record.clone()).collect()
    }

    /// The lowest id from [`FIRST_SHORT_ID`] that no member holds and no
    /// retained chat line refers to.
    pub fn next_short_id(&self) -> Option<i16> {
        (FIRST_SHORT_ID..=i16::MAX).find(|candidate| {
            !self.members.iter().any(|m| m.record.short_id == *candidate)
                && !self.logged.contains(candidate)
        })
    }

    /// Adds a member.
    ///
    /// The joiner gets its room access reply first. Then every member,
    /// the joiner included, sees the enter record. Then the joiner gets
    /// the roster snapshot and the chat history.
    pub fn join(
        &mut self,
        peer: &Arc<Peer>,
        user_id: i32,
        name: &str,
    ) -> Result<(i16, Vec<Delivery>), LobbyError> {
        if self.contains(peer.id()) {
            return Err(LobbyError::AlreadyMember(peer.id()));
        }
        let short_id = self.next_short_id().ok_or(LobbyError::NoFreeShortId)?;
        let record = InfoRecord {
            user_id,
            short_id,
            flags: 0,
            name: name.to_string(),
        };
        self.members.push(Member {
            peer: Arc::clone(peer),
            record: record.clone(),
        });

        let mut out = Vec::with_capacity(self.members.len() + self.log.len() + 2);
        out.push(Delivery::new(
            peer,
            RoomAccessed {
                user_id,
                short_id,
                member_count: self.members.len() as i16,
            },
        ));
        for member in &self.members {
            out.push(Delivery::new(&member.peer, RoomEnter { member: record.clone() }));
        }
        out.push(Delivery::new(peer, RoomInfo { members: self.records() }));
        out.extend(self.replay().map(|message| Delivery::new(peer, message)));
        Ok((short_id, out))
    }

    /// Removes a member and tells the others.
    ///
    /// When the last member leaves, the history goes with them.
    pub fn leave(&mut self, id: ConnectionId) -> Result<Vec<Delivery>, LobbyError> {
        let index = self.position(id).ok_or(LobbyError::NotMember(id))?;
        let gone = self.members.remove(index);

        if self.members.is_empty() {
            self.log.clear();
            self.logged.clear();
            self.departed.clear();
            return Ok(Vec::new());
        }

        let short_id = gone.record.short_id;
        if self.logged.contains(&short_id) {
            self.departed.insert(short_id, gone.record.name.clone());
        }
        Ok(self
            .members
            .iter()
            .map(|m| Delivery::new(&m.peer, RoomLeave { member: gone.record.clone() }))
            .collect())
    }

    /// Appends a chat line from member `id` and broadcasts it.
    pub fn talk(&mut self, id: ConnectionId, text: &str) -> Result<Vec<Delivery>, LobbyError> {
        let index = self.position(id).ok_or(LobbyError::NotMember(id))?;
        let short_id = self.members[index].record.short_id;
        self.log.push(ChatLine {
            short_id,
            text: text.to_string(),
        });
        self.logged.insert(short_id);
        Ok(self
            .members
            .iter()
            .map(|m| {
                Delivery::new(
                    &m.peer,
                    TalkById {
                        short_id,
                        text: text.to_string(),
                    },
                )
            })
            .collect())
    }

    /// The history as a joiner sees it: by id while the author is present,
    /// by name afterwards.
    fn replay(&self) -> impl Iterator<Item = ServerMessage> + '_ {
        self.log.iter().filter_map(|line| {
            let present = self.members.iter().any(|m| m.record.short_id == line.short_id);
            if present {
                return Some(
                    TalkById {
                        short_id: line.short_id,
                        text: line.text.clone(),
                    }
                    .into(),
                );
            }
            match self.departed.get(&line.short_id) {
                Some(name) => Some(
                    TalkByName {
                        name: name.clone(),
                        text: line.text.clone(),
                    }
                    .into(),
                ),
                None => {
                    tracing::debug!(short_id = line.short_id, "chat line with unknown author skipped");
                    None
                }
            }
        })
    }

    fn position(&self, id: ConnectionId) -> Option<usize> {
        self.members.iter().position(|m| m.peer.id() == id)
    }
}
