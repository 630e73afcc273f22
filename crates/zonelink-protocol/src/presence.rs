//! Presence messages: state updates, watch requests, and the
//! notifications that fan out to watchers.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::message::Wire;
use crate::types::Presence;
use crate::wire::{Reader, ascii_trimmed, put_cstr};
use crate::ProtocolError;

/// How the trailing byte of a watch request's name field is treated.
///
/// Captured watch requests do not settle whether the last byte belongs
/// to the name, so the choice is left to configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchNameLayout {
    /// The name runs to the end of the payload.
    #[default]
    IncludeTrailer,
    /// The last payload byte is a sentinel and is dropped.
    ExcludeTrailer,
}

/// Client reports its own state and application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub presence: Presence,
}

impl Wire for StateUpdate {
    const TYPE_ID: i32 = 4101;
    const NAME: &'static str = "StateUpdate";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(0);
        out.put_i32_le(self.presence.pack());
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4)?;
        Ok(Self {
            presence: Presence::unpack(r.i32()?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateAck {
    pub code: i32,
}

impl Default for StateAck {
    fn default() -> Self {
        Self { code: 13 }
    }
}

impl Wire for StateAck {
    const TYPE_ID: i32 = 4102;
    const NAME: &'static str = "StateAck";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(0);
        out.put_i32_le(self.code);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4)?;
        Ok(Self { code: r.i32()? })
    }
}

/// Client asks to be told about another user's presence.
///
/// The name field is kept raw; [`Watch::name`] interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    pub flags: i32,
    pub name_field: Vec<u8>,
}

impl Watch {
    /// A watch request as clients normally send it: name plus NUL.
    pub fn for_name(name: &str) -> Self {
        let mut name_field: Vec<u8> = crate::wire::ascii_bytes(name).collect();
        name_field.push(0);
        Self {
            flags: 1,
            name_field,
        }
    }

    pub fn name(&self, layout: WatchNameLayout) -> String {
        let field = match layout {
            WatchNameLayout::IncludeTrailer => &self.name_field[..],
            WatchNameLayout::ExcludeTrailer => {
                let end = self.name_field.len().saturating_sub(1);
                &self.name_field[..end]
            }
        };
        ascii_trimmed(field)
    }
}

impl Wire for Watch {
    const TYPE_ID: i32 = 4105;
    const NAME: &'static str = "Watch";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(0);
        out.put_i32_le(self.flags);
        out.put_slice(&self.name_field);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4)?;
        let flags = r.i32()?;
        Ok(Self {
            flags,
            name_field: r.rest().to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchAck {
    pub name: String,
}

impl Wire for WatchAck {
    const TYPE_ID: i32 = 4106;
    const NAME: &'static str = "WatchAck";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(0);
        out.put_i32_le(1);
        put_cstr(out, &self.name);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(8)?;
        Ok(Self { name: r.cstr()? })
    }
}

/// Presence notification about one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPresence {
    pub name: String,
    pub presence: Presence,
}

impl Wire for UserPresence {
    const TYPE_ID: i32 = 8192;
    const NAME: &'static str = "UserPresence";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(0);
        out.put_i32_le(self.presence.pack());
        put_cstr(out, &self.name);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4)?;
        let presence = Presence::unpack(r.i32()?);
        Ok(Self {
            name: r.cstr()?,
            presence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AppId, UserState};

    #[test]
    fn test_state_update_round_trip() {
        let update = StateUpdate {
            presence: Presence {
                state: UserState::HOSTING_GAME,
                app: AppId::Expansion,
            },
        };
        let message = update.to_message().unwrap();
        assert_eq!(&message.payload()[4..], &0x12i32.to_le_bytes());
        assert_eq!(StateUpdate::read(message.payload()).unwrap(), update);
    }

    #[test]
    fn test_state_ack_layout() {
        let message = StateAck::default().to_message().unwrap();
        assert_eq!(message.payload(), &[0, 0, 0, 0, 13, 0, 0, 0]);
    }

    #[test]
    fn test_watch_name_include_trailer_keeps_last_char() {
        let watch = Watch::read(&[0, 0, 0, 0, 1, 0, 0, 0, b'b', b'o', b'b']).unwrap();
        assert_eq!(watch.name(WatchNameLayout::IncludeTrailer), "bob");
        assert_eq!(watch.name(WatchNameLayout::ExcludeTrailer), "bo");
    }

    #[test]
    fn test_watch_name_nul_terminated_same_under_both_layouts() {
        let watch = Watch::for_name("bob");
        let decoded = Watch::read(watch.to_message().unwrap().payload()).unwrap();
        assert_eq!(decoded, watch);
        assert_eq!(decoded.name(WatchNameLayout::IncludeTrailer), "bob");
        assert_eq!(decoded.name(WatchNameLayout::ExcludeTrailer), "bob");
    }

    #[test]
    fn test_watch_ack_round_trip() {
        let ack = WatchAck { name: "bob".into() };
        let message = ack.to_message().unwrap();
        assert_eq!(&message.payload()[8..], b"bob\0");
        assert_eq!(WatchAck::read(message.payload()).unwrap(), ack);
    }

    #[test]
    fn test_user_presence_offline_round_trip() {
        let user = UserPresence {
            name: "x".into(),
            presence: Presence::OFFLINE,
        };
        let message = user.to_message().unwrap();
        assert_eq!(UserPresence::read(message.payload()).unwrap(), user);
    }
}
