//! Chat room messages: joining, roster records, and compressed talk.
//!
//! Chat text is zlib-compressed UTF-16LE, prefixed by its compressed
//! length. Lines are addressed by the sender's room short id while the
//! sender is present, and by display name once they have left.

use bytes::{BufMut, BytesMut};

use crate::ProtocolError;
use crate::message::Wire;
use crate::wire::{Reader, compress_chat, decompress_chat, put_cstr, put_padded};

/// Width of the NUL-padded name field in roster records.
pub const NAME_FIELD_LEN: usize = 20;

fn read_compressed(r: &mut Reader<'_>) -> Result<String, ProtocolError> {
    let len = r.i32()?.max(0) as usize;
    decompress_chat(r.bytes(len)?)
}

fn write_compressed(out: &mut BytesMut, text: &str) -> Result<(), ProtocolError> {
    let packed = compress_chat(text)?;
    out.put_i32_le(packed.len() as i32);
    out.put_slice(&packed);
    Ok(())
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// One member as shown in the room roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoRecord {
    pub user_id: i32,
    pub short_id: i16,
    pub flags: i16,
    pub name: String,
}

impl InfoRecord {
    pub const LEN: usize = 8 + NAME_FIELD_LEN;

    fn write(&self, out: &mut BytesMut) {
        out.put_i32_le(self.user_id);
        out.put_i16_le(self.short_id);
        out.put_i16_le(self.flags);
        put_padded(out, &self.name, NAME_FIELD_LEN);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            user_id: r.i32()?,
            short_id: r.i16()?,
            flags: r.i16()?,
            name: r.ascii(NAME_FIELD_LEN)?,
        })
    }
}

/// Client's request to join the room behind this port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConnect {
    pub user_id: i32,
    pub name: String,
}

impl Wire for RoomConnect {
    const TYPE_ID: i32 = 0;
    const NAME: &'static str = "RoomConnect";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(0);
        out.put_i32_le(self.user_id);
        put_cstr(out, &self.name);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4)?;
        let user_id = r.i32()?;
        let name = if r.remaining() > 0 { r.cstr()? } else { String::new() };
        Ok(Self { user_id, name })
    }
}

/// Tells a joining client its short id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAccessed {
    pub user_id: i32,
    pub short_id: i16,
    pub member_count: i16,
}

impl Wire for RoomAccessed {
    const TYPE_ID: i32 = 11;
    const NAME: &'static str = "RoomAccessed";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(self.user_id);
        out.put_i16_le(self.short_id);
        out.put_i16_le(self.member_count);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        Ok(Self {
            user_id: r.i32()?,
            short_id: r.i16()?,
            member_count: r.i16()?,
        })
    }
}

/// Full roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub members: Vec<InfoRecord>,
}

impl Wire for RoomInfo {
    const TYPE_ID: i32 = 1;
    const NAME: &'static str = "RoomInfo";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(self.members.len() as i32);
        for record in &self.members {
            record.write(out);
        }
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        let count = r.i32()?.max(0) as usize;
        let mut members = Vec::with_capacity(count.min(r.remaining() / InfoRecord::LEN));
        for _ in 0..count {
            members.push(InfoRecord::read(&mut r)?);
        }
        Ok(Self { members })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEnter {
    pub member: InfoRecord,
}

impl Wire for RoomEnter {
    const TYPE_ID: i32 = 2;
    const NAME: &'static str = "RoomEnter";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        self.member.write(out);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        Ok(Self {
            member: InfoRecord::read(&mut r)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomLeave {
    pub member: InfoRecord,
}

impl Wire for RoomLeave {
    const TYPE_ID: i32 = 3;
    const NAME: &'static str = "RoomLeave";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        self.member.write(out);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        Ok(Self {
            member: InfoRecord::read(&mut r)?,
        })
    }
}

/// Room sign-off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomDisconnect;

impl Wire for RoomDisconnect {
    const TYPE_ID: i32 = 12;
    const NAME: &'static str = "RoomDisconnect";

    fn write(&self, _out: &mut BytesMut) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read(_payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

// ---------------------------------------------------------------------------
// Talk
// ---------------------------------------------------------------------------

/// A chat line from a client. The short id is the client's own view of
/// itself; the server trusts its own bookkeeping instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Talk {
    pub short_id: i16,
    pub text: String,
}

impl Wire for Talk {
    const TYPE_ID: i32 = 7;
    const NAME: &'static str = "Talk";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i16_le(self.short_id);
        out.put_i16_le(0);
        write_compressed(out, &self.text)
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        let short_id = r.i16()?;
        r.skip(2)?;
        Ok(Self {
            short_id,
            text: read_compressed(&mut r)?,
        })
    }
}

/// A chat line attributed to a present member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkById {
    pub short_id: i16,
    pub text: String,
}

impl Wire for TalkById {
    const TYPE_ID: i32 = 13;
    const NAME: &'static str = "TalkById";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i16_le(self.short_id);
        out.put_i16_le(0);
        write_compressed(out, &self.text)
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        let short_id = r.i16()?;
        r.skip(2)?;
        Ok(Self {
            short_id,
            text: read_compressed(&mut r)?,
        })
    }
}

/// A chat line whose sender has left the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkByName {
    pub name: String,
    pub text: String,
}

impl Wire for TalkByName {
    const TYPE_ID: i32 = 8;
    const NAME: &'static str = "TalkByName";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        put_padded(out, &self.name, NAME_FIELD_LEN);
        write_compressed(out, &self.text)
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        let name = r.ascii(NAME_FIELD_LEN)?;
        Ok(Self {
            name,
            text: read_compressed(&mut r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(short_id: i16, name: &str) -> InfoRecord {
        InfoRecord {
            user_id: 1000 + short_id as i32,
            short_id,
            flags: 0,
            name: name.into(),
        }
    }

    #[test]
    fn test_room_connect_round_trip() {
        let connect = RoomConnect {
            user_id: 5,
            name: "alice".into(),
        };
        let message = connect.to_message().unwrap();
        assert_eq!(RoomConnect::read(message.payload()).unwrap(), connect);
    }

    #[test]
    fn test_room_connect_without_name() {
        let connect = RoomConnect::read(&[0, 0, 0, 0, 9, 0, 0, 0]).unwrap();
        assert_eq!(connect.user_id, 9);
        assert!(connect.name.is_empty());
    }

    #[test]
    fn test_room_info_round_trip_with_records() {
        let info = RoomInfo {
            members: vec![record(371, "alice"), record(372, "nineteen_chars_name")],
        };
        let message = info.to_message().unwrap();
        assert_eq!(message.payload().len(), 4 + 2 * InfoRecord::LEN);
        assert_eq!(RoomInfo::read(message.payload()).unwrap(), info);
    }

    #[test]
    fn test_room_info_empty_round_trip() {
        let info = RoomInfo { members: vec![] };
        let message = info.to_message().unwrap();
        assert_eq!(RoomInfo::read(message.payload()).unwrap(), info);
    }

    #[test]
    fn test_room_info_count_exceeding_records_is_truncated() {
        let mut payload = 3i32.to_le_bytes().to_vec();
        payload.extend_from_slice(&[0; InfoRecord::LEN]);
        assert!(matches!(
            RoomInfo::read(&payload),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_room_enter_and_leave_round_trip() {
        let enter = RoomEnter {
            member: record(371, "bob"),
        };
        let leave = RoomLeave {
            member: record(371, "bob"),
        };
        assert_eq!(
            RoomEnter::read(enter.to_message().unwrap().payload()).unwrap(),
            enter
        );
        assert_eq!(
            RoomLeave::read(leave.to_message().unwrap().payload()).unwrap(),
            leave
        );
    }

    #[test]
    fn test_room_accessed_round_trip() {
        let accessed = RoomAccessed {
            user_id: 44,
            short_id: 371,
            member_count: 2,
        };
        let message = accessed.to_message().unwrap();
        assert_eq!(message.payload().len(), 8);
        assert_eq!(RoomAccessed::read(message.payload()).unwrap(), accessed);
    }

    #[test]
    fn test_talk_round_trip() {
        let talk = Talk {
            short_id: 371,
            text: "anyone up for a 2v2?".into(),
        };
        let message = talk.to_message().unwrap();
        assert_eq!(Talk::read(message.payload()).unwrap(), talk);
    }

    #[test]
    fn test_talk_by_id_and_by_name_round_trip() {
        let by_id = TalkById {
            short_id: 372,
            text: "gg".into(),
        };
        let by_name = TalkByName {
            name: "departed".into(),
            text: "".into(),
        };
        assert_eq!(
            TalkById::read(by_id.to_message().unwrap().payload()).unwrap(),
            by_id
        );
        assert_eq!(
            TalkByName::read(by_name.to_message().unwrap().payload()).unwrap(),
            by_name
        );
    }

    #[test]
    fn test_room_disconnect_round_trip() {
        let message = RoomDisconnect.to_message().unwrap();
        assert_eq!(message.type_id, 12);
        assert_eq!(RoomDisconnect::read(message.payload()).unwrap(), RoomDisconnect);
    }
}
