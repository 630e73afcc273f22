//! Per-connection outbound queue.
//!
//! Any task may enqueue onto any connection's [`Outbox`]: a connection's
//! own replies, presence fan-out from a watcher's peer, lobby broadcasts.
//! The queue guarantees at most one write in flight per connection. While
//! a write is outstanding, new frames accumulate and go out together as
//! one buffer once the writer reports completion.
//!
//! ```text
//! send() ──→ [pending] ──flush──→ one Vec<u8> ──→ writer task
//!                ↑                                    │
//!                └──────────── write_complete() ──────┘
//! ```

use std::sync::Mutex;

use tokio::sync::mpsc;
use zonelink_protocol::{
    BOOTSTRAP_KEY, Frame, HandshakeInit, ProtocolError, ServerMessage, encode_frame,
};

use crate::lock;

/// Receiving end of an outbox: each item is one write for the socket.
pub type WriteReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

enum Pending {
    /// Goes out under the bootstrap key regardless of the current key.
    Handshake(HandshakeInit),
    Frame(Frame),
}

struct Queue {
    pending: Vec<Pending>,
    in_flight: bool,
    /// Set once the socket is gone; everything queued after is dropped.
    closed: bool,
    key: u32,
    next_sequence: u32,
}

pub struct Outbox {
    queue: Mutex<Queue>,
    writes: mpsc::UnboundedSender<Vec<u8>>,
}

impl Outbox {
    /// Creates an empty outbox keyed with the bootstrap key.
    pub fn new() -> (Self, WriteReceiver) {
        let (writes, rx) = mpsc::unbounded_channel();
        let outbox = Self {
            queue: Mutex::new(Queue {
                pending: Vec::new(),
                in_flight: false,
                closed: false,
                key: BOOTSTRAP_KEY,
                next_sequence: 0,
            }),
            writes,
        };
        (outbox, rx)
    }

    /// The connection's current secure key. Inbound frames are decoded
    /// with it too.
    pub fn key(&self) -> u32 {
        lock(&self.queue).key
    }

    /// Queues the handshake-init record and adopts its key and sequence
    /// id for every later frame.
    pub fn send_handshake(&self, init: HandshakeInit) {
        let mut queue = lock(&self.queue);
        queue.pending.push(Pending::Handshake(init));
        queue.key = init.secure_key;
        queue.next_sequence = init.sequence_id;
        self.flush(&mut queue);
    }

    /// Queues one message.
    ///
    /// # Errors
    /// Fails only if the message cannot be serialized; nothing is queued.
    pub fn send(&self, message: &ServerMessage) -> Result<(), ProtocolError> {
        self.send_all(std::slice::from_ref(message))
    }

    /// Queues several messages back to back.
    ///
    /// All messages are serialized before any is queued, so a failure
    /// leaves the queue untouched.
    pub fn send_all(&self, messages: &[ServerMessage]) -> Result<(), ProtocolError> {
        let encoded = messages
            .iter()
            .map(|m| m.to_message().map(|msg| msg.encode()))
            .collect::<Result<Vec<_>, _>>()?;
        if encoded.is_empty() {
            return Ok(());
        }

        let mut queue = lock(&self.queue);
        for data in encoded {
            let sequence_id = queue.next_sequence;
            queue.next_sequence = sequence_id.wrapping_add(1);
            queue.pending.push(Pending::Frame(Frame::new(sequence_id, data)));
        }
        self.flush(&mut queue);
        Ok(())
    }

    /// Called by the writer once the previous buffer hit the socket.
    /// Sends whatever piled up meanwhile.
    pub fn write_complete(&self) {
        let mut queue = lock(&self.queue);
        queue.in_flight = false;
        self.flush(&mut queue);
    }

    /// Frames waiting behind the in-flight write.
    pub fn pending_len(&self) -> usize {
        lock(&self.queue).pending.len()
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.queue).in_flight
    }

    /// Called by the writer when the socket can no longer be written.
    /// Drops what is pending and discards every later send.
    pub fn close(&self) {
        let mut queue = lock(&self.queue);
        queue.closed = true;
        queue.in_flight = false;
        queue.pending.clear();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.queue).closed
    }

    fn flush(&self, queue: &mut Queue) {
        if queue.closed {
            queue.pending.clear();
            return;
        }
        if queue.in_flight || queue.pending.is_empty() {
            return;
        }

        let key = queue.key;
        let mut buffer = Vec::new();
        for item in queue.pending.drain(..) {
            match item {
                Pending::Handshake(init) => buffer.extend_from_slice(&init.encode()),
                Pending::Frame(frame) => buffer.extend_from_slice(&encode_frame(&frame, key)),
            }
        }

        if self.writes.send(buffer).is_err() {
            tracing::debug!("writer gone; dropping outbound buffer");
            return;
        }
        queue.in_flight = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonelink_protocol::{
        Message, StateAck, UnionType, WatchAck, Wire, decode_frame,
    };

    fn ack() -> ServerMessage {
        StateAck::default().into()
    }

    fn decode_all(mut buf: &[u8], key: u32) -> Vec<Frame> {
        let mut frames = Vec::new();
        while !buf.is_empty() {
            let (frame, rest) = decode_frame(buf, key).unwrap();
            frames.push(frame);
            buf = rest;
        }
        frames
    }

    #[test]
    fn test_send_idle_flushes_immediately() {
        let (outbox, mut rx) = Outbox::new();
        outbox.send(&ack()).unwrap();

        let buffer = rx.try_recv().unwrap();
        let frames = decode_all(&buffer, BOOTSTRAP_KEY);
        assert_eq!(frames.len(), 1);
        assert!(outbox.is_in_flight());
        assert_eq!(outbox.pending_len(), 0);
    }

    #[test]
    fn test_send_while_in_flight_coalesces_into_one_write() {
        let (outbox, mut rx) = Outbox::new();
        outbox.send(&ack()).unwrap();
        let _first = rx.try_recv().unwrap();

        for name in ["a", "b", "c"] {
            outbox.send(&WatchAck { name: name.into() }.into()).unwrap();
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(outbox.pending_len(), 3);

        outbox.write_complete();
        let second = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());

        let names: Vec<String> = decode_all(&second, BOOTSTRAP_KEY)
            .iter()
            .map(|f| {
                let message = Message::decode(&f.data).unwrap();
                WatchAck::read(message.payload())
                    .unwrap()
                    .name
            })
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_write_complete_with_nothing_pending_clears_in_flight() {
        let (outbox, mut rx) = Outbox::new();
        outbox.send(&ack()).unwrap();
        let _ = rx.try_recv().unwrap();

        outbox.write_complete();
        assert!(!outbox.is_in_flight());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_handshake_switches_key_and_sequence() {
        let (outbox, mut rx) = Outbox::new();
        let init = HandshakeInit {
            union_type: UnionType::DIRECT,
            secure_key: 0x4242_4242,
            sequence_id: 900,
        };
        outbox.send_handshake(init);
        outbox.send(&ack()).unwrap();
        outbox.send(&ack()).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(HandshakeInit::decode(&first).unwrap(), init);
        assert_eq!(outbox.key(), 0x4242_4242);

        outbox.write_complete();
        let frames = decode_all(&rx.try_recv().unwrap(), 0x4242_4242);
        let sequences: Vec<u32> = frames.iter().map(|f| f.sequence_id).collect();
        assert_eq!(sequences, vec![900, 901]);
    }

    #[test]
    fn test_send_all_empty_does_not_write() {
        let (outbox, mut rx) = Outbox::new();
        outbox.send_all(&[]).unwrap();
        assert!(rx.try_recv().is_err());
        assert!(!outbox.is_in_flight());
    }

    #[test]
    fn test_send_after_writer_dropped_does_not_stall() {
        let (outbox, rx) = Outbox::new();
        drop(rx);
        outbox.send(&ack()).unwrap();
        assert!(!outbox.is_in_flight());
        assert_eq!(outbox.pending_len(), 0);
    }

    #[test]
    fn test_close_drops_pending_and_later_sends() {
        let (outbox, mut rx) = Outbox::new();
        outbox.send(&ack()).unwrap();
        let _first = rx.try_recv().unwrap();
        outbox.send(&ack()).unwrap();
        assert_eq!(outbox.pending_len(), 1);

        outbox.close();
        assert!(outbox.is_closed());
        assert!(!outbox.is_in_flight());
        assert_eq!(outbox.pending_len(), 0);

        outbox.send(&ack()).unwrap();
        outbox.write_complete();
        assert_eq!(outbox.pending_len(), 0);
        assert!(rx.try_recv().is_err());
    }
}
