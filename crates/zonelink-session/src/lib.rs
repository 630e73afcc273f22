//! Per-connection state and the process-wide presence directory.
//!
//! This crate owns everything the engine needs to remember between
//! frames:
//!
//! 1. **Phase**: where a connection is in the handshake ([`Phase`])
//! 2. **Peer**: the shared per-connection handle other connections route
//!    through ([`Peer`], [`Profile`])
//! 3. **Outbound queue**: serialized, coalesced delivery ([`Outbox`])
//! 4. **Directory**: who is online under which name ([`PresenceDirectory`])
//! 5. **Collaborators**: identity lookup and the feedback sink
//!    ([`IdentityResolver`], [`FeedbackSink`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Engine / Lobby (above)  ← drive phases, route messages between peers
//!     ↕
//! Session Layer (this crate)  ← connection state, queues, directory
//!     ↕
//! Protocol Layer (below)  ← frames, messages, presence types
//! ```
//!
//! # Lock order
//!
//! Directory (or lobby) first, then a peer's profile, then an outbox.
//! None of these locks is held across an `.await`.

#![allow(async_fn_in_trait)]

mod directory;
mod error;
mod feedback;
mod handshake;
mod identity;
mod outbox;
mod peer;
mod phase;

pub use directory::PresenceDirectory;
pub use error::SessionError;
pub use feedback::{FeedbackSink, FileFeedbackSink, NullFeedbackSink};
pub use handshake::{HandshakeConfig, generate_handshake};
pub use identity::{IdentityResolver, LookupError, StaticResolver};
pub use outbox::{Outbox, WriteReceiver};
pub use peer::{Peer, Profile};
pub use phase::Phase;

use std::sync::{Mutex, MutexGuard};

/// Locks a mutex, recovering the guard if a previous holder panicked.
///
/// Every guarded structure here is updated in single statements, so a
/// poisoned lock still holds consistent data.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
