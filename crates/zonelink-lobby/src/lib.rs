//! Chat lobbies for zonelink.
//!
//! One [`Lobby`] exists per room listener port. It tracks the member
//! roster and the chat history shown to late joiners, and turns every
//! roster or chat change into the notifications members must receive.
//!
//! # Key types
//!
//! - [`Roster`]: the pure state; each mutation returns its [`Delivery`]s
//! - [`Lobby`]: a lock-protected roster that hands deliveries to outboxes
//! - [`LobbyError`]: why a join, leave, or chat line was refused

mod error;
mod lobby;
mod roster;

pub use error::LobbyError;
pub use lobby::Lobby;
pub use roster::{Delivery, FIRST_SHORT_ID, Roster};
