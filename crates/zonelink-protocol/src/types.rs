//! Presence values shared by state updates and user notifications.

use std::fmt;

/// Bit that marks the expansion application in a packed presence field.
const EXPANSION_BIT: i32 = 0x10;

/// What a user is doing. Values the lobby does not know are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserState(pub i32);

impl UserState {
    pub const HOSTING_GAME: Self = Self(2);
    pub const OFFLINE: Self = Self(3);
    /// Also reported as "busy".
    pub const SEARCHING: Self = Self(4);
    pub const AWAY: Self = Self(5);
    pub const PLAYING_GAME: Self = Self(6);
    pub const HOSTING_GAME_ALT: Self = Self(7);
    pub const JOINED_GAME: Self = Self(8);
    pub const STARTING_GAME: Self = Self(10);
    pub const POSTGAME: Self = Self(11);
    pub const ONLINE_RATED_LOUNGE: Self = Self(12);
    pub const ONLINE_ADVANCED_LOUNGE: Self = Self(13);
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::HOSTING_GAME | Self::HOSTING_GAME_ALT => "hosting",
            Self::OFFLINE => "offline",
            Self::SEARCHING => "searching",
            Self::AWAY => "away",
            Self::PLAYING_GAME => "playing",
            Self::JOINED_GAME => "joined",
            Self::STARTING_GAME => "starting",
            Self::POSTGAME => "postgame",
            Self::ONLINE_RATED_LOUNGE => "rated-lounge",
            Self::ONLINE_ADVANCED_LOUNGE => "advanced-lounge",
            Self(other) => return write!(f, "state-{other}"),
        };
        f.write_str(name)
    }
}

/// Which game the client is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppId {
    Base,
    Expansion,
    Offline,
}

/// A user's presence: state plus application, packed on the wire into
/// one `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Presence {
    pub state: UserState,
    pub app: AppId,
}

impl Presence {
    pub const OFFLINE: Self = Self {
        state: UserState::OFFLINE,
        app: AppId::Offline,
    };

    /// Splits a packed field. The state is every bit except the
    /// expansion bit; a state of offline wins over the bit.
    pub fn unpack(packed: i32) -> Self {
        let state = UserState(packed & !EXPANSION_BIT);
        let app = if state == UserState::OFFLINE {
            AppId::Offline
        } else if packed & EXPANSION_BIT != 0 {
            AppId::Expansion
        } else {
            AppId::Base
        };
        Self { state, app }
    }

    pub fn pack(self) -> i32 {
        match self.app {
            AppId::Offline => UserState::OFFLINE.0,
            AppId::Base => self.state.0,
            AppId::Expansion => self.state.0 | EXPANSION_BIT,
        }
    }

    pub fn is_offline(self) -> bool {
        self.app == AppId::Offline || self.state == UserState::OFFLINE
    }
}

impl Default for Presence {
    fn default() -> Self {
        Self::OFFLINE
    }
}
