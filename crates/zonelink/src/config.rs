//! Server configuration.
//!
//! Everything has a default matching the stock deployment, so an
//! empty JSON object is a valid config file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zonelink_protocol::WatchNameLayout;
use zonelink_session::HandshakeConfig;

use crate::ZoneError;

pub const DEFAULT_DIRECT_PORT: u16 = 28801;
pub const DEFAULT_LOBBY_BASE_PORT: u16 = 28805;
pub const DEFAULT_LOBBY_COUNT: u16 = 19;
pub const DEFAULT_UDP_PORT: u16 = 2300;

pub const DEFAULT_WELCOME: &str =
    "Welcome online! Please send your feedback using /feedback {insert suggestion here} on the chat.";

pub const DEFAULT_CONNECT_ACK: &str = "user=<{user}>MaxWatches=<250>MaxFilters=<250>\
MinChatVersion=<6.1.500.1>ChatServer=<198292-FRONT3:28802>\
ChatGuid=<B5A42A1E-F44B-11D2-8B66-00C04F8EF2FF>\
ChatData=<ID=[DYNA]data=[game=[chat]dll=[ZoneCore.dll,ZoneClient.dll]\
datafile=[DynamicRes.dll,ChatRes.dll,CommonRes.dll]name=[Private]family=[Chat]]>";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// What to do when no display name can be found for a user id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailure {
    /// Carry on under a name built from `placeholder_template`.
    #[default]
    Placeholder,
    /// Refuse access and drop the connection.
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub lookup_failure: LookupFailure,
    /// `{id}` is replaced by the user id.
    pub placeholder_template: String,
    /// Names served by the bundled static resolver.
    pub names: HashMap<i32, String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            lookup_failure: LookupFailure::Placeholder,
            placeholder_template: "Player{id}".to_string(),
            names: HashMap::new(),
        }
    }
}

impl IdentityConfig {
    pub fn placeholder(&self, user_id: i32) -> String {
        self.placeholder_template.replace("{id}", &user_id.to_string())
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_host: String,
    /// Port for presence, watches, and direct messages.
    pub direct_port: u16,
    /// First chat lobby port; lobbies occupy `lobby_count` ports from here.
    /// 0 lets the OS pick each lobby's port.
    pub lobby_base_port: u16,
    pub lobby_count: u16,
    /// UDP address responder port. `None` disables the responder; 0 lets
    /// the OS pick.
    pub udp_port: Option<u16>,
    pub handshake: HandshakeConfig,
    pub identity: IdentityConfig,
    pub watch_name_layout: WatchNameLayout,
    /// Sender name on server-originated data messages.
    pub server_name: String,
    /// Sent to every user right after connect. Empty disables it.
    pub welcome_message: String,
    /// Text addressed to this pseudo-user is stored, not routed.
    pub feedback_name: String,
    pub feedback_path: Option<PathBuf>,
    /// Connect-ack configuration string; `{user}` is the display name.
    pub connect_ack_template: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            direct_port: DEFAULT_DIRECT_PORT,
            lobby_base_port: DEFAULT_LOBBY_BASE_PORT,
            lobby_count: DEFAULT_LOBBY_COUNT,
            udp_port: Some(DEFAULT_UDP_PORT),
            handshake: HandshakeConfig::default(),
            identity: IdentityConfig::default(),
            watch_name_layout: WatchNameLayout::default(),
            server_name: "Server".to_string(),
            welcome_message: DEFAULT_WELCOME.to_string(),
            feedback_name: "Feedback".to_string(),
            feedback_path: None,
            connect_ack_template: DEFAULT_CONNECT_ACK.to_string(),
        }
    }
}

impl ServerConfig {
    /// Reads and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ZoneError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ZoneError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ZoneError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ZoneError::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects port layouts that cannot be bound.
    pub fn validate(&self) -> Result<(), ZoneError> {
        let last = u32::from(self.lobby_base_port) + u32::from(self.lobby_count);
        if self.lobby_count > 0 && last > u32::from(u16::MAX) + 1 {
            return Err(ZoneError::Config(format!(
                "{} lobby ports from {} run past 65535",
                self.lobby_count, self.lobby_base_port
            )));
        }
        if self.lobby_ports().any(|port| port == self.direct_port) && self.direct_port != 0 {
            return Err(ZoneError::Config(format!(
                "direct port {} overlaps the lobby range",
                self.direct_port
            )));
        }
        if self.feedback_name.is_empty() {
            return Err(ZoneError::Config("feedback_name must not be empty".into()));
        }
        Ok(())
    }

    /// Lobby listener ports, in order. A base of 0 gives every lobby an
    /// OS-assigned port.
    pub fn lobby_ports(&self) -> impl Iterator<Item = u16> {
        let base = self.lobby_base_port;
        (0..self.lobby_count).filter_map(move |i| match base {
            0 => Some(0),
            _ => base.checked_add(i),
        })
    }

    pub fn connect_ack_text(&self, name: &str) -> String {
        self.connect_ack_template.replace("{user}", name)
    }
}
