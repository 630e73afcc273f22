//! `ZoneServer` builder and accept loops.
//!
//! This is the entry point for running a zone lobby server. It ties
//! together all the layers: transport → engine → session → lobby.

use std::net::SocketAddr;
use std::sync::Arc;

use zonelink_session::{
    FeedbackSink, FileFeedbackSink, IdentityResolver, NullFeedbackSink, SessionError,
    StaticResolver,
};
use zonelink_transport::{Transport, TcpTransport, UdpResponder};

use crate::ZoneError;
use crate::config::ServerConfig;
use crate::engine::{Engine, Listener};
use crate::handler::handle_connection;

/// Feedback sink chosen from the configuration: a file when
/// `feedback_path` is set, otherwise log-only.
#[derive(Debug)]
pub enum ConfiguredFeedback {
    File(FileFeedbackSink),
    Discard(NullFeedbackSink),
}

impl ConfiguredFeedback {
    pub fn from_config(config: &ServerConfig) -> Self {
        match &config.feedback_path {
            Some(path) => Self::File(FileFeedbackSink::new(path)),
            None => Self::Discard(NullFeedbackSink),
        }
    }
}

impl FeedbackSink for ConfiguredFeedback {
    async fn append(&self, from: &str, text: &str) -> Result<(), SessionError> {
        match self {
            Self::File(sink) => sink.append(from, text).await,
            Self::Discard(sink) => sink.append(from, text).await,
        }
    }
}

/// Builder for configuring and starting a zone server.
///
/// Set the configuration first: it also seeds the bundled resolver and
/// feedback sink, which [`resolver`](Self::resolver) and
/// [`feedback`](Self::feedback) then replace.
///
/// # Example
///
/// ```rust,ignore
/// use zonelink::prelude::*;
///
/// let server = ZoneServer::builder()
///     .config(ServerConfig::from_file("zone.json")?)
///     .resolver(my_resolver)
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct ZoneServerBuilder<R = StaticResolver, F = ConfiguredFeedback> {
    config: ServerConfig,
    resolver: R,
    feedback: F,
}

impl ZoneServerBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration and rebuilds the bundled collaborators
    /// from it.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.resolver = StaticResolver::new(config.identity.names.clone());
        self.feedback = ConfiguredFeedback::from_config(&config);
        self.config = config;
        self
    }
}

impl Default for ZoneServerBuilder {
    fn default() -> Self {
        let config = ServerConfig::default();
        Self {
            resolver: StaticResolver::new(config.identity.names.clone()),
            feedback: ConfiguredFeedback::from_config(&config),
            config,
        }
    }
}

impl<R, F> ZoneServerBuilder<R, F>
where
    R: IdentityResolver,
    F: FeedbackSink,
{
    /// Replaces the identity resolver.
    pub fn resolver<R2: IdentityResolver>(self, resolver: R2) -> ZoneServerBuilder<R2, F> {
        ZoneServerBuilder {
            config: self.config,
            resolver,
            feedback: self.feedback,
        }
    }

    /// Replaces the feedback sink.
    pub fn feedback<F2: FeedbackSink>(self, feedback: F2) -> ZoneServerBuilder<R, F2> {
        ZoneServerBuilder {
            config: self.config,
            resolver: self.resolver,
            feedback,
        }
    }

    /// Validates the configuration and binds every listener.
    ///
    /// # Errors
    /// [`ZoneError::Config`] for an invalid configuration, or a transport
    /// error if any port cannot be bound.
    pub async fn build(self) -> Result<ZoneServer<R, F>, ZoneError> {
        self.config.validate()?;

        let host = &self.config.bind_host;
        let direct = TcpTransport::bind(&format!("{host}:{}", self.config.direct_port)).await?;
        let mut lobbies = Vec::with_capacity(usize::from(self.config.lobby_count));
        for port in self.config.lobby_ports() {
            lobbies.push(TcpTransport::bind(&format!("{host}:{port}")).await?);
        }
        let responder = match self.config.udp_port {
            Some(port) => Some(UdpResponder::bind(&format!("{host}:{port}")).await?),
            None => None,
        };

        let engine = Arc::new(Engine::new(self.config, self.resolver, self.feedback));
        Ok(ZoneServer {
            direct,
            lobbies,
            responder,
            engine,
        })
    }
}

/// A bound zone server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ZoneServer<R, F> {
    direct: TcpTransport,
    lobbies: Vec<TcpTransport>,
    responder: Option<UdpResponder>,
    engine: Arc<Engine<R, F>>,
}

impl ZoneServer<StaticResolver, ConfiguredFeedback> {
    /// Creates a new builder.
    pub fn builder() -> ZoneServerBuilder {
        ZoneServerBuilder::new()
    }
}

impl<R, F> ZoneServer<R, F>
where
    R: IdentityResolver,
    F: FeedbackSink,
{
    /// Address of the direct (messaging) listener.
    pub fn direct_addr(&self) -> Result<SocketAddr, ZoneError> {
        Ok(self.direct.local_addr()?)
    }

    /// Addresses of the lobby listeners, in lobby order.
    pub fn lobby_addrs(&self) -> Result<Vec<SocketAddr>, ZoneError> {
        self.lobbies
            .iter()
            .map(|lobby| lobby.local_addr().map_err(ZoneError::from))
            .collect()
    }

    /// Address of the UDP address responder, if enabled.
    pub fn udp_addr(&self) -> Result<Option<SocketAddr>, ZoneError> {
        self.responder
            .as_ref()
            .map(|responder| responder.local_addr().map_err(ZoneError::from))
            .transpose()
    }

    pub fn engine(&self) -> &Arc<Engine<R, F>> {
        &self.engine
    }

    /// Runs one accept loop per listener, plus the UDP responder.
    ///
    /// Each accepted connection gets its own handler task. Runs until the
    /// process is terminated.
    pub async fn run(self) -> Result<(), ZoneError> {
        tracing::info!(
            direct = %self.direct_addr()?,
            lobbies = self.lobbies.len(),
            "zone server running"
        );

        if let Some(responder) = self.responder {
            tokio::spawn(async move {
                if let Err(e) = responder.run().await {
                    tracing::error!(error = %e, "UDP address responder stopped");
                }
            });
        }
        for (index, lobby) in self.lobbies.into_iter().enumerate() {
            tokio::spawn(accept_loop(
                lobby,
                Listener::Lobby(index),
                Arc::clone(&self.engine),
            ));
        }
        accept_loop(self.direct, Listener::Direct, self.engine).await;
        Ok(())
    }
}

async fn accept_loop<R, F>(mut transport: TcpTransport, listener: Listener, engine: Arc<Engine<R, F>>)
where
    R: IdentityResolver,
    F: FeedbackSink,
{
    if let Ok(addr) = transport.local_addr() {
        tracing::info!(%addr, ?listener, "listening");
    }
    loop {
        match transport.accept().await {
            Ok(conn) => {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(conn, listener, engine).await {
                        tracing::debug!(error = %e, "connection ended with error");
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, ?listener, "accept failed");
            }
        }
    }
}
