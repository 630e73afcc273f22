//! Zone lobby server.
//!
//! Usage: `zone-server [config.json]`. Without a path the built-in
//! defaults are used. Log verbosity follows `RUST_LOG` (default `info`).

use tracing_subscriber::{EnvFilter, fmt};
use zonelink::prelude::*;

#[tokio::main]
async fn main() -> Result<(), ZoneError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(%path, "loading config");
            ServerConfig::from_file(&path)?
        }
        None => ServerConfig::default(),
    };

    let server = ZoneServer::builder().config(config).build().await?;
    tracing::info!(
        direct = %server.direct_addr()?,
        lobbies = server.lobby_addrs()?.len(),
        udp = ?server.udp_addr()?,
        "zone-server starting"
    );
    server.run().await
}
