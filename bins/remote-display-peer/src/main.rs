#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use remote_display_common::helpers::split_list;
use remote_display_core::config::{ICE_SERVERS_ENV, ROLE_ENV, SIGNALING_URL_ENV};
use remote_display_core::{
    ConnectionManager, RemoteDisplayConfig, Role, StreamRegistry, WebRtcTransportFactory,
    WsSignalingChannel,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "remote-display-peer")]
struct Args {
    /// offerer (streaming device) or answerer (viewing device)
    #[arg(long, env = ROLE_ENV)]
    role: Option<Role>,

    /// Signaling relay URL (WebSocket)
    #[arg(long, env = SIGNALING_URL_ENV)]
    signaling_url: Option<String>,

    /// STUN/TURN URLs, comma or semicolon separated
    #[arg(long, env = ICE_SERVERS_ENV)]
    ice_servers: Option<String>,

    /// Interval between session summaries in the log; 0 disables them
    #[arg(long, default_value_t = 10)]
    stats_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    remote_display_common::init_tracing();
    let args = Args::parse();

    let mut config = RemoteDisplayConfig::from_env().context("invalid environment")?;
    if let Some(role) = args.role {
        config.role = role;
    }
    if let Some(url) = args.signaling_url {
        config.signaling_url = url;
    }
    if let Some(servers) = args.ice_servers.as_deref() {
        config.ice_servers = split_list(servers);
    }
    info!(
        role = %config.role,
        url = %config.signaling_url,
        ice_servers = config.ice_servers.len(),
        "starting remote display peer"
    );

    let signaling = Arc::new(
        WsSignalingChannel::connect(&config.signaling_url)
            .await
            .with_context(|| format!("failed to reach signaling relay {}", config.signaling_url))?,
    );
    let transports = Arc::new(WebRtcTransportFactory::new(
        config.role,
        config.ice_servers.clone(),
    ));
    let registry = Arc::new(StreamRegistry::new());
    registry.subscribe(|stream| match stream {
        Some(stream) => info!(
            stream = %stream.id(),
            tracks = stream.tracks().len(),
            video = stream.has_video(),
            "remote stream published"
        ),
        None => info!("remote stream absent"),
    });

    let connection = ConnectionManager::spawn(
        config.connection(),
        signaling.clone(),
        transports,
        Arc::clone(&registry),
        None,
    );
    let mut state = connection.watch_state();

    let mut stats = tokio::time::interval(Duration::from_secs(args.stats_interval_secs.max(1)));
    stats.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; shutting down");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    warn!("connection manager stopped unexpectedly");
                    break;
                }
                let current = *state.borrow_and_update();
                if current.is_terminal() {
                    warn!(
                        state = %current,
                        error = connection.last_error().as_deref().unwrap_or("none"),
                        "session ended; waiting for the peer to announce itself again"
                    );
                }
            }
            _ = stats.tick(), if args.stats_interval_secs > 0 => {
                match connection.session_info().await {
                    Some(session) => info!("session {}", serde_json::to_string(&session)?),
                    None => info!(state = %connection.state(), open = signaling.is_open(), "no active session"),
                }
            }
        }
    }

    connection.shutdown().await;
    signaling.close();
    Ok(())
}
