//! TCP listener for inbound location updates
//!
//! Accepts connections from client collaborators and speaks JSON lines:
//! one `{"user_id", "zone", "action"}` request per line, one response line
//! per request reporting the resulting zone membership. A malformed line
//! gets an error response; listener failures never crash the engine.

use crate::domain::types::{EnterOutcome, ExitOutcome, LocationUpdate, ZoneAction};
use crate::services::engine::OccupancyEngine;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Update listener configuration
#[derive(Debug, Clone)]
pub struct UpdateListenerConfig {
    pub port: u16,
    pub enabled: bool,
}

impl Default for UpdateListenerConfig {
    fn default() -> Self {
        Self { port: 4680, enabled: true }
    }
}

/// Response line written back for every request line
#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub ok: bool,
    /// Outcome: entered, already_present, exited, not_present, error
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_zone: Option<String>,
    /// True when this call implicitly exited a different zone
    pub auto_exited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateResponse {
    fn error(message: String) -> Self {
        Self {
            ok: false,
            result: "error".to_string(),
            current_zone: None,
            previous_zone: None,
            auto_exited: false,
            error: Some(message),
        }
    }
}

/// Apply one parsed update to the engine and describe what happened.
pub fn apply_update(engine: &OccupancyEngine, update: &LocationUpdate) -> UpdateResponse {
    match update.action {
        ZoneAction::Enter => match engine.enter(&update.user_id, &update.zone) {
            Ok(EnterOutcome { previous_zone, auto_exited, already_present }) => UpdateResponse {
                ok: true,
                result: if already_present { "already_present" } else { "entered" }.to_string(),
                current_zone: Some(update.zone.clone()),
                previous_zone,
                auto_exited,
                error: None,
            },
            Err(e) => UpdateResponse::error(e.to_string()),
        },
        ZoneAction::Exit => match engine.exit(&update.user_id, &update.zone) {
            Ok(outcome) => UpdateResponse {
                ok: true,
                result: outcome.as_str().to_string(),
                current_zone: engine.current_zone(&update.user_id),
                previous_zone: (outcome == ExitOutcome::Exited).then(|| update.zone.clone()),
                auto_exited: false,
                error: None,
            },
            Err(e) => UpdateResponse::error(e.to_string()),
        },
    }
}

/// Start the location update TCP listener
///
/// Spawns one task per connection; each request line is applied to the
/// engine synchronously and answered on the same connection.
pub async fn start_update_listener(
    config: UpdateListenerConfig,
    engine: Arc<OccupancyEngine>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        info!("update_listener_disabled");
        return Ok(());
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(port = %config.port, "update_listener_started");

    loop {
        tokio::select! {
            // Check for shutdown
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("update_listener_shutdown");
                    return Ok(());
                }
            }
            // Accept new connections
            result = listener.accept() => {
                match result {
                    Ok((socket, addr)) => {
                        let engine = engine.clone();
                        tokio::spawn(async move {
                            handle_connection(socket, addr, engine).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "update_listener_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    addr: SocketAddr,
    engine: Arc<OccupancyEngine>,
) {
    let peer = addr.to_string();
    debug!(peer = %peer, "update_connection_accepted");

    let (read_half, mut write_half) = socket.into_split();
    let reader = BufReader::new(read_half);
    let mut lines = reader.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<LocationUpdate>(line) {
            Ok(update) => apply_update(&engine, &update),
            Err(e) => {
                warn!(peer = %peer, error = %e, "update_parse_failed");
                UpdateResponse::error(format!("invalid update: {e}"))
            }
        };

        // Response structs always serialize; fall back to a fixed line if not
        let json = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"ok":false,"result":"error"}"#.to_string());
        if write_half.write_all(json.as_bytes()).await.is_err()
            || write_half.write_all(b"\n").await.is_err()
        {
            debug!(peer = %peer, "update_connection_write_failed");
            break;
        }
    }

    debug!(peer = %peer, "update_connection_closed");
}
