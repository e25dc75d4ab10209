//! WebSocket connection lifecycle
//! Handshake auth gate, per-connection writer task, inbound loop, and
//! disconnect cleanup

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};
use warp::Filter;

use crate::auth::token::TokenManager;
use crate::constants::WS_PATH;
use crate::core::connection::Connection;
use crate::core::event_handler::EventRouter;
use crate::core::message_types::ServerEvent;
use crate::core::server::SharedRealtimeServer;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    token: Option<String>,
}

/// Build the relay's warp routes: the WebSocket endpoint plus a health
/// check.
pub fn relay_routes(
    tokens: Arc<TokenManager>,
    server: SharedRealtimeServer,
    router: Arc<EventRouter>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let state = warp::any().map(move || (tokens.clone(), server.clone(), router.clone()));

    let ws_route = warp::path(WS_PATH)
        .and(warp::ws())
        .and(warp::query::<ConnectQuery>())
        .and(state)
        .map(
            |ws: warp::ws::Ws,
             query: ConnectQuery,
             (tokens, server, router): (
                Arc<TokenManager>,
                SharedRealtimeServer,
                Arc<EventRouter>,
            )| {
                ws.on_upgrade(move |socket| {
                    handle_ws_client(socket, query.token, tokens, server, router)
                })
            },
        );

    let health_route = warp::path("health").map(|| "OK");

    ws_route.or(health_route)
}

/// Handle a WebSocket connection from handshake to cleanup
pub async fn handle_ws_client(
    ws: WebSocket,
    token: Option<String>,
    tokens: Arc<TokenManager>,
    server: SharedRealtimeServer,
    router: Arc<EventRouter>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    // Handshake gate: no accepted token, no registration
    let auth = match tokens.authenticate(token.as_deref()) {
        Ok(auth) => auth,
        Err(e) => {
            warn!("rejected connection: {}", e);
            let reject = ServerEvent::Error {
                code: "unauthorized".to_string(),
                message: "Invalid or missing token".to_string(),
            };
            if let Ok(text) = serde_json::to_string(&reject) {
                let _ = ws_tx.send(Message::text(text)).await;
            }
            let _ = ws_tx.close().await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();

    // Forward queued events from the channel to the socket
    tokio::task::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_tx.send(message).await {
                debug!("writer task stopped: {}", e);
                break;
            }
        }
    });

    let conn = Connection::new(auth.session_id.clone(), tx.clone());
    let conn_id = server.register_connection(&auth.identity, conn);
    info!("client connected: {} ({})", auth.identity, conn_id);
    info!(
        "current connections: {}",
        server.registry().connection_count()
    );

    // Confirm registration to the client
    let connected = ServerEvent::Connected {
        identity: auth.identity.clone(),
        session_id: auth.session_id.clone(),
    };
    match serde_json::to_string(&connected) {
        Ok(text) => {
            if tx.send(Message::text(text)).is_err() {
                error!("failed to queue welcome frame for {}", auth.identity);
            }
        }
        Err(e) => error!("failed to serialize welcome frame: {}", e),
    }

    // Inbound loop: every text frame runs through the router
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(msg) => {
                if let Ok(text) = msg.to_str() {
                    router.handle(&auth.identity, &conn_id, text).await;
                }
            }
            Err(e) => {
                debug!("websocket error for {}: {}", auth.identity, e);
                break;
            }
        }
    }

    // Client disconnected
    server.disconnect(&auth.identity, &conn_id);
    info!("client disconnected: {} ({})", auth.identity, conn_id);
    info!(
        "current connections: {}",
        server.registry().connection_count()
    );
}
