//! WebSocket handler for live workflow updates.
//!
//! Streams `workflow_version_updated` and `notification_created` events to
//! connected clients, with ping/pong keep-alive.

use actix_web::{HttpRequest, HttpResponse, web};
use actix_ws::Message;
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::models::WsEventMessage;
use crate::services::EventBroadcaster;

/// Ping interval for keeping connections alive.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for receiving pong response.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Upgrades the HTTP connection and starts forwarding events.
pub async fn websocket_handler(
    req: HttpRequest,
    stream: web::Payload,
    broadcaster: web::Data<EventBroadcaster>,
) -> Result<HttpResponse, actix_web::Error> {
    let client_addr = req
        .connection_info()
        .realip_remote_addr()
        .map(String::from)
        .unwrap_or_else(|| "unknown".to_string());

    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;
    info!(client = %client_addr, "WebSocket connection established");

    actix_web::rt::spawn(handle_websocket_connection(
        session,
        msg_stream,
        broadcaster.get_ref().clone(),
        client_addr,
    ));

    Ok(response)
}

/// What the connection loop should do next.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Forward one broadcast result to the client.
async fn forward_event(
    session: &mut actix_ws::Session,
    event: Result<WsEventMessage, RecvError>,
    client_addr: &str,
) -> Flow {
    match event {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => {
                if session.text(json).await.is_err() {
                    warn!(client = %client_addr, "Failed to send event, closing connection");
                    Flow::Close
                } else {
                    Flow::Continue
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to serialize event");
                Flow::Continue
            }
        },
        Err(RecvError::Lagged(count)) => {
            warn!(client = %client_addr, missed = count, "Client lagged, missed events");
            Flow::Continue
        }
        Err(RecvError::Closed) => {
            info!(client = %client_addr, "Broadcast channel closed");
            Flow::Close
        }
    }
}

/// Handle one client message.
async fn handle_client_message(
    session: &mut actix_ws::Session,
    msg: Message,
    last_pong: &mut Instant,
    client_addr: &str,
) -> Flow {
    match msg {
        Message::Ping(bytes) => {
            debug!(client = %client_addr, "Received ping");
            if session.pong(&bytes).await.is_err() {
                return Flow::Close;
            }
        }
        Message::Pong(_) => *last_pong = Instant::now(),
        Message::Text(text) => {
            debug!(client = %client_addr, message = %text, "Ignoring client message");
        }
        Message::Close(reason) => {
            info!(client = %client_addr, reason = ?reason, "Client requested close");
            return Flow::Close;
        }
        _ => {}
    }
    Flow::Continue
}

async fn handle_websocket_connection(
    mut session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
    broadcaster: EventBroadcaster,
    client_addr: String,
) {
    let mut rx = broadcaster.subscribe();
    let mut last_pong = Instant::now();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);

    loop {
        let flow = tokio::select! {
            Some(msg_result) = msg_stream.next() => match msg_result {
                Ok(msg) => handle_client_message(&mut session, msg, &mut last_pong, &client_addr).await,
                Err(e) => {
                    warn!(client = %client_addr, error = %e, "WebSocket message error");
                    Flow::Close
                }
            },
            event = rx.recv() => forward_event(&mut session, event, &client_addr).await,
            _ = ping_interval.tick() => {
                if last_pong.elapsed() > PING_INTERVAL + PONG_TIMEOUT {
                    warn!(client = %client_addr, "Pong timeout, closing connection");
                    Flow::Close
                } else if session.ping(b"").await.is_err() {
                    warn!(client = %client_addr, "Failed to send ping, closing connection");
                    Flow::Close
                } else {
                    Flow::Continue
                }
            }
        };
        if let Flow::Close = flow {
            break;
        }
    }

    let _ = session.close(None).await;
    info!(client = %client_addr, "WebSocket connection closed");
}

/// Configure WebSocket routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws").route(web::get().to(websocket_handler)));
}
