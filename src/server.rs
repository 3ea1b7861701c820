//! HTTP surface: the embedded viewer document at `/` and the websocket
//! endpoint at `/ws`.
//!
//! Each accepted socket runs one task that forwards broadcast frames with a
//! per-write deadline and feeds inbound text frames to the command sink. A
//! rolling read deadline, refreshed by pongs (and any other traffic),
//! reaps half-open clients.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command;
use crate::hub::Hub;
use crate::relay::FgRelay;

const VIEWER_HTML: &str = include_str!("viewer.html");

const READ_TIMEOUT: Duration = Duration::from_secs(60);
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub relay: Arc<FgRelay>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn serve_index() -> Html<&'static str> {
    Html(VIEWER_HTML)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut frames = state.hub.subscribe();
    info!(clients = state.hub.client_count(), "ws client connected");

    let mut ping = tokio::time::interval(PING_INTERVAL);
    let deadline = tokio::time::sleep(READ_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(json) => {
                    let send = socket.send(Message::Text((*json).clone()));
                    match tokio::time::timeout(state.hub.write_timeout(), send).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!(error = %e, "ws write failed, dropping client");
                            break;
                        }
                        Err(_) => {
                            warn!("ws write deadline exceeded, dropping client");
                            break;
                        }
                    }
                }
                // The hub outpaced this client; it resumes at the newest frame.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "ws client lagged behind broadcast");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ping.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            _ = &mut deadline => {
                warn!("ws read deadline exceeded, dropping client");
                break;
            }
            msg = socket.recv() => match msg {
                None | Some(Ok(Message::Close(_))) => break,
                Some(Ok(Message::Pong(_))) => {
                    deadline.as_mut().reset(Instant::now() + READ_TIMEOUT);
                }
                Some(Ok(Message::Text(text))) => {
                    deadline.as_mut().reset(Instant::now() + READ_TIMEOUT);
                    command::handle_frame(&text, state.hub.trigger(), &state.hub, &state.relay);
                }
                Some(Ok(Message::Ping(data))) => {
                    deadline.as_mut().reset(Instant::now() + READ_TIMEOUT);
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(_))) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "ws read failed, dropping client");
                    break;
                }
            }
        }
    }

    info!(clients = state.hub.client_count().saturating_sub(1), "ws client disconnected");
}
