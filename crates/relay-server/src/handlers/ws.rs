//! WebSocket transport
//!
//! One actor per connection: a reader loop that dispatches inbound events to
//! the hub, a writer task that drains the connection's outbound queue, and a
//! heartbeat task that drops peers which stop answering pings.

use crate::chat::ConnectionHandle;
use crate::config::AppState;
use crate::ctx::Ctx;
use crate::models::UserId;
use crate::protocol::{self, ServerEvent};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};

/// GET /ws
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ctx: Ctx,
    ws: WebSocketUpgrade,
) -> Response {
    info!(user_id = %ctx.user_id(), "WebSocket connection accepted");
    ws.on_upgrade(move |socket| run_connection(socket, state, ctx.into_user_id()))
}

/// Drive one connection until the client goes away, then unregister it.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: UserId) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (handle, events_rx) = ConnectionHandle::channel();
    let (control_tx, control_rx) = mpsc::unbounded_channel::<Message>();

    let writer_handle = tokio::spawn(writer_task(ws_sender, events_rx, control_rx));

    state.hub.connect(&user_id, &handle).await;
    info!(user_id = %user_id, connection = %handle.id(), "WebSocket actor started");

    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    let mut heartbeat = tokio::spawn(heartbeat_task(
        control_tx.clone(),
        pong_rx,
        state.config.ping_interval,
        state.config.pong_timeout,
    ));

    loop {
        tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => match protocol::decode_client_event(&text) {
                    Ok(event) => state.hub.handle_client_event(&user_id, &handle, event).await,
                    Err(e) => {
                        debug!(user_id = %user_id, error = %e, "Malformed client event");
                        handle.send(ServerEvent::MessageError {
                            reason: format!("Malformed event: {}", e),
                        });
                    }
                },
                Some(Ok(Message::Pong(_))) => {
                    let _ = pong_tx.send(());
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(user_id = %user_id, reason = ?frame, "Client initiated close");
                    break;
                }
                Some(Ok(_)) => {
                    // Binary frames are not part of the protocol; pings are answered by the socket
                }
                Some(Err(e)) => {
                    warn!(user_id = %user_id, error = %e, "WebSocket receive error");
                    break;
                }
                None => {
                    info!(user_id = %user_id, "WebSocket stream ended");
                    break;
                }
            },
            _ = &mut heartbeat => {
                warn!(user_id = %user_id, "Heartbeat lost, dropping connection");
                break;
            }
        }
    }

    heartbeat.abort();
    writer_handle.abort();

    state.hub.disconnect(&handle).await;
    info!(user_id = %user_id, connection = %handle.id(), "WebSocket actor stopped");
}

/// Forward queued events and control frames to the socket
async fn writer_task(
    mut sink: SplitSink<WebSocket, Message>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    mut control: mpsc::UnboundedReceiver<Message>,
) {
    loop {
        let frame = tokio::select! {
            Some(event) = events.recv() => match protocol::encode_server_event(&event) {
                Ok(text) => Message::Text(text.into()),
                Err(e) => {
                    error!(event = event.kind(), error = %e, "Failed to encode event");
                    continue;
                }
            },
            Some(frame) = control.recv() => frame,
            else => break,
        };

        let closing = matches!(frame, Message::Close(_));
        if let Err(e) = sink.send(frame).await {
            debug!(error = %e, "WebSocket send failed, writer exiting");
            break;
        }
        if closing {
            break;
        }
    }
}

/// Returns once the peer misses a pong or the writer is gone
async fn heartbeat_task(
    control: mpsc::UnboundedSender<Message>,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    ping_interval: Duration,
    pong_timeout: Duration,
) {
    let mut ticker = interval(ping_interval);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if control.send(Message::Ping(vec![0x52].into())).is_err() {
            break;
        }

        match timeout(pong_timeout, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                let _ = control.send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: "Pong timeout".into(),
                })));
                break;
            }
        }
    }
}
