//! # WebSocket subscriber connection.
//!
//! ```text
//! upgrade (503 if the hub stopped) ─► socket open ─► hub.register() ─► split socket
//!              ├─ writer task: subscription.recv() ─► frame ─► send (write_timeout)
//!              │               ping every ping_interval
//!              │               buffer closed ─► Close frame, exit
//!              └─ reader:      discard inbound frames; exit on close, error,
//!                              or pong_timeout of silence
//! first to finish ─► hub.unregister(id) ─► writer drains and exits
//! ```
//!
//! The subscriber is registered only once the socket exists, so an upgrade
//! that never completes leaves nothing behind in the hub.
//!
//! Text frames carry UTF-8 payloads; anything else goes out as binary.

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::time::{self, Instant};
use tracing::debug;

use super::{AppState, WsTimers};
use crate::core::Subscription;
use crate::error::HubError;

pub(super) async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.hub.is_stopped() {
        return (StatusCode::SERVICE_UNAVAILABLE, HubError::Stopped.to_string()).into_response();
    }
    ws.on_failed_upgrade(|e: axum::Error| debug!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| connection(socket, state))
}

async fn connection(mut socket: WebSocket, state: AppState) {
    let subscription = match state.hub.register().await {
        Ok(s) => s,
        Err(e) => {
            // Hub stopped between the upgrade and registration.
            let close = Message::Close(Some(CloseFrame {
                code: close_code::AWAY,
                reason: Utf8Bytes::from_static("hub stopped"),
            }));
            let _ = time::timeout(state.timers.write_timeout, socket.send(close)).await;
            debug!(error = %e, "websocket refused");
            return;
        }
    };
    let id = subscription.id();
    debug!(subscriber = %id, "websocket connected");

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, subscription, state.timers));

    let ended_by = tokio::select! {
        _ = &mut writer => "buffer closed",
        reason = read_loop(stream, state.timers) => reason,
    };

    let _ = state.hub.unregister(id).await;
    if !writer.is_finished() {
        // Unregistering closes the buffer, so the writer sends Close and exits.
        if time::timeout(state.timers.write_timeout, &mut writer).await.is_err() {
            writer.abort();
        }
    }
    debug!(subscriber = %id, reason = ended_by, "websocket disconnected");
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut subscription: Subscription,
    timers: WsTimers,
) {
    let id = subscription.id();
    let mut ping = time::interval_at(Instant::now() + timers.ping_interval, timers.ping_interval);

    loop {
        let frame = tokio::select! {
            payload = subscription.recv() => match payload {
                Some(p) => frame(p),
                None => {
                    let close = Message::Close(Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: Utf8Bytes::from_static("subscription closed"),
                    }));
                    let _ = time::timeout(timers.write_timeout, sink.send(close)).await;
                    return;
                }
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        match time::timeout(timers.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(subscriber = %id, error = %e, "websocket write failed");
                return;
            }
            Err(_) => {
                debug!(subscriber = %id, "websocket write timed out");
                return;
            }
        }
    }
}

async fn read_loop(mut stream: SplitStream<WebSocket>, timers: WsTimers) -> &'static str {
    loop {
        match time::timeout(timers.pong_timeout, stream.next()).await {
            Err(_) => return "pong timeout",
            Ok(None) => return "disconnected",
            Ok(Some(Err(_))) => return "read error",
            Ok(Some(Ok(Message::Close(_)))) => return "closed by peer",
            Ok(Some(Ok(_))) => {}
        }
    }
}

fn frame(payload: Bytes) -> Message {
    match std::str::from_utf8(&payload) {
        Ok(text) => Message::Text(text.into()),
        Err(_) => Message::Binary(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_payloads_become_text_frames() {
        assert!(matches!(frame(Bytes::from_static(b"hello")), Message::Text(t) if t.as_str() == "hello"));
        assert!(matches!(frame(Bytes::from_static(&[0xff, 0x00])), Message::Binary(_)));
    }
}
