//! WebSocket handler
//!
//! One task per socket: registers the connection, delivers `open` before the
//! first frame is read, frames traffic in both directions and delivers exactly
//! one terminal event.

use crate::connection::{Connection, GateEvent, Outbound};
use crate::protocol::{parse_frame, ParsedFrame};
use crate::server::GatewayState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use gate_common::metrics::{
    CONNECTIONS_TOTAL, CONNECTION_ERRORS_TOTAL, DISCONNECTIONS_TOTAL, PARSE_ERRORS_TOTAL,
};
use std::net::SocketAddr;

/// How the socket ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketEnd {
    /// Peer closed, stream ended, or the connection was terminated
    Closed,
    /// Socket-level error
    Failed,
}

impl SocketEnd {
    /// `reason` label of the disconnection counter
    fn reason(self) -> &'static str {
        match self {
            Self::Closed => "close",
            Self::Failed => "error",
        }
    }
}

/// WebSocket gateway handler
pub async fn gateway_handler(
    State(state): State<GatewayState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let client_ip = client_address(peer, &headers);

    ws.max_message_size(state.max_message_bytes())
        .on_upgrade(move |socket| handle_socket(state, socket, client_ip))
}

/// Peer address, suffixed with the first `X-Forwarded-For` hop when present
pub(crate) fn client_address(peer: SocketAddr, headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match forwarded {
        Some(forwarded) => format!("{}<= {forwarded}", peer.ip()),
        None => peer.ip().to_string(),
    }
}

/// Handle an upgraded WebSocket connection
async fn handle_socket(state: GatewayState, socket: WebSocket, client_ip: String) {
    let (connection, mut rx) = state.connection_manager().add_connection(client_ip);
    let channel_id = connection.channel_id();

    metrics::counter!(CONNECTIONS_TOTAL).increment(1);
    tracing::info!(
        channel_id = %channel_id,
        client_ip = %connection.client_ip(),
        "Gate connection open"
    );

    // Delivered before any frame is read
    state.emit(&connection, GateEvent::Open);

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Receive task
    let state_recv = state.clone();
    let connection_recv = connection.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = ws_stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(
                        channel_id = %connection_recv.channel_id(),
                        error = %e,
                        "Gate client error"
                    );
                    return SocketEnd::Failed;
                }
            };

            connection_recv.mark_alive();

            match frame {
                Message::Text(text) => handle_text(&state_recv, &connection_recv, &text),
                Message::Binary(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    handle_text(&state_recv, &connection_recv, &text);
                }
                Message::Ping(_) | Message::Pong(_) => {
                    tracing::trace!(channel_id = %connection_recv.channel_id(), "Control frame");
                }
                Message::Close(_) => return SocketEnd::Closed,
            }
        }
        SocketEnd::Closed
    });

    // Send task
    let send_channel = channel_id;
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let frame = match outbound {
                Outbound::Text(text) => Message::Text(text.into()),
                Outbound::Ping => Message::Ping(Vec::new().into()),
            };

            if let Err(e) = ws_sink.send(frame).await {
                tracing::debug!(channel_id = %send_channel, error = %e, "Socket write failed");
                return SocketEnd::Failed;
            }
        }

        let _ = ws_sink.close().await;
        SocketEnd::Closed
    });

    let end = tokio::select! {
        result = &mut recv_task => result.unwrap_or(SocketEnd::Failed),
        result = &mut send_task => result.unwrap_or(SocketEnd::Failed),
        () = connection.terminated() => {
            tracing::debug!(channel_id = %channel_id, "Connection terminated");
            SocketEnd::Closed
        }
    };

    // Dropping both halves closes the socket
    recv_task.abort();
    send_task.abort();

    cleanup_connection(&state, &connection, end);
}

/// Parse one text frame and hand it to the event handler
fn handle_text(state: &GatewayState, connection: &Connection, text: &str) {
    match parse_frame(text) {
        ParsedFrame::Request(request) => {
            tracing::trace!(
                channel_id = %connection.channel_id(),
                method = %request.method,
                "Received request"
            );
            state.emit(connection, GateEvent::Message(request));
        }
        ParsedFrame::Malformed { id, reason } => {
            metrics::counter!(PARSE_ERRORS_TOTAL).increment(1);
            tracing::debug!(
                channel_id = %connection.channel_id(),
                reason = %reason,
                "Malformed frame"
            );
            state.emit(connection, GateEvent::Malformed { id, reason });
        }
        ParsedFrame::MissingId => {
            metrics::counter!(PARSE_ERRORS_TOTAL).increment(1);
            tracing::debug!(channel_id = %connection.channel_id(), "Request without id dropped");
        }
    }
}

/// Deliver the terminal event once and release the connection
fn cleanup_connection(state: &GatewayState, connection: &Connection, end: SocketEnd) {
    let channel_id = connection.channel_id();

    if connection.begin_close() {
        let event = match end {
            SocketEnd::Closed => GateEvent::Close,
            SocketEnd::Failed => {
                metrics::counter!(CONNECTION_ERRORS_TOTAL).increment(1);
                GateEvent::Error
            }
        };
        state.emit(connection, event);
    }

    state.connection_manager().remove_connection(channel_id);
    record_disconnection(end);

    tracing::info!(
        channel_id = %channel_id,
        client_ip = %connection.client_ip(),
        age_ms = connection.age().as_millis() as u64,
        "Gate connection close"
    );
}

fn record_disconnection(end: SocketEnd) {
    metrics::counter!(DISCONNECTIONS_TOTAL, "reason" => end.reason()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "192.168.1.20:50000".parse().unwrap()
    }

    #[test]
    fn test_client_address_plain() {
        assert_eq!(client_address(peer(), &HeaderMap::new()), "192.168.1.20");
    }

    #[test]
    fn test_client_address_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7 , 10.0.0.1"),
        );
        assert_eq!(client_address(peer(), &headers), "192.168.1.20<= 203.0.113.7");
    }

    #[test]
    fn test_socket_end_reason_labels() {
        assert_eq!(SocketEnd::Closed.reason(), "close");
        assert_eq!(SocketEnd::Failed.reason(), "error");
    }

    #[test]
    fn test_disconnection_counter_carries_reason() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_disconnection(SocketEnd::Closed);
            record_disconnection(SocketEnd::Failed);
            record_disconnection(SocketEnd::Failed);
        });

        let output = handle.render();
        assert!(output.contains(r#"gate_disconnections_total{reason="close"} 1"#), "{output}");
        assert!(output.contains(r#"gate_disconnections_total{reason="error"} 2"#), "{output}");
    }

    #[test]
    fn test_client_address_empty_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        assert_eq!(client_address(peer(), &headers), "192.168.1.20");
    }
}
