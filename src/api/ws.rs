use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, RwLock};

use super::AppState;
use crate::fanout::{Channel, SubscriberHandle, TrackingEvent};
use crate::providers::RoutingRequestSender;

/// Client subscription message
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ClientMessage {
    /// Attach to a channel
    Subscribe { channel: Channel },
    /// Detach from a channel
    Unsubscribe { channel: Channel },
}

/// Server message sent to clients
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ServerMessage {
    /// Initial connection acknowledgment
    Connected {
        subscriber_id: String,
        message: String,
    },
    /// Subscription acknowledgment
    Subscribed { channel: Channel },
    /// Unsubscription acknowledgment
    Unsubscribed { channel: Channel },
    /// A tracking event from one of the subscribed channels
    Event { event: TrackingEvent },
    /// Error message
    Error { message: String },
}

/// WebSocket endpoint for channel subscriptions
pub async fn ws_subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (handle, mut event_rx) = SubscriberHandle::new();
    let subscriber_id = handle.id;

    // Send connected message
    let connected = ServerMessage::Connected {
        subscriber_id: subscriber_id.to_string(),
        message: "Connected. Send subscribe messages naming a channel.".to_string(),
    };
    if let Ok(json) = serde_json::to_string(&connected) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    // Channel to communicate client commands from the receiver task to
    // the sender task
    let (control_tx, mut control_rx) =
        tokio::sync::mpsc::channel::<Result<ClientMessage, String>>(16);

    let hub = state.hub.clone();
    let control_handle = handle.clone();

    // Spawn task that applies subscriptions and forwards events
    let forward_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(command) = control_rx.recv() => {
                    let ack = match command {
                        Ok(ClientMessage::Subscribe { channel }) => {
                            hub.subscribe(channel.clone(), control_handle.clone()).await;
                            tracing::debug!(subscriber = %subscriber_id, channel = ?channel, "Subscribed");
                            ServerMessage::Subscribed { channel }
                        }
                        Ok(ClientMessage::Unsubscribe { channel }) => {
                            hub.unsubscribe(&channel, &subscriber_id).await;
                            ServerMessage::Unsubscribed { channel }
                        }
                        Err(message) => ServerMessage::Error { message },
                    };
                    if let Ok(json) = serde_json::to_string(&ack) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                event = event_rx.recv() => {
                    match event {
                        Some(event) => {
                            let msg = ServerMessage::Event { event };
                            if let Ok(json) = serde_json::to_string(&msg) {
                                if sender.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    // Handle incoming messages from client
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let command = serde_json::from_str::<ClientMessage>(&text)
                    .map_err(|e| format!("Invalid message: {}", e));
                let _ = control_tx.send(command).await;
            }
            Ok(Message::Ping(_)) => {
                // Axum handles pong automatically
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Cleanup: detach from every channel on disconnect
    forward_task.abort();
    state.hub.drop_subscriber(&subscriber_id).await;
}

// ============================================================================
// Routing Provider Diagnostics WebSocket
// ============================================================================

/// Rolling window for tracking routing request statistics
struct RequestStats {
    /// Timestamps, durations and error flags of requests in the last 60 seconds
    recent_requests: VecDeque<(Instant, u64, bool)>,
}

impl RequestStats {
    fn new() -> Self {
        Self {
            recent_requests: VecDeque::new(),
        }
    }

    fn record(&mut self, duration_ms: u64, is_error: bool) {
        self.recent_requests
            .push_back((Instant::now(), duration_ms, is_error));
        self.cleanup();
    }

    fn cleanup(&mut self) {
        let cutoff = Instant::now() - std::time::Duration::from_secs(60);
        while let Some((ts, _, _)) = self.recent_requests.front() {
            if *ts < cutoff {
                self.recent_requests.pop_front();
            } else {
                break;
            }
        }
    }

    fn get_stats(&mut self) -> (u32, f64, u32) {
        self.cleanup();

        let total = self.recent_requests.len() as u32;
        let errors = self.recent_requests.iter().filter(|(_, _, e)| *e).count() as u32;

        let avg_latency = if total > 0 {
            let sum: u64 = self.recent_requests.iter().map(|(_, d, _)| *d).sum();
            sum as f64 / total as f64
        } else {
            0.0
        };

        (total, avg_latency, errors)
    }
}

/// State for the routing diagnostics WebSocket
#[derive(Clone)]
pub struct DiagnosticsState {
    stats: Arc<RwLock<RequestStats>>,
}

impl DiagnosticsState {
    pub fn new(routing_requests_tx: RoutingRequestSender) -> Self {
        let stats = Arc::new(RwLock::new(RequestStats::new()));

        // Collect statistics from routing request logs
        let stats_clone = stats.clone();
        let mut rx = routing_requests_tx.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(log) => {
                        let mut stats = stats_clone.write().await;
                        stats.record(log.duration_ms, log.error.is_some());
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });

        Self { stats }
    }
}

/// Routing provider statistics
#[derive(Debug, Serialize)]
struct RoutingStats {
    /// Requests in the last 60 seconds
    requests_per_minute: u32,
    /// Average latency in milliseconds
    avg_latency_ms: f64,
    /// Number of errors in the last 60 seconds
    errors_per_minute: u32,
}

/// Server message for routing diagnostics
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum DiagnosticsServerMessage {
    /// Periodic statistics update
    Stats { routing: RoutingStats },
}

/// WebSocket endpoint for routing provider diagnostics
pub async fn ws_routing_diagnostics(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_diagnostics_socket(socket, state.diagnostics))
}

async fn handle_diagnostics_socket(socket: WebSocket, state: DiagnosticsState) {
    let (mut sender, mut receiver) = socket.split();

    // Send stats every second
    let stats = state.stats.clone();
    let forward_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));

        loop {
            interval.tick().await;

            let (requests_per_minute, avg_latency_ms, errors_per_minute) = {
                let mut stats = stats.write().await;
                stats.get_stats()
            };

            let msg = DiagnosticsServerMessage::Stats {
                routing: RoutingStats {
                    requests_per_minute,
                    avg_latency_ms,
                    errors_per_minute,
                },
            };

            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle incoming messages (just wait for close)
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Ping(_)) => {
                // Axum handles pong automatically
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    forward_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_channel_scopes() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","channel":{"scope":"vehicle","key":"bus-001"}}"#)
                .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Subscribe {
                channel: Channel::Vehicle { .. }
            }
        ));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"unsubscribe","channel":{"scope":"all"}}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Unsubscribe {
                channel: Channel::All
            }
        ));
    }

    #[test]
    fn request_stats_aggregates_window() {
        let mut stats = RequestStats::new();
        stats.record(100, false);
        stats.record(300, true);

        let (total, avg_latency, errors) = stats.get_stats();
        assert_eq!(total, 2);
        assert_eq!(avg_latency, 200.0);
        assert_eq!(errors, 1);
    }

    #[test]
    fn request_stats_drops_entries_older_than_window() {
        let mut stats = RequestStats::new();
        if let Some(old) = Instant::now().checked_sub(std::time::Duration::from_secs(61)) {
            stats.recent_requests.push_back((old, 500, false));
        }
        stats.record(100, false);

        let (total, _, _) = stats.get_stats();
        assert_eq!(total, 1);
    }
}
