use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Position, VehicleStatus};

/// A subscription scope. Channels exist only while they have
/// subscribers; nothing about them is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Channel {
    /// Events for a single vehicle
    Vehicle { key: String },
    /// Events for every vehicle on a route
    Route { key: String },
    /// Arrival events at a stop
    Stop { key: String },
    /// Everything
    All,
}

/// Event delivered to subscribers
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingEvent {
    PositionUpdate {
        vehicle_key: String,
        position: Position,
        speed: f64,
        heading: f64,
        status: VehicleStatus,
        timestamp: DateTime<Utc>,
        /// Driving distance to the next waypoint, when enrichment succeeded
        #[serde(skip_serializing_if = "Option::is_none")]
        distance_meters: Option<f64>,
        /// Travel time to the next waypoint, when enrichment succeeded
        #[serde(skip_serializing_if = "Option::is_none")]
        eta_seconds: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        next_waypoint: Option<String>,
    },
    Arrival {
        vehicle_key: String,
        waypoint_key: String,
        waypoint_name: String,
        /// Absent when the vehicle reported zero speed
        estimated_arrival_time: Option<DateTime<Utc>>,
    },
}

pub type SubscriberId = Uuid;

/// Sending side of a subscriber connection. One handle may be attached
/// to any number of channels.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    pub id: SubscriberId,
    tx: mpsc::UnboundedSender<TrackingEvent>,
}

impl SubscriberHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TrackingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    /// Returns false once the receiving side has gone away
    fn send(&self, event: TrackingEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Topic-based event distribution. Delivery is fire-and-forget: a
/// subscriber whose receiver is gone is skipped and pruned, and never
/// blocks or fails delivery to others. Created once at service start
/// and passed explicitly to the components that publish.
pub struct FanoutHub {
    channels: RwLock<HashMap<Channel, HashMap<SubscriberId, SubscriberHandle>>>,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a handle to a channel, creating the channel lazily
    pub async fn subscribe(&self, channel: Channel, handle: SubscriberHandle) {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel)
            .or_default()
            .insert(handle.id, handle);
    }

    /// Detach a handle from one channel. Empty channels are dropped.
    pub async fn unsubscribe(&self, channel: &Channel, id: &SubscriberId) {
        let mut channels = self.channels.write().await;
        if let Some(subscribers) = channels.get_mut(channel) {
            subscribers.remove(id);
            if subscribers.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Detach a handle from every channel it belongs to (disconnect)
    pub async fn drop_subscriber(&self, id: &SubscriberId) {
        let mut channels = self.channels.write().await;
        for subscribers in channels.values_mut() {
            subscribers.remove(id);
        }
        channels.retain(|_, subscribers| !subscribers.is_empty());
    }

    /// Deliver an event to all current subscribers of a channel.
    /// Returns once delivery to each live subscriber was attempted.
    pub async fn publish(&self, channel: &Channel, event: TrackingEvent) {
        self.publish_many(std::slice::from_ref(channel), event).await;
    }

    /// Deliver one event to all subscribers of each listed channel
    pub async fn publish_many(&self, targets: &[Channel], event: TrackingEvent) {
        let recipients: Vec<SubscriberHandle> = {
            let channels = self.channels.read().await;
            targets
                .iter()
                .filter_map(|c| channels.get(c))
                .flat_map(|subscribers| subscribers.values().cloned())
                .collect()
        };

        let mut dead: Vec<SubscriberId> = Vec::new();
        for handle in recipients {
            if !handle.send(event.clone()) {
                dead.push(handle.id);
            }
        }

        for id in dead {
            tracing::debug!(subscriber = %id, "Pruning unreachable subscriber");
            self.drop_subscriber(&id).await;
        }
    }

    /// Number of live channels (diagnostics)
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Teardown: drop every subscription, closing all receivers
    pub async fn close_all(&self) {
        self.channels.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_event(key: &str) -> TrackingEvent {
        TrackingEvent::PositionUpdate {
            vehicle_key: key.to_string(),
            position: Position::new(9.0222, 38.7465),
            speed: 8.0,
            heading: 45.0,
            status: VehicleStatus::Active,
            timestamp: Utc::now(),
            distance_meters: None,
            eta_seconds: None,
            next_waypoint: None,
        }
    }

    fn vehicle_channel(key: &str) -> Channel {
        Channel::Vehicle {
            key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let hub = FanoutHub::new();
        let (handle, mut rx) = SubscriberHandle::new();
        hub.subscribe(vehicle_channel("bus-001"), handle).await;

        hub.publish(&vehicle_channel("bus-001"), position_event("bus-001"))
            .await;

        let event = rx.try_recv().unwrap();
        assert!(matches!(event, TrackingEvent::PositionUpdate { .. }));
    }

    #[tokio::test]
    async fn events_are_scoped_to_their_channel() {
        let hub = FanoutHub::new();
        let (handle, mut rx) = SubscriberHandle::new();
        hub.subscribe(vehicle_channel("bus-001"), handle).await;

        hub.publish(&vehicle_channel("bus-002"), position_event("bus-002"))
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribed_handle_receives_nothing_further() {
        let hub = FanoutHub::new();
        let (handle, mut rx) = SubscriberHandle::new();
        let id = handle.id;
        hub.subscribe(vehicle_channel("bus-001"), handle).await;

        hub.publish(&vehicle_channel("bus-001"), position_event("bus-001"))
            .await;
        assert!(rx.try_recv().is_ok());

        hub.unsubscribe(&vehicle_channel("bus-001"), &id).await;
        hub.publish(&vehicle_channel("bus-001"), position_event("bus-001"))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_channels_are_garbage_collected() {
        let hub = FanoutHub::new();
        let (handle, _rx) = SubscriberHandle::new();
        let id = handle.id;
        hub.subscribe(vehicle_channel("bus-001"), handle).await;
        assert_eq!(hub.channel_count().await, 1);

        hub.unsubscribe(&vehicle_channel("bus-001"), &id).await;
        assert_eq!(hub.channel_count().await, 0);
    }

    #[tokio::test]
    async fn dead_subscriber_does_not_block_others() {
        let hub = FanoutHub::new();

        let (dead_handle, dead_rx) = SubscriberHandle::new();
        drop(dead_rx);
        let (live_handle, mut live_rx) = SubscriberHandle::new();

        hub.subscribe(vehicle_channel("bus-001"), dead_handle).await;
        hub.subscribe(vehicle_channel("bus-001"), live_handle).await;

        hub.publish(&vehicle_channel("bus-001"), position_event("bus-001"))
            .await;

        assert!(live_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn publish_many_reaches_each_listed_channel() {
        let hub = FanoutHub::new();
        let (vehicle_sub, mut vehicle_rx) = SubscriberHandle::new();
        let (stop_sub, mut stop_rx) = SubscriberHandle::new();
        let (all_sub, mut all_rx) = SubscriberHandle::new();

        hub.subscribe(vehicle_channel("bus-001"), vehicle_sub).await;
        hub.subscribe(
            Channel::Stop {
                key: "bole".to_string(),
            },
            stop_sub,
        )
        .await;
        hub.subscribe(Channel::All, all_sub).await;

        let event = TrackingEvent::Arrival {
            vehicle_key: "bus-001".to_string(),
            waypoint_key: "bole".to_string(),
            waypoint_name: "Bole".to_string(),
            estimated_arrival_time: None,
        };
        hub.publish_many(
            &[
                vehicle_channel("bus-001"),
                Channel::Stop {
                    key: "bole".to_string(),
                },
                Channel::All,
            ],
            event,
        )
        .await;

        assert!(vehicle_rx.try_recv().is_ok());
        assert!(stop_rx.try_recv().is_ok());
        assert!(all_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn drop_subscriber_detaches_from_every_channel() {
        let hub = FanoutHub::new();
        let (handle, mut rx) = SubscriberHandle::new();
        let id = handle.id;
        hub.subscribe(vehicle_channel("bus-001"), handle.clone()).await;
        hub.subscribe(Channel::All, handle).await;

        hub.drop_subscriber(&id).await;
        assert_eq!(hub.channel_count().await, 0);

        hub.publish(&Channel::All, position_event("bus-001")).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_json_shape_is_stable() {
        let channel = Channel::Stop {
            key: "bole".to_string(),
        };
        let json = serde_json::to_string(&channel).unwrap();
        assert_eq!(json, r#"{"scope":"stop","key":"bole"}"#);

        let parsed: Channel = serde_json::from_str(r#"{"scope":"all"}"#).unwrap();
        assert_eq!(parsed, Channel::All);
    }
}
