pub mod arrival;
pub mod resolver;

use std::sync::Arc;

use crate::fanout::{Channel, FanoutHub, TrackingEvent};
use crate::models::{PositionReport, VehicleState};
use crate::store::{StoreError, VehicleStateStore};

use arrival::{ArrivalDetector, ArrivalEvent};
use resolver::{ProximityResolver, Resolution};

/// The ingestion pipeline: persist the report synchronously, then
/// enrich and fan out in a detached task. The device gets its
/// accept/reject acknowledgment from `ingest` alone; everything after
/// that is best-effort.
pub struct Tracker {
    store: Arc<VehicleStateStore>,
    resolver: Arc<ProximityResolver>,
    detector: Arc<ArrivalDetector>,
    hub: Arc<FanoutHub>,
}

impl Tracker {
    pub fn new(
        store: Arc<VehicleStateStore>,
        resolver: Arc<ProximityResolver>,
        detector: Arc<ArrivalDetector>,
        hub: Arc<FanoutHub>,
    ) -> Self {
        Self {
            store,
            resolver,
            detector,
            hub,
        }
    }

    /// Handle an inbound position report. Returns the stored state once
    /// the update is applied (or a validation error), without waiting
    /// for enrichment. A newer report does not cancel an in-flight
    /// enrichment task for the same vehicle; a slightly stale ETA is
    /// acceptable since the position itself was persisted in order.
    pub async fn ingest(self: &Arc<Self>, report: PositionReport) -> Result<VehicleState, StoreError> {
        let state = self.store.update(&report).await?;

        let tracker = self.clone();
        let snapshot = state.clone();
        tokio::spawn(async move {
            tracker.enrich_and_publish(snapshot).await;
        });

        Ok(state)
    }

    /// Resolve next-waypoint distance/ETA, run arrival detection, and
    /// publish the resulting events. Provider failures degrade the
    /// payload instead of aborting.
    async fn enrich_and_publish(&self, state: VehicleState) {
        let mut distance_meters = None;
        let mut eta_seconds = None;
        let mut next_waypoint = None;
        let mut arrival: Option<ArrivalEvent> = None;

        match self.resolver.resolve_next(&state).await {
            Ok(Resolution::Target {
                waypoint_key,
                distance_meters: distance,
                eta_seconds: eta,
            }) => {
                distance_meters = Some(distance);
                eta_seconds = Some(eta);
                next_waypoint = Some(waypoint_key);
                arrival = self.detector.check(&state, distance).await;
            }
            Ok(Resolution::NoRoute) => {
                tracing::debug!(vehicle = %state.key, "No route to resolve");
            }
            Err(e) => {
                tracing::warn!(
                    vehicle = %state.key,
                    error = %e,
                    "Enrichment unavailable, publishing bare position update"
                );
            }
        }

        let position_update = TrackingEvent::PositionUpdate {
            vehicle_key: state.key.clone(),
            position: state.position,
            speed: state.speed,
            heading: state.heading,
            status: state.status,
            timestamp: state.last_update,
            distance_meters,
            eta_seconds,
            next_waypoint,
        };
        self.hub
            .publish_many(
                &[
                    Channel::Vehicle {
                        key: state.key.clone(),
                    },
                    Channel::All,
                ],
                position_update,
            )
            .await;

        if let Some(arrival) = arrival {
            let channels = arrival_channels(&state, &arrival);
            let event = TrackingEvent::Arrival {
                vehicle_key: arrival.vehicle_key,
                waypoint_key: arrival.waypoint_key,
                waypoint_name: arrival.waypoint_name,
                estimated_arrival_time: arrival.estimated_arrival_time,
            };
            self.hub.publish_many(&channels, event).await;
        }
    }

    pub fn store(&self) -> &Arc<VehicleStateStore> {
        &self.store
    }
}

/// An arrival goes to the vehicle's own channel, the stop's channel,
/// the route topic (when assigned) and the global broadcast
fn arrival_channels(state: &VehicleState, arrival: &ArrivalEvent) -> Vec<Channel> {
    let mut channels = vec![
        Channel::Vehicle {
            key: state.key.clone(),
        },
        Channel::Stop {
            key: arrival.waypoint_key.clone(),
        },
    ];
    if let Some(route_key) = &state.route_key {
        channels.push(Channel::Route {
            key: route_key.clone(),
        });
    }
    channels.push(Channel::All);
    channels
}
