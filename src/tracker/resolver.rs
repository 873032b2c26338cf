use std::sync::Arc;

use crate::models::VehicleState;
use crate::providers::osrm::{OsrmClient, RoutingError};
use crate::store::Network;

/// Outcome of resolving a vehicle's next target. `NoRoute` is a
/// terminal state for vehicles without an assignment or past their
/// final waypoint, not an error.
#[derive(Debug, Clone)]
pub enum Resolution {
    Target {
        waypoint_key: String,
        distance_meters: f64,
        eta_seconds: f64,
    },
    NoRoute,
}

/// Resolves the next unvisited waypoint for a vehicle and enriches it
/// with driving distance and ETA from the routing provider.
pub struct ProximityResolver {
    network: Arc<Network>,
    routing: Arc<OsrmClient>,
}

/// The next target is the waypoint at the current index. Waypoints
/// already passed are never re-targeted, even if geometrically closer;
/// this is what prevents route oscillation.
fn next_waypoint_key(state: &VehicleState) -> Option<&str> {
    state
        .route_waypoints
        .get(state.current_waypoint_index)
        .map(|s| s.as_str())
}

impl ProximityResolver {
    pub fn new(network: Arc<Network>, routing: Arc<OsrmClient>) -> Self {
        Self { network, routing }
    }

    pub async fn resolve_next(&self, state: &VehicleState) -> Result<Resolution, RoutingError> {
        let target_key = match next_waypoint_key(state) {
            Some(key) => key,
            None => return Ok(Resolution::NoRoute),
        };

        let waypoint = match self.network.waypoint(target_key) {
            Some(w) => w,
            None => {
                tracing::warn!(
                    vehicle = %state.key,
                    waypoint = %target_key,
                    "Route references a waypoint missing from the network"
                );
                return Ok(Resolution::NoRoute);
            }
        };

        let (distance, eta) = tokio::join!(
            self.routing.distance(state.position, waypoint.position),
            self.routing.eta(state.position, waypoint.position),
        );

        Ok(Resolution::Target {
            waypoint_key: target_key.to_string(),
            distance_meters: distance?,
            eta_seconds: eta?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PositionReport, VehicleState};
    use chrono::Utc;

    fn state_with_route(waypoints: &[&str], index: usize) -> VehicleState {
        let report = PositionReport {
            device_key: "bus-001".to_string(),
            latitude: 9.0222,
            longitude: 38.7465,
            speed: 8.0,
            heading: 0.0,
            timestamp: Utc::now(),
            passenger_load: None,
        };
        let mut state = VehicleState::new("bus-001".to_string(), &report);
        state.route_waypoints = waypoints.iter().map(|s| s.to_string()).collect();
        state.current_waypoint_index = index;
        state
    }

    #[test]
    fn targets_the_current_index() {
        let state = state_with_route(&["a", "b", "c"], 1);
        assert_eq!(next_waypoint_key(&state), Some("b"));
    }

    #[test]
    fn never_retargets_passed_waypoints() {
        // Vehicle at index 1 must target B even though A might be nearer
        let state = state_with_route(&["a", "b", "c"], 1);
        assert_ne!(next_waypoint_key(&state), Some("a"));
    }

    #[test]
    fn no_target_past_final_waypoint() {
        let state = state_with_route(&["a", "b", "c"], 3);
        assert_eq!(next_waypoint_key(&state), None);
    }

    #[test]
    fn no_target_without_a_route() {
        let state = state_with_route(&[], 0);
        assert_eq!(next_waypoint_key(&state), None);
    }
}
