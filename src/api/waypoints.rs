use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use super::AppState;
use crate::models::Waypoint;

#[derive(Debug, Serialize, ToSchema)]
pub struct WaypointListResponse {
    pub waypoints: Vec<Waypoint>,
    pub count: usize,
}

/// List the configured waypoints of the network
#[utoipa::path(
    get,
    path = "/api/waypoints",
    responses(
        (status = 200, description = "All configured waypoints", body = WaypointListResponse)
    ),
    tag = "waypoints"
)]
pub async fn list_waypoints(State(state): State<AppState>) -> Json<WaypointListResponse> {
    let mut waypoints: Vec<Waypoint> = state.network.waypoints().cloned().collect();
    waypoints.sort_by(|a, b| a.key.cmp(&b.key));
    let count = waypoints.len();
    Json(WaypointListResponse { waypoints, count })
}
