pub mod reports;
pub mod vehicles;
pub mod waypoints;
pub mod ws;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::fanout::FanoutHub;
use crate::store::{Network, VehicleStateStore};
use crate::tracker::Tracker;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Tracker>,
    pub store: Arc<VehicleStateStore>,
    pub network: Arc<Network>,
    pub hub: Arc<FanoutHub>,
    pub diagnostics: ws::DiagnosticsState,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/reports", post(reports::submit_report))
        .route("/vehicles", get(vehicles::list_vehicles))
        .route("/vehicles/near", post(vehicles::find_vehicles_near))
        .route("/vehicles/{key}", get(vehicles::get_vehicle))
        .route("/waypoints", get(waypoints::list_waypoints))
        .route("/ws", get(ws::ws_subscribe))
        .route("/ws/diagnostics", get(ws::ws_routing_diagnostics))
        .with_state(state)
}
