use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AppState, ErrorResponse};
use crate::models::{Position, VehicleState};
use crate::store::StoreError;

#[derive(Debug, Serialize, ToSchema)]
pub struct VehicleListResponse {
    pub vehicles: Vec<VehicleState>,
    pub count: usize,
    /// Timestamp when this list was generated
    pub timestamp: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NearbyRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NearbyVehicle {
    #[serde(flatten)]
    pub state: VehicleState,
    /// Great-circle distance from the queried position in meters
    pub distance_meters: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NearbyResponse {
    /// Matching vehicles ordered by ascending distance
    pub vehicles: Vec<NearbyVehicle>,
    pub count: usize,
}

/// List all known vehicles
#[utoipa::path(
    get,
    path = "/api/vehicles",
    responses(
        (status = 200, description = "All tracked vehicles", body = VehicleListResponse)
    ),
    tag = "vehicles"
)]
pub async fn list_vehicles(State(state): State<AppState>) -> Json<VehicleListResponse> {
    let vehicles = state.store.all().await;
    let count = vehicles.len();
    Json(VehicleListResponse {
        vehicles,
        count,
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Get a single vehicle by its key
#[utoipa::path(
    get,
    path = "/api/vehicles/{key}",
    params(("key" = String, Path, description = "Vehicle key")),
    responses(
        (status = 200, description = "Current vehicle state", body = VehicleState),
        (status = 404, description = "Vehicle not found", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn get_vehicle(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<VehicleState>, (StatusCode, Json<ErrorResponse>)> {
    match state.store.get(&key).await {
        Ok(vehicle) => Ok(Json(vehicle)),
        Err(e @ StoreError::VehicleNotFound(_)) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// Find vehicles within a radius of a position
#[utoipa::path(
    post,
    path = "/api/vehicles/near",
    request_body = NearbyRequest,
    responses(
        (status = 200, description = "Vehicles within the radius, nearest first", body = NearbyResponse),
        (status = 400, description = "Invalid query coordinates", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn find_vehicles_near(
    State(state): State<AppState>,
    Json(request): Json<NearbyRequest>,
) -> Result<Json<NearbyResponse>, (StatusCode, Json<ErrorResponse>)> {
    let center = Position::new(request.latitude, request.longitude);
    if !center.is_valid() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!(
                    "Invalid coordinates: latitude {}, longitude {}",
                    request.latitude, request.longitude
                ),
            }),
        ));
    }

    let vehicles: Vec<NearbyVehicle> = state
        .store
        .find_near(center, request.radius_meters)
        .await
        .into_iter()
        .map(|(vehicle, distance_meters)| NearbyVehicle {
            state: vehicle,
            distance_meters,
        })
        .collect();
    let count = vehicles.len();

    Ok(Json(NearbyResponse { vehicles, count }))
}
