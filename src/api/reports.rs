use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use super::{AppState, ErrorResponse};
use crate::models::{PositionReport, VehicleState};
use crate::store::StoreError;

/// Synchronous acknowledgment for an accepted report. Enrichment (ETA,
/// arrival events) happens asynchronously and reaches subscribers via
/// the WebSocket channels.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReportAck {
    pub accepted: bool,
    pub state: VehicleState,
}

/// Ingest a position report from a vehicle tracker device
#[utoipa::path(
    post,
    path = "/api/reports",
    request_body = PositionReport,
    responses(
        (status = 202, description = "Report accepted and state updated", body = ReportAck),
        (status = 400, description = "Report rejected (invalid coordinates)", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn submit_report(
    State(state): State<AppState>,
    Json(report): Json<PositionReport>,
) -> Result<(StatusCode, Json<ReportAck>), (StatusCode, Json<ErrorResponse>)> {
    match state.tracker.ingest(report).await {
        Ok(vehicle) => Ok((
            StatusCode::ACCEPTED,
            Json(ReportAck {
                accepted: true,
                state: vehicle,
            }),
        )),
        Err(e @ StoreError::InvalidCoordinates { .. }) => Err((
            StatusCode::BAD_REQUEST,
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
