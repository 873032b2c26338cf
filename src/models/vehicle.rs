use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Position;

/// Lifecycle status of a vehicle. Derived from speed on every update
/// unless a maintenance override is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum VehicleStatus {
    Active,
    Inactive,
    Maintenance,
}

/// Authoritative per-vehicle record. Mutated only by the state store
/// under its per-key serialization.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VehicleState {
    /// Stable device/vehicle key
    pub key: String,
    pub position: Position,
    /// Heading in degrees clockwise from north
    pub heading: f64,
    /// Speed in meters per second
    pub speed: f64,
    pub status: VehicleStatus,
    /// Timestamp of the most recent accepted report (monotonically non-decreasing)
    pub last_update: DateTime<Utc>,
    /// Assigned route key, if any
    pub route_key: Option<String>,
    /// Ordered waypoint keys of the assigned route
    pub route_waypoints: Vec<String>,
    /// Index of the waypoint the vehicle is currently heading to
    pub current_waypoint_index: usize,
    /// Waypoint index most recently flagged as arrived, for idempotent
    /// arrival emission
    pub arrived_index: Option<usize>,
    /// Passenger-load counter reported by the device
    pub passenger_load: u32,
}

impl VehicleState {
    pub fn new(key: String, report: &PositionReport) -> Self {
        let status = if report.speed > 0.0 {
            VehicleStatus::Active
        } else {
            VehicleStatus::Inactive
        };
        Self {
            key,
            position: Position::new(report.latitude, report.longitude),
            heading: report.heading,
            speed: report.speed,
            status,
            last_update: report.timestamp,
            route_key: None,
            route_waypoints: Vec::new(),
            current_waypoint_index: 0,
            arrived_index: None,
            passenger_load: report.passenger_load.unwrap_or(0),
        }
    }
}

/// Inbound report from a vehicle tracker device
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PositionReport {
    /// Stable device/vehicle key
    pub device_key: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Speed in meters per second
    pub speed: f64,
    /// Heading in degrees clockwise from north
    pub heading: f64,
    pub timestamp: DateTime<Utc>,
    /// Passenger count, if the device reports one
    #[serde(default)]
    pub passenger_load: Option<u32>,
}

impl PositionReport {
    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}
