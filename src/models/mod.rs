pub mod vehicle;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use vehicle::{PositionReport, VehicleState, VehicleStatus};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate pair. Internal code always uses (lat, lon) order;
/// only the routing provider adapter reorders for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance to another position in meters
    pub fn haversine_distance(&self, other: &Position) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lon = (other.lon - self.lon).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_M * c
    }
}

/// A named stop point on a route. Immutable once loaded from config.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Waypoint {
    pub key: String,
    pub name: String,
    pub position: Position,
}
