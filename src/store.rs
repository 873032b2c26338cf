use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::models::{Position, PositionReport, VehicleState, VehicleStatus, Waypoint};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid coordinates: latitude {lat}, longitude {lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },
    #[error("Vehicle not found: {0}")]
    VehicleNotFound(String),
}

/// Static network loaded from config: waypoints, routes and
/// vehicle-to-route assignments. Read-only input to the core.
pub struct Network {
    waypoints: HashMap<String, Waypoint>,
    routes: HashMap<String, Vec<String>>,
    assignments: HashMap<String, String>,
}

impl Network {
    pub fn from_config(config: &Config) -> Self {
        let waypoints = config
            .waypoints
            .iter()
            .map(|w| {
                (
                    w.key.clone(),
                    Waypoint {
                        key: w.key.clone(),
                        name: w.name.clone(),
                        position: Position::new(w.lat, w.lon),
                    },
                )
            })
            .collect();
        let routes = config
            .routes
            .iter()
            .map(|r| (r.key.clone(), r.waypoints.clone()))
            .collect();
        let assignments = config
            .assignments
            .iter()
            .map(|a| (a.vehicle.clone(), a.route.clone()))
            .collect();
        Self {
            waypoints,
            routes,
            assignments,
        }
    }

    pub fn waypoint(&self, key: &str) -> Option<&Waypoint> {
        self.waypoints.get(key)
    }

    pub fn waypoints(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.values()
    }

    pub fn route(&self, key: &str) -> Option<&[String]> {
        self.routes.get(key).map(|w| w.as_slice())
    }

    pub fn assigned_route(&self, vehicle_key: &str) -> Option<&str> {
        self.assignments.get(vehicle_key).map(|s| s.as_str())
    }
}

/// Authoritative store for vehicle state. Each vehicle key maps to its
/// own async mutex, so updates to one key apply strictly in receipt
/// order while different keys proceed in parallel.
pub struct VehicleStateStore {
    network: Arc<Network>,
    vehicles: RwLock<HashMap<String, Arc<Mutex<VehicleState>>>>,
}

impl VehicleStateStore {
    pub fn new(network: Arc<Network>) -> Self {
        Self {
            network,
            vehicles: RwLock::new(HashMap::new()),
        }
    }

    /// Apply a position report. Validation happens before any state is
    /// touched; a report with out-of-range coordinates never creates or
    /// mutates a record. Returns a snapshot of the updated state.
    pub async fn update(&self, report: &PositionReport) -> Result<VehicleState, StoreError> {
        let position = report.position();
        if !position.is_valid() {
            return Err(StoreError::InvalidCoordinates {
                lat: report.latitude,
                lon: report.longitude,
            });
        }

        let entry = self.entry_or_insert(&report.device_key, report).await;
        let mut state = entry.lock().await;

        state.position = position;
        state.heading = report.heading;
        state.speed = report.speed;
        if state.status != VehicleStatus::Maintenance {
            state.status = if report.speed > 0.0 {
                VehicleStatus::Active
            } else {
                VehicleStatus::Inactive
            };
        }
        // Last-update timestamp never moves backwards
        if report.timestamp > state.last_update {
            state.last_update = report.timestamp;
        }
        if let Some(load) = report.passenger_load {
            state.passenger_load = load;
        }

        Ok(state.clone())
    }

    async fn entry_or_insert(
        &self,
        key: &str,
        report: &PositionReport,
    ) -> Arc<Mutex<VehicleState>> {
        {
            let vehicles = self.vehicles.read().await;
            if let Some(entry) = vehicles.get(key) {
                return entry.clone();
            }
        }

        let mut vehicles = self.vehicles.write().await;
        vehicles
            .entry(key.to_string())
            .or_insert_with(|| {
                let mut state = VehicleState::new(key.to_string(), report);
                if let Some(route_key) = self.network.assigned_route(key) {
                    if let Some(waypoints) = self.network.route(route_key) {
                        state.route_key = Some(route_key.to_string());
                        state.route_waypoints = waypoints.to_vec();
                    }
                }
                tracing::info!(vehicle = %key, route = ?state.route_key, "Registered vehicle");
                Arc::new(Mutex::new(state))
            })
            .clone()
    }

    pub async fn get(&self, key: &str) -> Result<VehicleState, StoreError> {
        let entry = {
            let vehicles = self.vehicles.read().await;
            vehicles
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::VehicleNotFound(key.to_string()))?
        };
        let state = entry.lock().await;
        Ok(state.clone())
    }

    pub async fn all(&self) -> Vec<VehicleState> {
        let entries: Vec<_> = {
            let vehicles = self.vehicles.read().await;
            vehicles.values().cloned().collect()
        };
        let mut states = Vec::with_capacity(entries.len());
        for entry in entries {
            states.push(entry.lock().await.clone());
        }
        states
    }

    /// Vehicles within `radius_meters` of `position`, ordered by
    /// ascending distance
    pub async fn find_near(
        &self,
        position: Position,
        radius_meters: f64,
    ) -> Vec<(VehicleState, f64)> {
        let mut nearby: Vec<(VehicleState, f64)> = self
            .all()
            .await
            .into_iter()
            .filter_map(|state| {
                let distance = position.haversine_distance(&state.position);
                (distance <= radius_meters).then_some((state, distance))
            })
            .collect();
        nearby.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        nearby
    }

    /// Flag a waypoint index as arrived and advance past it, atomically
    /// under the vehicle's per-key lock. Returns false if the index was
    /// already flagged or the vehicle is no longer targeting it, which
    /// makes arrival emission idempotent per (vehicle, index) pair.
    pub async fn try_mark_arrival(
        &self,
        key: &str,
        waypoint_index: usize,
    ) -> Result<bool, StoreError> {
        let entry = {
            let vehicles = self.vehicles.read().await;
            vehicles
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::VehicleNotFound(key.to_string()))?
        };
        let mut state = entry.lock().await;

        if state.current_waypoint_index != waypoint_index
            || state.arrived_index == Some(waypoint_index)
        {
            return Ok(false);
        }

        state.arrived_index = Some(waypoint_index);
        state.current_waypoint_index = waypoint_index + 1;
        Ok(true)
    }

    /// Administrative maintenance override. Switching it off re-derives
    /// the status from the last reported speed.
    pub async fn set_maintenance(&self, key: &str, on: bool) -> Result<VehicleState, StoreError> {
        let entry = {
            let vehicles = self.vehicles.read().await;
            vehicles
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::VehicleNotFound(key.to_string()))?
        };
        let mut state = entry.lock().await;
        state.status = if on {
            VehicleStatus::Maintenance
        } else if state.speed > 0.0 {
            VehicleStatus::Active
        } else {
            VehicleStatus::Inactive
        };
        Ok(state.clone())
    }
}
