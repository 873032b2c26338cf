use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to (default: 0.0.0.0:3000)
    #[serde(default = "Config::default_bind_addr")]
    pub bind_addr: String,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// External routing provider configuration
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Distance below which a vehicle counts as arrived at a waypoint (default: 500m)
    #[serde(default = "Config::default_arrival_threshold_meters")]
    pub arrival_threshold_meters: f64,
    /// Named stop points referenced by routes
    #[serde(default)]
    pub waypoints: Vec<WaypointConfig>,
    /// Routes as ordered sequences of waypoint keys
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    /// Vehicle-to-route assignments
    #[serde(default)]
    pub assignments: Vec<AssignmentConfig>,
}

/// Configuration for the external routing provider (OSRM-compatible)
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Base URL of the routing service (default: public OSRM demo server)
    #[serde(default = "RoutingConfig::default_base_url")]
    pub base_url: String,
    /// Routing profile segment in the request path (default: "driving")
    #[serde(default = "RoutingConfig::default_profile")]
    pub profile: String,
    /// Per-request timeout in seconds (default: 5)
    #[serde(default = "RoutingConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts per call before giving up (default: 3)
    #[serde(default = "RoutingConfig::default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts in seconds (default: 1)
    #[serde(default = "RoutingConfig::default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            profile: Self::default_profile(),
            timeout_secs: Self::default_timeout_secs(),
            max_attempts: Self::default_max_attempts(),
            retry_delay_secs: Self::default_retry_delay_secs(),
        }
    }
}

impl RoutingConfig {
    fn default_base_url() -> String {
        "https://router.project-osrm.org".to_string()
    }
    fn default_profile() -> String {
        "driving".to_string()
    }
    fn default_timeout_secs() -> u64 {
        5
    }
    fn default_max_attempts() -> u32 {
        3
    }
    fn default_retry_delay_secs() -> u64 {
        1
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaypointConfig {
    pub key: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub key: String,
    /// Ordered waypoint keys; each must reference a configured waypoint
    pub waypoints: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentConfig {
    pub vehicle: String,
    pub route: String,
}

impl Config {
    fn default_bind_addr() -> String {
        "0.0.0.0:3000".to_string()
    }

    fn default_arrival_threshold_meters() -> f64 {
        500.0
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-references between routes and waypoints
    fn validate(&self) -> Result<(), ConfigError> {
        for route in &self.routes {
            for key in &route.waypoints {
                if !self.waypoints.iter().any(|w| &w.key == key) {
                    return Err(ConfigError::ParseError(format!(
                        "route '{}' references unknown waypoint '{}'",
                        route.key, key
                    )));
                }
            }
        }
        for assignment in &self.assignments {
            if !self.routes.iter().any(|r| r.key == assignment.route) {
                return Err(ConfigError::ParseError(format!(
                    "vehicle '{}' assigned to unknown route '{}'",
                    assignment.vehicle, assignment.route
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
