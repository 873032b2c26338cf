use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use super::{retry, RoutingRequestLog, RoutingRequestSender};
use crate::config::RoutingConfig;
use crate::models::Position;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Routing provider unavailable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },
}

/// Summary of a resolved driving route
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    /// Compact encoded polyline as returned by the provider
    pub geometry: Option<String>,
}

/// Client for an OSRM-compatible routing service. Every call is bounded
/// by the configured timeout and retried with a fixed backoff; after
/// exhausting attempts the call fails with `RoutingError::Unavailable`.
/// No caching, no rate limiting.
pub struct OsrmClient {
    client: Client,
    base_url: String,
    profile: String,
    max_attempts: u32,
    retry_delay: Duration,
    /// Sender for request diagnostics
    diagnostics_tx: RoutingRequestSender,
}

/// The provider expects coordinates in (longitude, latitude) order on
/// the wire. This is the only place they leave the internal (lat, lon)
/// order.
fn wire_coord(position: &Position) -> String {
    format!("{},{}", position.lon, position.lat)
}

impl OsrmClient {
    pub fn new(
        config: &RoutingConfig,
        diagnostics_tx: RoutingRequestSender,
    ) -> Result<Self, RoutingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RoutingError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            profile: config.profile.clone(),
            max_attempts: config.max_attempts,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            diagnostics_tx,
        })
    }

    /// Send a diagnostics log entry
    fn log_request(&self, log: RoutingRequestLog) {
        // Ignore send errors - they just mean no one is listening
        let _ = self.diagnostics_tx.send(log);
    }

    /// Resolve a driving route between two points
    pub async fn route(&self, start: Position, end: Position) -> Result<RouteSummary, RoutingError> {
        self.route_multi(&[start, end]).await
    }

    /// Driving distance in meters between two points
    pub async fn distance(&self, start: Position, end: Position) -> Result<f64, RoutingError> {
        Ok(self.route(start, end).await?.distance_meters)
    }

    /// Estimated travel time in seconds between two points
    pub async fn eta(&self, start: Position, end: Position) -> Result<f64, RoutingError> {
        Ok(self.route(start, end).await?.duration_seconds)
    }

    /// Resolve a driving route through an ordered list of waypoints
    pub async fn route_multi(&self, points: &[Position]) -> Result<RouteSummary, RoutingError> {
        if points.len() < 2 {
            return Err(RoutingError::Api(
                "Route requires at least two points".to_string(),
            ));
        }

        let attempts = self.max_attempts;
        retry(attempts, self.retry_delay, || self.fetch_route(points))
            .await
            .map_err(|e| RoutingError::Unavailable {
                attempts,
                last_error: e.to_string(),
            })
    }

    /// Single request attempt against the provider
    async fn fetch_route(&self, points: &[Position]) -> Result<RouteSummary, RoutingError> {
        let start = Instant::now();
        let request_id = Uuid::new_v4().to_string();

        let coords: Vec<String> = points.iter().map(wire_coord).collect();
        let endpoint = format!("/route/v1/{}/{}", self.profile, coords.join(";"));
        let url = format!(
            "{}{}?overview=full&geometries=polyline",
            self.base_url, endpoint
        );

        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                self.log_request(RoutingRequestLog {
                    id: request_id,
                    timestamp: Utc::now().to_rfc3339(),
                    endpoint,
                    duration_ms: start.elapsed().as_millis() as u64,
                    status: 0,
                    error: Some(e.to_string()),
                });
                return Err(RoutingError::Network(e.to_string()));
            }
        };

        let status = response.status().as_u16();

        if !response.status().is_success() {
            self.log_request(RoutingRequestLog {
                id: request_id,
                timestamp: Utc::now().to_rfc3339(),
                endpoint,
                duration_ms: start.elapsed().as_millis() as u64,
                status,
                error: Some(format!("HTTP error: {}", status)),
            });
            return Err(RoutingError::Api(format!("HTTP error: {}", status)));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                self.log_request(RoutingRequestLog {
                    id: request_id,
                    timestamp: Utc::now().to_rfc3339(),
                    endpoint,
                    duration_ms: start.elapsed().as_millis() as u64,
                    status,
                    error: Some(format!("Failed to read body: {}", e)),
                });
                return Err(RoutingError::Network(e.to_string()));
            }
        };

        let result = parse_route_response(&body);

        self.log_request(RoutingRequestLog {
            id: request_id,
            timestamp: Utc::now().to_rfc3339(),
            endpoint,
            duration_ms: start.elapsed().as_millis() as u64,
            status,
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        result
    }
}

fn parse_route_response(body: &str) -> Result<RouteSummary, RoutingError> {
    let response: RouteResponse =
        serde_json::from_str(body).map_err(|e| RoutingError::Parse(e.to_string()))?;

    if response.code != "Ok" {
        return Err(RoutingError::Api(format!(
            "Provider returned code '{}'",
            response.code
        )));
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| RoutingError::Api("Provider returned no routes".to_string()))?;

    Ok(RouteSummary {
        distance_meters: route.distance,
        duration_seconds: route.duration,
        geometry: route.geometry,
    })
}

// Response structures

#[derive(Debug, Clone, Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Clone, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_coord_uses_longitude_first() {
        let merkato = Position::new(9.0222, 38.7465);
        assert_eq!(wire_coord(&merkato), "38.7465,9.0222");
    }

    #[test]
    fn parses_successful_route_response() {
        let body = r#"{
            "code": "Ok",
            "routes": [
                {"distance": 1234.5, "duration": 321.0, "geometry": "_p~iF~ps|U_ulLnnqC"}
            ],
            "waypoints": []
        }"#;
        let summary = parse_route_response(body).unwrap();
        assert_eq!(summary.distance_meters, 1234.5);
        assert_eq!(summary.duration_seconds, 321.0);
        assert_eq!(summary.geometry.as_deref(), Some("_p~iF~ps|U_ulLnnqC"));
    }

    #[test]
    fn rejects_non_ok_code() {
        let body = r#"{"code": "NoRoute", "routes": []}"#;
        assert!(matches!(
            parse_route_response(body),
            Err(RoutingError::Api(_))
        ));
    }

    #[test]
    fn rejects_empty_route_list() {
        let body = r#"{"code": "Ok", "routes": []}"#;
        assert!(matches!(
            parse_route_response(body),
            Err(RoutingError::Api(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_provider_exhausts_attempts() {
        let (tx, _) = tokio::sync::broadcast::channel(16);
        let config = RoutingConfig {
            // Reserved TEST-NET address, nothing listens here
            base_url: "http://192.0.2.1:1".to_string(),
            profile: "driving".to_string(),
            timeout_secs: 1,
            max_attempts: 2,
            retry_delay_secs: 0,
        };
        let client = OsrmClient::new(&config, tx).unwrap();

        let result = client
            .distance(Position::new(9.0222, 38.7465), Position::new(9.0256, 38.7534))
            .await;

        match result {
            Err(RoutingError::Unavailable { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected Unavailable, got {:?}", other.map(|_| ())),
        }
    }
}
