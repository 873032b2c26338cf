pub mod osrm;

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

/// Routing provider request log for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct RoutingRequestLog {
    /// Unique request ID
    pub id: String,
    /// Timestamp when the request was made
    pub timestamp: String,
    /// Endpoint called (request path without query)
    pub endpoint: String,
    /// Duration of the request in milliseconds
    pub duration_ms: u64,
    /// HTTP status code (0 when the request never completed)
    pub status: u16,
    /// Error message if the request failed
    pub error: Option<String>,
}

/// Sender for routing request diagnostics
pub type RoutingRequestSender = broadcast::Sender<RoutingRequestLog>;

/// Run `op` up to `max_attempts` times with a fixed delay between
/// attempts, returning the first success or the last error. Transient
/// failure is an expected outcome here, not an exceptional one.
pub async fn retry<T, E, F, Fut>(max_attempts: u32, delay: Duration, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "Attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
