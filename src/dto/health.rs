//! Health check payloads.

use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status (always "ok" for the in-process store).
    pub status: String,
    /// Number of session documents currently held.
    pub sessions: u64,
    /// Seconds since the gateway started.
    pub uptime_secs: u64,
}

impl HealthResponse {
    /// Create a healthy response.
    pub fn ok(sessions: u64, uptime_secs: u64) -> Self {
        Self {
            status: "ok".to_string(),
            sessions,
            uptime_secs,
        }
    }
}
