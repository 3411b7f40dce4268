//! Health reporting for the gateway.

use serde_json::Value;

use crate::dto::health::HealthResponse;
use crate::state::SharedState;
use crate::store::{BoardStore, paths};

/// Report gateway health along with the number of live sessions.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let sessions = match state.store().read_once(paths::SESSIONS_ROOT).await {
        Ok(Value::Object(entries)) => entries.len() as u64,
        _ => 0,
    };
    HealthResponse::ok(sessions, state.uptime_secs())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::state::AppState;

    use super::*;

    #[tokio::test]
    async fn session_count_tracks_the_store() {
        let state = AppState::new();
        let status = health_status(&state).await;
        assert_eq!(status.status, "ok");
        assert_eq!(status.sessions, 0);

        state
            .store()
            .write("sessions/retro-a/owner", json!("p-1"))
            .await
            .unwrap();
        state
            .store()
            .write("sessions/retro-b/owner", json!("p-2"))
            .await
            .unwrap();
        assert_eq!(health_status(&state).await.sessions, 2);
    }
}
