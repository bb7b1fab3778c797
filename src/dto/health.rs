use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Whether a session store is currently installed.
    pub storage: bool,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            storage: true,
        }
    }

    /// Lobby commands answer 503 while degraded.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
            storage: false,
        }
    }
}
