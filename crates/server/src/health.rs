use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use switchboard_agent::ConversationService;

#[derive(Clone)]
pub struct HealthState {
    service: Arc<ConversationService>,
    provider_backed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub sessions: HealthCheck,
    pub provider: HealthCheck,
    pub checked_at: String,
}

pub fn router(service: Arc<ConversationService>, provider_backed: bool) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { service, provider_backed })
}

/// Liveness only: the provider is never called from here.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let active = state.service.sessions().len().await;

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "switchboard router initialized".to_string(),
        },
        sessions: HealthCheck { status: "ready", detail: format!("{active} active caller sessions") },
        provider: if state.provider_backed {
            HealthCheck { status: "configured", detail: "provider-backed stages enabled".to_string() }
        } else {
            HealthCheck { status: "unused", detail: "all stages use keyword rules".to_string() }
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use switchboard_agent::RouterBuilder;
    use switchboard_core::config::AppConfig;
    use switchboard_core::domain::caller::CallerContext;

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_reports_keyword_only_router_as_ready() {
        let service = Arc::new(RouterBuilder::new(AppConfig::default()).build().expect("build"));

        let (status, Json(payload)) =
            health(State(HealthState { service, provider_backed: false })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.provider.status, "unused");
        assert_eq!(payload.sessions.detail, "0 active caller sessions");
    }

    #[tokio::test]
    async fn health_counts_caller_sessions() {
        let service = Arc::new(RouterBuilder::new(AppConfig::default()).build().expect("build"));
        service.handle(CallerContext::new("h-1", "Jane"), "price of a pencil", None).await;
        service.handle(CallerContext::new("h-2", "Hania"), "price of a pencil", None).await;

        let (_, Json(payload)) =
            health(State(HealthState { service, provider_backed: true })).await;

        assert_eq!(payload.sessions.detail, "2 active caller sessions");
        assert_eq!(payload.provider.status, "configured");
    }
}
