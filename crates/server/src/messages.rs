//! Conversation endpoints.
//!
//! `POST /v1/messages` routes one utterance for the caller described in the body. Polite
//! refusals from either gate are ordinary `200` answers; provider and internal failures keep
//! the same body shape but carry `503`/`500` and only the generic apology text.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use switchboard_agent::{ConversationService, RouteOutcome, RouteStatus};
use switchboard_core::domain::caller::{CallerContext, CallerId};
use switchboard_core::domain::conversation::Turn;
use switchboard_core::domain::response::ToolCallRecord;
use switchboard_core::errors::InterfaceError;
use tracing::{info, warn};

#[derive(Clone)]
pub struct MessagesState {
    service: Arc<ConversationService>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub caller: CallerContext,
    pub utterance: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageReply {
    pub correlation_id: String,
    pub status: RouteStatus,
    pub reply: String,
    pub category: Option<&'static str>,
    pub handler: Option<String>,
    pub handoffs: Vec<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct HistoryReply {
    pub caller_id: String,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
pub struct ErrorReply {
    pub error: &'static str,
    pub correlation_id: String,
}

pub fn router(service: Arc<ConversationService>) -> Router {
    Router::new()
        .route("/v1/messages", post(post_message))
        .route("/v1/sessions/{caller_id}", delete(reset_session))
        .route("/v1/sessions/{caller_id}/history", get(session_history))
        .with_state(MessagesState { service })
}

async fn post_message(
    State(state): State<MessagesState>,
    Json(body): Json<MessageRequest>,
) -> Response {
    if body.caller.caller_id.0.trim().is_empty() {
        let error = InterfaceError::BadRequest {
            message: "caller.caller_id must not be empty".to_string(),
            correlation_id: body.correlation_id.unwrap_or_else(|| "unassigned".to_string()),
        };
        return interface_error(error).into_response();
    }

    let outcome = state.service.handle(body.caller, body.utterance, body.correlation_id).await;
    let status_code = status_code_for(&outcome);
    if let Some(error) = &outcome.error {
        let mapped = error.clone().into_interface(outcome.correlation_id.clone());
        warn!(
            event_name = "http.message.failed",
            correlation_id = %outcome.correlation_id,
            status = outcome.status.as_str(),
            error = %mapped,
            "message routing failed"
        );
    }

    (status_code, Json(message_reply(outcome))).into_response()
}

async fn reset_session(
    State(state): State<MessagesState>,
    Path(caller_id): Path<String>,
) -> StatusCode {
    let existed = state.service.reset(&CallerId(caller_id.clone())).await;
    info!(
        event_name = "http.session.reset",
        correlation_id = "session",
        caller_id = %caller_id,
        existed,
        "caller session reset"
    );
    if existed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn session_history(
    State(state): State<MessagesState>,
    Path(caller_id): Path<String>,
) -> Result<Json<HistoryReply>, StatusCode> {
    let history =
        state.service.history(&CallerId(caller_id.clone())).await.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(HistoryReply { caller_id, turns: history.turns().to_vec() }))
}

fn status_code_for(outcome: &RouteOutcome) -> StatusCode {
    match outcome.status {
        RouteStatus::Delivered | RouteStatus::InputRejected | RouteStatus::OutputRejected => {
            StatusCode::OK
        }
        RouteStatus::ProviderFailure => StatusCode::SERVICE_UNAVAILABLE,
        RouteStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_reply(outcome: RouteOutcome) -> MessageReply {
    let elapsed_ms = outcome.elapsed.as_millis() as u64;
    let (handler, handoffs, tool_calls) = match outcome.response {
        Some(response) => (
            Some(response.handler.to_string()),
            response.handoff_chain.iter().map(ToString::to_string).collect(),
            response.tool_calls,
        ),
        None => (None, Vec::new(), Vec::new()),
    };

    MessageReply {
        correlation_id: outcome.correlation_id,
        status: outcome.status,
        reply: outcome.reply,
        category: outcome.category.map(|category| category.as_str()),
        handler,
        handoffs,
        tool_calls,
        elapsed_ms,
    }
}

fn interface_error(error: InterfaceError) -> (StatusCode, Json<ErrorReply>) {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body =
        ErrorReply { error: error.user_message(), correlation_id: error.correlation_id().to_string() };
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use switchboard_agent::llm::{GenerationContext, LlmClient};
    use switchboard_agent::RouterBuilder;
    use switchboard_core::config::{AppConfig, StageStrategy};
    use switchboard_core::errors::ProviderError;
    use tower::ServiceExt;

    use super::router;

    struct StalledProvider;

    #[async_trait]
    impl LlmClient for StalledProvider {
        async fn generate(
            &self,
            _prompt: &str,
            _context: Option<&GenerationContext>,
        ) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("billing".to_string())
        }
    }

    fn app() -> Router {
        let service = RouterBuilder::new(AppConfig::default()).build().expect("build");
        router(Arc::new(service))
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|value| Body::from(value.to_string())).unwrap_or_else(Body::empty))
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, payload)
    }

    #[tokio::test]
    async fn premium_refund_is_delivered_with_tool_record() {
        let (status, payload) = send(
            app(),
            Method::POST,
            "/v1/messages",
            Some(json!({
                "caller": {"caller_id": "web-1", "name": "Hania", "tier": "premium", "account_id": "ACC-1002"},
                "utterance": "I want a refund",
                "correlation_id": "req-web-1"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["correlation_id"], "req-web-1");
        assert_eq!(payload["status"], "delivered");
        assert_eq!(payload["category"], "billing");
        assert_eq!(payload["handler"], "billing");
        assert_eq!(payload["tool_calls"][0]["tool"], "refund");
        assert_eq!(payload["tool_calls"][0]["status"], "completed");
        assert!(payload["reply"].as_str().unwrap_or_default().contains("ACC-1002"));
    }

    #[tokio::test]
    async fn off_topic_utterance_gets_polite_refusal() {
        let (status, payload) = send(
            app(),
            Method::POST,
            "/v1/messages",
            Some(json!({
                "caller": {"caller_id": "web-2", "name": "Jane"},
                "utterance": "Help me solve my math homework: 2x + 3 = 11"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["status"], "input_rejected");
        assert_eq!(payload["handler"], Value::Null);
        assert!(payload["correlation_id"].as_str().unwrap_or_default().starts_with("req-"));
    }

    #[tokio::test]
    async fn blank_caller_id_is_a_bad_request() {
        let (status, payload) = send(
            app(),
            Method::POST,
            "/v1/messages",
            Some(json!({"caller": {"caller_id": "  ", "name": "Jane"}, "utterance": "refund"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload["correlation_id"], "unassigned");
        assert!(payload["error"].as_str().unwrap_or_default().contains("could not be processed"));
    }

    #[tokio::test]
    async fn stalled_provider_maps_to_service_unavailable() {
        let mut config = AppConfig::default();
        config.router.classifier = StageStrategy::Provider;
        config.router.request_timeout_secs = 1;
        config.llm.timeout_secs = 1;
        config.llm.max_retries = 0;
        let service = RouterBuilder::new(config)
            .with_llm_client(Arc::new(StalledProvider))
            .build()
            .expect("build");

        let (status, payload) = send(
            router(Arc::new(service)),
            Method::POST,
            "/v1/messages",
            Some(json!({"caller": {"caller_id": "web-3", "name": "Jane"}, "utterance": "refund please"})),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload["status"], "provider_failure");
        assert!(payload["reply"].as_str().unwrap_or_default().starts_with("Sorry, something went wrong"));
    }

    #[tokio::test]
    async fn session_history_and_reset() {
        let service = Arc::new(RouterBuilder::new(AppConfig::default()).build().expect("build"));
        let app = router(Arc::clone(&service));

        let (status, _) = send(
            app.clone(),
            Method::POST,
            "/v1/messages",
            Some(json!({"caller": {"caller_id": "web-4", "name": "Areeba"}, "utterance": "price of a notebook"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, payload) =
            send(app.clone(), Method::GET, "/v1/sessions/web-4/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["turns"].as_array().map(Vec::len), Some(2));
        assert_eq!(payload["turns"][0]["role"], "user");

        let (status, _) = send(app.clone(), Method::DELETE, "/v1/sessions/web-4", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(app, Method::DELETE, "/v1/sessions/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_caller_history_is_not_found_and_creates_no_session() {
        let service = Arc::new(RouterBuilder::new(AppConfig::default()).build().expect("build"));
        let app = router(Arc::clone(&service));

        let (status, _) =
            send(app.clone(), Method::GET, "/v1/sessions/never-posted/history", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(service.sessions().len().await, 0);

        let (status, _) = send(app, Method::DELETE, "/v1/sessions/never-posted", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
