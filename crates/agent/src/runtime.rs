//! The orchestrator: one utterance in, one caller-safe reply out.
//!
//! Every request walks `RECEIVED -> INPUT_CHECKED -> CLASSIFIED -> HANDLED -> OUTPUT_CHECKED
//! -> DELIVERED` through a [`PipelineRun`]. A gate reject ends the run in `REJECTED_INPUT` or
//! `REJECTED_OUTPUT`. Any stage error, handler panic or deadline overrun ends it in `FAILED`.
//! In all three cases the caller only sees one of the configured fixed messages.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use switchboard_core::audit::{AuditContext, AuditSink, TracingAuditSink};
use switchboard_core::config::MessagesConfig;
use switchboard_core::domain::caller::CallerContext;
use switchboard_core::domain::category::Category;
use switchboard_core::domain::conversation::ConversationHistory;
use switchboard_core::domain::response::{GateVerdict, Response, ToolCallStatus};
use switchboard_core::domain::utterance::Utterance;
use switchboard_core::errors::{ApplicationError, DomainError, ProviderError};
use switchboard_core::pipeline::{
    PipelineEvent, PipelineRun, PipelineState, PipelineTransitionError, TransitionOutcome,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::classifier::IntentClassifier;
use crate::composer::ReplyComposer;
use crate::guardrails::{InputGate, OutputGate};
use crate::handlers::{HandlerError, HandlerRegistry, HandlerRequest};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct RouteRequest {
    pub correlation_id: String,
    pub caller: CallerContext,
    pub utterance: Utterance,
    pub history: ConversationHistory,
}

impl RouteRequest {
    pub fn new(caller: CallerContext, utterance: impl Into<Utterance>) -> Self {
        Self {
            correlation_id: format!("req-{}", Uuid::new_v4()),
            caller,
            utterance: utterance.into(),
            history: ConversationHistory::default(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Delivered,
    InputRejected,
    OutputRejected,
    ProviderFailure,
    Failed,
}

impl RouteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::InputRejected => "input_rejected",
            Self::OutputRejected => "output_rejected",
            Self::ProviderFailure => "provider_failure",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RouteOutcome {
    pub correlation_id: String,
    pub status: RouteStatus,
    /// Text safe to show the caller.
    pub reply: String,
    pub category: Option<Category>,
    /// Present only when the response was delivered.
    pub response: Option<Response>,
    pub input_verdict: Option<GateVerdict>,
    pub output_verdict: Option<GateVerdict>,
    pub state: PipelineState,
    pub transitions: Vec<TransitionOutcome>,
    /// Internal failure detail for logs. Never part of `reply`.
    pub error: Option<ApplicationError>,
    pub elapsed: Duration,
}

impl RouteOutcome {
    pub fn is_delivered(&self) -> bool {
        self.status == RouteStatus::Delivered
    }

    /// A delivered reply in which some tool declined for lack of permission.
    pub fn permission_denied(&self) -> bool {
        self.response.as_ref().is_some_and(|response| {
            response.tool_calls.iter().any(|call| call.status == ToolCallStatus::Declined)
        })
    }

    pub fn gate_checks(&self, accepted: PipelineEvent, rejected: PipelineEvent) -> usize {
        self.transitions
            .iter()
            .filter(|outcome| outcome.event == accepted || outcome.event == rejected)
            .count()
    }
}

enum Staged {
    InputRejected,
    OutputRejected,
    Delivered(Response),
}

#[derive(Default)]
struct Progress {
    category: Option<Category>,
    input_verdict: Option<GateVerdict>,
    output_verdict: Option<GateVerdict>,
}

enum StageError {
    Provider(ProviderError),
    Handler { category: Category, error: HandlerError },
    Panicked { category: Category },
    Transition(PipelineTransitionError),
    TimedOut { elapsed_ms: u64 },
}

impl StageError {
    fn status(&self) -> RouteStatus {
        match self {
            Self::Provider(_)
            | Self::Handler { error: HandlerError::Provider(_), .. }
            | Self::TimedOut { .. } => RouteStatus::ProviderFailure,
            Self::Handler { .. } | Self::Panicked { .. } | Self::Transition(_) => RouteStatus::Failed,
        }
    }

    fn into_application(self) -> ApplicationError {
        match self {
            Self::Provider(error) | Self::Handler { error: HandlerError::Provider(error), .. } => {
                ApplicationError::Provider(error)
            }
            Self::Handler { category, error } => ApplicationError::Handler {
                handler: category.as_str().to_string(),
                message: error.to_string(),
            },
            Self::Panicked { category } => ApplicationError::Handler {
                handler: category.as_str().to_string(),
                message: "handler task panicked".to_string(),
            },
            Self::Transition(error) => ApplicationError::Domain(DomainError::from(error)),
            Self::TimedOut { elapsed_ms } => {
                ApplicationError::Provider(ProviderError::Timeout { elapsed_ms })
            }
        }
    }
}

impl From<ProviderError> for StageError {
    fn from(error: ProviderError) -> Self {
        Self::Provider(error)
    }
}

impl From<PipelineTransitionError> for StageError {
    fn from(error: PipelineTransitionError) -> Self {
        Self::Transition(error)
    }
}

/// Aborts the dispatch task when the request is dropped at its deadline.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Orchestrator {
    classifier: Arc<dyn IntentClassifier>,
    input_gate: Arc<dyn InputGate>,
    output_gate: Arc<dyn OutputGate>,
    handlers: Arc<HandlerRegistry>,
    composer: Option<Arc<ReplyComposer>>,
    audit: Arc<dyn AuditSink>,
    messages: MessagesConfig,
    request_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        input_gate: Arc<dyn InputGate>,
        output_gate: Arc<dyn OutputGate>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            classifier,
            input_gate,
            output_gate,
            handlers,
            composer: None,
            audit: Arc::new(TracingAuditSink),
            messages: MessagesConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_composer(mut self, composer: Arc<ReplyComposer>) -> Self {
        self.composer = Some(composer);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_messages(mut self, messages: MessagesConfig) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn messages(&self) -> &MessagesConfig {
        &self.messages
    }

    pub async fn route(&self, request: RouteRequest) -> RouteOutcome {
        let started = Instant::now();
        let audit = AuditContext::new(
            Some(request.caller.caller_id.clone()),
            request.correlation_id.clone(),
            "orchestrator",
        );
        let mut run = PipelineRun::default();
        let mut progress = Progress::default();

        tracing::info!(
            event_name = "router.request_received",
            correlation_id = %request.correlation_id,
            caller_id = %request.caller.caller_id.0,
            "routing utterance"
        );

        let staged = match tokio::time::timeout(
            self.request_timeout,
            self.run_stages(&request, &mut run, &mut progress, &audit),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StageError::TimedOut { elapsed_ms: elapsed_ms(started) }),
        };

        let (status, reply, response, error) = match staged {
            Ok(Staged::Delivered(response)) => {
                (RouteStatus::Delivered, response.text.clone(), Some(response), None)
            }
            Ok(Staged::InputRejected) => {
                (RouteStatus::InputRejected, self.messages.input_rejected.clone(), None, None)
            }
            Ok(Staged::OutputRejected) => {
                (RouteStatus::OutputRejected, self.messages.output_rejected.clone(), None, None)
            }
            Err(error) => {
                if !run.state().is_terminal() {
                    if let Err(transition) =
                        run.advance(PipelineEvent::StageFailed, self.audit.as_ref(), &audit)
                    {
                        tracing::error!(
                            event_name = "router.fail_transition_rejected",
                            correlation_id = %request.correlation_id,
                            error = %transition,
                            "could not mark pipeline as failed"
                        );
                    }
                }
                let status = error.status();
                let error = error.into_application();
                tracing::warn!(
                    event_name = "router.stage_failed",
                    correlation_id = %request.correlation_id,
                    caller_id = %request.caller.caller_id.0,
                    status = status.as_str(),
                    error = %error,
                    "request failed"
                );
                (status, self.messages.failure.clone(), None, Some(error))
            }
        };

        let outcome = RouteOutcome {
            correlation_id: request.correlation_id,
            status,
            reply,
            category: progress.category,
            response,
            input_verdict: progress.input_verdict,
            output_verdict: progress.output_verdict,
            state: run.state(),
            transitions: run.into_transitions(),
            error,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            event_name = "router.request_completed",
            correlation_id = %outcome.correlation_id,
            status = outcome.status.as_str(),
            state = outcome.state.as_str(),
            category = outcome.category.map(|category| category.as_str()).unwrap_or("none"),
            handler = outcome.response.as_ref().map(|response| response.handler.as_str()).unwrap_or("none"),
            elapsed_ms = elapsed_ms(started),
            "request finished"
        );

        outcome
    }

    async fn run_stages(
        &self,
        request: &RouteRequest,
        run: &mut PipelineRun,
        progress: &mut Progress,
        audit: &AuditContext,
    ) -> Result<Staged, StageError> {
        let sink = self.audit.as_ref();

        let verdict = self.input_gate.check(&request.utterance).await?;
        let accepted = verdict.accepted;
        tracing::debug!(
            event_name = "router.input_gate",
            correlation_id = %request.correlation_id,
            accepted,
            reason = %verdict.reason,
            "input gate evaluated"
        );
        progress.input_verdict = Some(verdict);
        if !accepted {
            run.advance(PipelineEvent::InputRejected, sink, audit)?;
            return Ok(Staged::InputRejected);
        }
        run.advance(PipelineEvent::InputAccepted, sink, audit)?;

        let category = self.classifier.classify(&request.utterance).await?;
        progress.category = Some(category);
        run.advance(PipelineEvent::IntentClassified, sink, audit)?;

        let mut response = self.dispatch(category, request).await?;
        if let Some(composer) = &self.composer {
            response.text = composer
                .compose(&request.utterance, &request.caller, &request.history, &response)
                .await?;
        }
        run.advance(PipelineEvent::HandlerResponded, sink, audit)?;

        let verdict = self.output_gate.check(&request.utterance, &response).await?;
        let accepted = verdict.accepted;
        tracing::debug!(
            event_name = "router.output_gate",
            correlation_id = %request.correlation_id,
            accepted,
            reason = %verdict.reason,
            "output gate evaluated"
        );
        progress.output_verdict = Some(verdict);
        if !accepted {
            run.advance(PipelineEvent::OutputRejected, sink, audit)?;
            return Ok(Staged::OutputRejected);
        }
        run.advance(PipelineEvent::OutputAccepted, sink, audit)?;
        run.advance(PipelineEvent::ResponseDelivered, sink, audit)?;

        Ok(Staged::Delivered(response))
    }

    /// Runs the handler chain on its own task so a panic stays inside the request.
    async fn dispatch(
        &self,
        category: Category,
        request: &RouteRequest,
    ) -> Result<Response, StageError> {
        let handlers = Arc::clone(&self.handlers);
        let handler_request = HandlerRequest {
            correlation_id: request.correlation_id.clone(),
            utterance: request.utterance.clone(),
            caller: request.caller.clone(),
            history: request.history.clone(),
        };

        let mut task = AbortOnDrop(tokio::spawn(async move {
            handlers.dispatch(category, handler_request).await
        }));

        match (&mut task.0).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => Err(StageError::Handler { category, error }),
            Err(_) => Err(StageError::Panicked { category }),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
