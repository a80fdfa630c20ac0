use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::pipeline::states::{PipelineEvent, PipelineState, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: PipelineState, event: PipelineEvent },
    #[error("pipeline already finished in terminal state {state:?}")]
    AlreadyTerminal { state: PipelineState },
}

/// Transition table for one request moving through gate -> classify -> handle -> gate.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineEngine;

impl PipelineEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_state(&self) -> PipelineState {
        PipelineState::Received
    }

    pub fn apply(
        &self,
        current: PipelineState,
        event: PipelineEvent,
    ) -> Result<TransitionOutcome, PipelineTransitionError> {
        use PipelineEvent::{
            HandlerResponded, InputAccepted, InputRejected, IntentClassified, OutputAccepted,
            OutputRejected, ResponseDelivered, StageFailed,
        };
        use PipelineState::{
            Classified, Delivered, Failed, Handled, InputChecked, OutputChecked, Received,
            RejectedInput, RejectedOutput,
        };

        if current.is_terminal() {
            return Err(PipelineTransitionError::AlreadyTerminal { state: current });
        }

        let to = match (current, event) {
            (Received, InputAccepted) => InputChecked,
            (Received, InputRejected) => RejectedInput,
            (InputChecked, IntentClassified) => Classified,
            (Classified, HandlerResponded) => Handled,
            (Handled, OutputAccepted) => OutputChecked,
            (Handled, OutputRejected) => RejectedOutput,
            (OutputChecked, ResponseDelivered) => Delivered,
            (Received | InputChecked | Classified | Handled, StageFailed) => Failed,
            _ => {
                return Err(PipelineTransitionError::InvalidTransition { state: current, event });
            }
        };

        Ok(TransitionOutcome { from: current, to, event })
    }

    pub fn apply_with_audit<S>(
        &self,
        current: PipelineState,
        event: PipelineEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, PipelineTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.caller_id.clone(),
                        audit.correlation_id.clone(),
                        "pipeline.transition_applied",
                        category_for(event),
                        audit.actor.clone(),
                        outcome_for(outcome.to),
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.caller_id.clone(),
                        audit.correlation_id.clone(),
                        "pipeline.transition_rejected",
                        AuditCategory::System,
                        audit.actor.clone(),
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn category_for(event: PipelineEvent) -> AuditCategory {
    match event {
        PipelineEvent::InputAccepted | PipelineEvent::InputRejected => AuditCategory::InputGate,
        PipelineEvent::IntentClassified => AuditCategory::Classification,
        PipelineEvent::HandlerResponded => AuditCategory::Dispatch,
        PipelineEvent::OutputAccepted | PipelineEvent::OutputRejected => AuditCategory::OutputGate,
        PipelineEvent::ResponseDelivered => AuditCategory::Delivery,
        PipelineEvent::StageFailed => AuditCategory::System,
    }
}

fn outcome_for(state: PipelineState) -> AuditOutcome {
    match state {
        PipelineState::RejectedInput | PipelineState::RejectedOutput => AuditOutcome::Rejected,
        PipelineState::Failed => AuditOutcome::Failed,
        _ => AuditOutcome::Success,
    }
}

/// State of a single request plus every transition it went through.
#[derive(Clone, Debug)]
pub struct PipelineRun {
    engine: PipelineEngine,
    state: PipelineState,
    transitions: Vec<TransitionOutcome>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new(PipelineEngine)
    }
}

impl PipelineRun {
    pub fn new(engine: PipelineEngine) -> Self {
        Self { state: engine.initial_state(), engine, transitions: Vec::new() }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn transitions(&self) -> &[TransitionOutcome] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<TransitionOutcome> {
        self.transitions
    }

    pub fn advance<S>(
        &mut self,
        event: PipelineEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<PipelineState, PipelineTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let outcome = self.engine.apply_with_audit(self.state, event, sink, audit)?;
        self.state = outcome.to;
        self.transitions.push(outcome);
        Ok(self.state)
    }

    /// How many times the run passed through a gate verdict for the given accept/reject pair.
    pub fn gate_checks(&self, accepted: PipelineEvent, rejected: PipelineEvent) -> usize {
        self.transitions
            .iter()
            .filter(|outcome| outcome.event == accepted || outcome.event == rejected)
            .count()
    }
}
