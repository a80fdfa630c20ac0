use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Received,
    InputChecked,
    Classified,
    Handled,
    OutputChecked,
    Delivered,
    RejectedInput,
    RejectedOutput,
    /// A handler, tool or provider call failed or timed out.
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::RejectedInput | Self::RejectedOutput | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::InputChecked => "INPUT_CHECKED",
            Self::Classified => "CLASSIFIED",
            Self::Handled => "HANDLED",
            Self::OutputChecked => "OUTPUT_CHECKED",
            Self::Delivered => "DELIVERED",
            Self::RejectedInput => "REJECTED_INPUT",
            Self::RejectedOutput => "REJECTED_OUTPUT",
            Self::Failed => "FAILED",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEvent {
    InputAccepted,
    InputRejected,
    IntentClassified,
    HandlerResponded,
    OutputAccepted,
    OutputRejected,
    ResponseDelivered,
    StageFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PipelineState,
    pub to: PipelineState,
    pub event: PipelineEvent,
}
