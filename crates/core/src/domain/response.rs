use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(pub String);

impl HandlerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Completed,
    Declined,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub status: ToolCallStatus,
    pub summary: String,
}

/// Text produced by a handler together with the identity of the handler that wrote it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub handler: HandlerId,
    pub text: String,
    /// Handlers that delegated before `handler` answered, in order.
    pub handoff_chain: Vec<HandlerId>,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl Response {
    pub fn new(handler: HandlerId, text: impl Into<String>) -> Self {
        Self { handler, text: text.into(), handoff_chain: Vec::new(), tool_calls: Vec::new() }
    }

    pub fn was_handed_off(&self) -> bool {
        !self.handoff_chain.is_empty()
    }
}

/// Accept/reject decision of a gate. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub accepted: bool,
    pub reason: String,
}

impl GateVerdict {
    pub fn accept(reason: impl Into<String>) -> Self {
        Self { accepted: true, reason: reason.into() }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self { accepted: false, reason: reason.into() }
    }

    pub fn tripped(&self) -> bool {
        !self.accepted
    }
}
