//! Routing runtime for the support switchboard.
//!
//! A request passes through a fixed sequence of stages:
//! 1. **Input gate** (`guardrails`) - reject empty or out-of-domain utterances
//! 2. **Classification** (`classifier`) - pick exactly one `Category`
//! 3. **Dispatch** (`handlers`) - run the category's handler, following handoffs and tool calls
//! 4. **Output gate** (`guardrails`) - reject replies that leave the support domain
//!
//! `runtime::Orchestrator` drives the stages through the core pipeline state machine and turns
//! every rejection or failure into a fixed caller-safe message. `session::ConversationService`
//! adds per-caller history and serialization on top.
//!
//! Each model-backed stage has a keyword counterpart, so the router runs fully offline unless
//! configuration asks for the provider.

pub mod builder;
pub mod classifier;
pub mod composer;
pub mod guardrails;
pub mod handlers;
pub mod keywords;
pub mod llm;
pub mod prompts;
pub mod runtime;
pub mod session;
pub mod tools;

pub use builder::{BuildError, RouterBuilder};
pub use runtime::{Orchestrator, RouteOutcome, RouteRequest, RouteStatus};
pub use session::ConversationService;
