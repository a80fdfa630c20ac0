pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod pipeline;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::caller::{CallerContext, CallerId, MembershipTier};
pub use domain::category::Category;
pub use domain::conversation::ConversationHistory;
pub use domain::response::{GateVerdict, HandlerId, Response, ToolCallRecord, ToolCallStatus};
pub use domain::utterance::Utterance;
pub use errors::{ApplicationError, DomainError, InterfaceError, ProviderError};
pub use ledger::{AccountLedger, InMemoryAccountLedger, LedgerError};
pub use pipeline::{PipelineEngine, PipelineEvent, PipelineRun, PipelineState};
