pub mod engine;
pub mod states;

pub use engine::{PipelineEngine, PipelineRun, PipelineTransitionError};
pub use states::{PipelineEvent, PipelineState, TransitionOutcome};
