//! Seam to the external generative-model provider.
//!
//! Every stage that talks to a model goes through [`LlmClient`], so tests can swap in a
//! scripted client and the binaries can wrap the HTTP client in [`ResilientClient`].

use async_trait::async_trait;
use switchboard_core::errors::ProviderError;

pub mod openai;
pub mod retry;

pub use openai::OpenAiCompatibleClient;
pub use retry::{ResilientClient, RetryPolicy};

/// Optional extra context sent alongside a prompt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationContext {
    /// System-level instructions for the model.
    pub instructions: Option<String>,
    /// Prior turns rendered as `role: text` lines.
    pub transcript: Option<String>,
}

impl GenerationContext {
    pub fn with_instructions(instructions: impl Into<String>) -> Self {
        Self { instructions: Some(instructions.into()), transcript: None }
    }

    pub fn transcript(mut self, transcript: impl Into<String>) -> Self {
        let transcript = transcript.into();
        self.transcript = (!transcript.trim().is_empty()).then_some(transcript);
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        context: Option<&GenerationContext>,
    ) -> Result<String, ProviderError>;
}
