use std::sync::Arc;

use serde_json::json;
use switchboard_core::domain::caller::CallerContext;
use switchboard_core::domain::conversation::ConversationHistory;
use switchboard_core::domain::response::Response;
use switchboard_core::domain::utterance::Utterance;
use switchboard_core::errors::ProviderError;

use crate::llm::{GenerationContext, LlmClient};
use crate::prompts::{PromptLibrary, COMPOSE};

/// Rewrites a handler's draft into a personalized reply with the model. The draft's facts
/// come from tools; the model only changes the wording.
pub struct ReplyComposer {
    client: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl ReplyComposer {
    pub fn new(client: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { client, prompts }
    }

    pub async fn compose(
        &self,
        utterance: &Utterance,
        caller: &CallerContext,
        history: &ConversationHistory,
        draft: &Response,
    ) -> Result<String, ProviderError> {
        let prompt = self.prompts.render(
            COMPOSE,
            &json!({
                "handler": draft.handler.as_str(),
                "caller_name": caller.name,
                "premium": caller.is_premium(),
                "utterance": utterance.as_str(),
                "draft": draft.text,
            }),
        )?;
        let context = GenerationContext::with_instructions(
            "You write replies for customer support. Stay concise and factual.",
        )
        .transcript(history.transcript());

        let reply = self.client.generate(&prompt, Some(&context)).await?;
        if reply.trim().is_empty() {
            return Err(ProviderError::Malformed("composer returned an empty reply".to_string()));
        }
        Ok(reply)
    }
}
