//! Input and output gates.
//!
//! Gates only judge; they never mutate the utterance or the response. The keyword gates are
//! pure functions of their input, and the provider gates delegate the judgement to the model.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use switchboard_core::domain::response::{GateVerdict, Response};
use switchboard_core::domain::utterance::Utterance;
use switchboard_core::errors::ProviderError;

use crate::keywords::KeywordSet;
use crate::llm::{GenerationContext, LlmClient};
use crate::prompts::{PromptLibrary, INPUT_GATE, OUTPUT_GATE};

pub const EMPTY_UTTERANCE: &str = "empty utterance";
pub const OUT_OF_DOMAIN: &str = "utterance is outside the supported support domains";
pub const EMPTY_RESPONSE: &str = "empty response";

const SUPPORT_SCOPE: &str = "billing and refunds, account balances, loans, deposits and transfers, \
     products and stock, library books, technical problems";

/// Runs before any handler sees the utterance.
#[async_trait]
pub trait InputGate: Send + Sync {
    async fn check(&self, utterance: &Utterance) -> Result<GateVerdict, ProviderError>;
}

/// Runs after the handler and before delivery.
#[async_trait]
pub trait OutputGate: Send + Sync {
    async fn check(
        &self,
        utterance: &Utterance,
        response: &Response,
    ) -> Result<GateVerdict, ProviderError>;
}

/// Accepts utterances that mention at least one domain term.
#[derive(Clone, Debug)]
pub struct KeywordInputGate {
    domain_terms: KeywordSet,
}

impl KeywordInputGate {
    pub fn new(domain_terms: KeywordSet) -> Self {
        Self { domain_terms }
    }

    pub fn evaluate(&self, utterance: &Utterance) -> GateVerdict {
        if utterance.is_blank() {
            return GateVerdict::reject(EMPTY_UTTERANCE);
        }
        match self.domain_terms.find_in(utterance.as_str()) {
            Some(term) => GateVerdict::accept(format!("in domain: matched `{term}`")),
            None => GateVerdict::reject(OUT_OF_DOMAIN),
        }
    }
}

#[async_trait]
impl InputGate for KeywordInputGate {
    async fn check(&self, utterance: &Utterance) -> Result<GateVerdict, ProviderError> {
        Ok(self.evaluate(utterance))
    }
}

/// Rejects empty replies and replies that contain blocked terms.
#[derive(Clone, Debug)]
pub struct KeywordOutputGate {
    blocked_terms: Vec<String>,
}

impl KeywordOutputGate {
    pub fn new<I, S>(blocked_terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blocked_terms = blocked_terms
            .into_iter()
            .map(|term| term.as_ref().trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();
        Self { blocked_terms }
    }

    pub fn evaluate(&self, response: &Response) -> GateVerdict {
        if response.text.trim().is_empty() {
            return GateVerdict::reject(EMPTY_RESPONSE);
        }
        let text = response.text.to_lowercase();
        match self.blocked_terms.iter().find(|term| text.contains(term.as_str())) {
            Some(term) => GateVerdict::reject(format!("response contains blocked term `{term}`")),
            None => GateVerdict::accept("response within policy"),
        }
    }
}

#[async_trait]
impl OutputGate for KeywordOutputGate {
    async fn check(
        &self,
        _utterance: &Utterance,
        response: &Response,
    ) -> Result<GateVerdict, ProviderError> {
        Ok(self.evaluate(response))
    }
}

/// Secondary in-domain classification by the model.
pub struct ProviderInputGate {
    client: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl ProviderInputGate {
    pub fn new(client: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { client, prompts }
    }
}

#[async_trait]
impl InputGate for ProviderInputGate {
    async fn check(&self, utterance: &Utterance) -> Result<GateVerdict, ProviderError> {
        if utterance.is_blank() {
            return Ok(GateVerdict::reject(EMPTY_UTTERANCE));
        }
        let prompt = self.prompts.render(
            INPUT_GATE,
            &json!({ "scope": SUPPORT_SCOPE, "utterance": utterance.as_str() }),
        )?;
        let context = GenerationContext::with_instructions(GATE_INSTRUCTIONS);
        let reply = self.client.generate(&prompt, Some(&context)).await?;
        parse_verdict(&reply)
    }
}

pub struct ProviderOutputGate {
    client: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl ProviderOutputGate {
    pub fn new(client: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { client, prompts }
    }
}

#[async_trait]
impl OutputGate for ProviderOutputGate {
    async fn check(
        &self,
        utterance: &Utterance,
        response: &Response,
    ) -> Result<GateVerdict, ProviderError> {
        if response.text.trim().is_empty() {
            return Ok(GateVerdict::reject(EMPTY_RESPONSE));
        }
        let prompt = self.prompts.render(
            OUTPUT_GATE,
            &json!({
                "handler": response.handler.as_str(),
                "scope": SUPPORT_SCOPE,
                "utterance": utterance.as_str(),
                "reply": response.text,
            }),
        )?;
        let context = GenerationContext::with_instructions(GATE_INSTRUCTIONS);
        let reply = self.client.generate(&prompt, Some(&context)).await?;
        parse_verdict(&reply)
    }
}

const GATE_INSTRUCTIONS: &str = "You are a strict policy checker. Output a single JSON object.";

#[derive(Deserialize)]
struct VerdictPayload {
    allowed: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Reads the first JSON object in a model reply, tolerating code fences and surrounding prose.
pub fn parse_verdict(reply: &str) -> Result<GateVerdict, ProviderError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => return Err(ProviderError::Malformed(format!("no verdict object in `{reply}`"))),
    };

    let payload: VerdictPayload =
        serde_json::from_str(body).map_err(|error| ProviderError::Malformed(error.to_string()))?;
    let reason = payload.reason.filter(|reason| !reason.trim().is_empty());

    Ok(if payload.allowed {
        GateVerdict::accept(reason.unwrap_or_else(|| "allowed by provider".to_string()))
    } else {
        GateVerdict::reject(reason.unwrap_or_else(|| "rejected by provider".to_string()))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use switchboard_core::config::DEFAULT_DOMAIN_TERMS;
    use switchboard_core::domain::response::{HandlerId, Response};
    use switchboard_core::domain::utterance::Utterance;
    use switchboard_core::errors::ProviderError;

    use super::{
        parse_verdict, InputGate, KeywordInputGate, KeywordOutputGate, OutputGate,
        ProviderInputGate, ProviderOutputGate, EMPTY_RESPONSE, EMPTY_UTTERANCE, OUT_OF_DOMAIN,
    };
    use crate::keywords::KeywordSet;
    use crate::llm::{GenerationContext, LlmClient};
    use crate::prompts::PromptLibrary;

    struct CountingClient {
        calls: AtomicUsize,
        reply: &'static str,
        last_prompt: Mutex<Option<String>>,
    }

    impl CountingClient {
        fn replying(reply: &'static str) -> Self {
            Self { calls: AtomicUsize::new(0), reply, last_prompt: Mutex::new(None) }
        }
    }

    #[async_trait]
    impl LlmClient for CountingClient {
        async fn generate(
            &self,
            prompt: &str,
            _context: Option<&GenerationContext>,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().expect("prompt lock") = Some(prompt.to_string());
            Ok(self.reply.to_string())
        }
    }

    fn default_input_gate() -> KeywordInputGate {
        KeywordInputGate::new(KeywordSet::new(DEFAULT_DOMAIN_TERMS.iter().copied()))
    }

    #[test]
    fn off_topic_homework_is_rejected() {
        let gate = default_input_gate();
        let verdict = gate.evaluate(&Utterance::new("Help me solve my math homework: 2x + 3 = 11"));
        assert!(verdict.tripped());
        assert_eq!(verdict.reason, OUT_OF_DOMAIN);
    }

    #[test]
    fn domain_words_hidden_inside_other_words_are_rejected() {
        let gate = default_input_gate();
        for text in [
            "Tell me about Paganini's caprices",
            "Write a poem about the border",
            "Who won the war of terror",
        ] {
            let verdict = gate.evaluate(&Utterance::new(text));
            assert!(verdict.tripped(), "text: {text:?}, reason: {}", verdict.reason);
            assert_eq!(verdict.reason, OUT_OF_DOMAIN);
        }
    }

    #[test]
    fn blank_utterance_is_rejected_as_empty() {
        let gate = default_input_gate();
        for text in ["", "   ", "\n\t"] {
            let verdict = gate.evaluate(&Utterance::new(text));
            assert!(verdict.tripped());
            assert_eq!(verdict.reason, EMPTY_UTTERANCE);
        }
    }

    #[test]
    fn in_domain_questions_pass() {
        let gate = default_input_gate();
        for text in ["I want a refund", "What is my BALANCE?", "the service is down", "price of a notebook"] {
            assert!(gate.evaluate(&Utterance::new(text)).accepted, "text: {text:?}");
        }
    }

    #[test]
    fn keyword_input_gate_is_idempotent() {
        let gate = default_input_gate();
        for text in ["I want a refund", "Tell me a joke", ""] {
            let utterance = Utterance::new(text);
            assert_eq!(gate.evaluate(&utterance), gate.evaluate(&utterance));
        }
    }

    #[test]
    fn output_gate_blocks_leaky_replies() {
        let gate = KeywordOutputGate::new(["api key", "stack trace"]);
        let leaky = Response::new(HandlerId::new("billing"), "Your API KEY is sk-123");
        let clean = Response::new(HandlerId::new("billing"), "Refund processed for Hania.");
        let empty = Response::new(HandlerId::new("billing"), "  ");

        assert!(gate.evaluate(&leaky).tripped());
        assert!(gate.evaluate(&clean).accepted);
        assert!(gate.evaluate(&empty).tripped());
    }

    #[test]
    fn verdicts_are_parsed_from_fenced_replies() {
        let verdict = parse_verdict("```json\n{\"allowed\": false, \"reason\": \"math homework\"}\n```")
            .expect("parses");
        assert!(verdict.tripped());
        assert_eq!(verdict.reason, "math homework");

        assert!(parse_verdict("{\"allowed\": true}").expect("parses").accepted);
        assert!(matches!(parse_verdict("sure!"), Err(ProviderError::Malformed(_))));
    }

    #[tokio::test]
    async fn provider_gate_skips_model_for_blank_input() {
        let client = Arc::new(CountingClient::replying(r#"{"allowed": true, "reason": "ok"}"#));
        let prompts = Arc::new(PromptLibrary::new().expect("templates compile"));
        let gate = ProviderInputGate::new(client.clone(), prompts);

        let blank = gate.check(&Utterance::new(" ")).await.expect("verdict");
        assert_eq!(blank.reason, EMPTY_UTTERANCE);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);

        let verdict = gate.check(&Utterance::new("refund")).await.expect("verdict");
        assert!(verdict.accepted);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_output_gate_sends_reply_and_handler_to_model() {
        let client = Arc::new(CountingClient::replying(
            r#"{"allowed": false, "reason": "mentions internal tooling"}"#,
        ));
        let prompts = Arc::new(PromptLibrary::new().expect("templates compile"));
        let gate = ProviderOutputGate::new(client.clone(), prompts);
        let utterance = Utterance::new("is the service down?");

        let blank = gate
            .check(&utterance, &Response::new(HandlerId::new("technical"), " \n"))
            .await
            .expect("verdict");
        assert!(blank.tripped());
        assert_eq!(blank.reason, EMPTY_RESPONSE);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);

        let response = Response::new(HandlerId::new("technical"), "We restarted node web-7 for you.");
        let verdict = gate.check(&utterance, &response).await.expect("verdict");
        assert!(verdict.tripped());
        assert_eq!(verdict.reason, "mentions internal tooling");
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        let prompt = client.last_prompt.lock().expect("prompt lock").clone().unwrap_or_default();
        assert!(prompt.contains("We restarted node web-7 for you."), "prompt: {prompt}");
        assert!(prompt.contains("technical"), "prompt: {prompt}");
        assert!(prompt.contains("is the service down?"), "prompt: {prompt}");
    }
}
