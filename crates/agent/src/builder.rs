use std::sync::Arc;
use std::time::Duration;

use switchboard_core::audit::{AuditSink, TracingAuditSink};
use switchboard_core::config::{AppConfig, StageStrategy};
use switchboard_core::errors::ProviderError;
use switchboard_core::ledger::{AccountLedger, InMemoryAccountLedger};
use thiserror::Error;

use crate::classifier::{IntentClassifier, KeywordClassifier, ProviderClassifier};
use crate::composer::ReplyComposer;
use crate::guardrails::{
    InputGate, KeywordInputGate, KeywordOutputGate, OutputGate, ProviderInputGate,
    ProviderOutputGate,
};
use crate::handlers::HandlerRegistry;
use crate::keywords::KeywordSet;
use crate::llm::{LlmClient, OpenAiCompatibleClient, ResilientClient};
use crate::prompts::PromptLibrary;
use crate::runtime::Orchestrator;
use crate::session::ConversationService;
use crate::tools::ToolRegistry;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("provider setup failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Wires the router from configuration. Collaborators can be swapped before `build`.
pub struct RouterBuilder {
    config: AppConfig,
    ledger: Option<Arc<dyn AccountLedger>>,
    audit: Option<Arc<dyn AuditSink>>,
    llm: Option<Arc<dyn LlmClient>>,
}

impl RouterBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config, ledger: None, audit: None, llm: None }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn AccountLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Replaces the HTTP provider client. The timeout and retry wrapper still applies.
    pub fn with_llm_client(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn build_orchestrator(self) -> Result<Orchestrator, BuildError> {
        let router = &self.config.router;
        let prompts = Arc::new(PromptLibrary::new()?);
        let client = if router.uses_provider() {
            let raw = match self.llm {
                Some(client) => client,
                None => Arc::new(OpenAiCompatibleClient::from_config(&self.config.llm)?),
            };
            Some(Arc::new(ResilientClient::from_config(raw, &self.config.llm)) as Arc<dyn LlmClient>)
        } else {
            None
        };
        let provider = |purpose: &str| {
            client.clone().ok_or_else(|| {
                ProviderError::NotConfigured(format!("{purpose} needs a provider client"))
            })
        };

        let classifier: Arc<dyn IntentClassifier> = match router.classifier {
            StageStrategy::Keyword => Arc::new(KeywordClassifier::default()),
            StageStrategy::Provider => {
                Arc::new(ProviderClassifier::new(provider("classifier")?, Arc::clone(&prompts)))
            }
        };
        let input_gate: Arc<dyn InputGate> = match router.input_gate {
            StageStrategy::Keyword => {
                Arc::new(KeywordInputGate::new(KeywordSet::new(&router.domain_terms)))
            }
            StageStrategy::Provider => {
                Arc::new(ProviderInputGate::new(provider("input gate")?, Arc::clone(&prompts)))
            }
        };
        let output_gate: Arc<dyn OutputGate> = match router.output_gate {
            StageStrategy::Keyword => Arc::new(KeywordOutputGate::new(&router.blocked_output_terms)),
            StageStrategy::Provider => {
                Arc::new(ProviderOutputGate::new(provider("output gate")?, Arc::clone(&prompts)))
            }
        };

        let ledger = self.ledger.unwrap_or_else(|| Arc::new(InMemoryAccountLedger::demo()));
        let tools = Arc::new(ToolRegistry::standard(ledger));
        let handlers = Arc::new(HandlerRegistry::standard(tools, router.max_handoffs));
        let audit = self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink));

        let mut orchestrator = Orchestrator::new(classifier, input_gate, output_gate, handlers)
            .with_audit_sink(audit)
            .with_messages(self.config.messages.clone())
            .with_request_timeout(Duration::from_secs(router.request_timeout_secs));
        if router.compose_replies {
            let composer = ReplyComposer::new(provider("reply composer")?, prompts);
            orchestrator = orchestrator.with_composer(Arc::new(composer));
        }

        Ok(orchestrator)
    }

    pub fn build(self) -> Result<ConversationService, BuildError> {
        let history_limit = self.config.router.history_limit;
        Ok(ConversationService::new(self.build_orchestrator()?, history_limit))
    }
}
