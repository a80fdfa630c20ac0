use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use switchboard_core::domain::category::Category;
use switchboard_core::domain::utterance::Utterance;
use switchboard_core::errors::ProviderError;

use crate::keywords::KeywordSet;
use crate::llm::{GenerationContext, LlmClient};
use crate::prompts::{PromptLibrary, CLASSIFY};

/// Maps an utterance to exactly one [`Category`].
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, utterance: &Utterance) -> Result<Category, ProviderError>;
}

/// Static keyword rules, checked in order. The first matching category wins and anything
/// unmatched is `Unrelated`.
#[derive(Clone, Debug)]
pub struct KeywordClassifier {
    rules: Vec<(Category, KeywordSet)>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(vec![
            (
                Category::Billing,
                KeywordSet::new([
                    "refund", "charge", "invoice", "payment", "pay", "bill", "balance", "money",
                    "subscription", "deposit", "withdraw", "transfer", "loan", "mortgage",
                ]),
            ),
            (
                Category::Technical,
                KeywordSet::new([
                    "service", "error", "technical", "restart", "crash", "bug", "login",
                    "password reset", "outage", "not working", "down",
                ]),
            ),
            (
                Category::Product,
                KeywordSet::new([
                    "product", "pencil", "eraser", "notebook", "stationery", "price", "item",
                    "stock", "catalog", "order", "buy", "purchase", "book", "library", "author",
                ]),
            ),
        ])
    }
}

impl KeywordClassifier {
    pub fn new(rules: Vec<(Category, KeywordSet)>) -> Self {
        Self { rules }
    }

    pub fn classify_text(&self, text: &str) -> Category {
        self.rules
            .iter()
            .find(|(_, keywords)| keywords.matches(text))
            .map(|(category, _)| *category)
            .unwrap_or(Category::Unrelated)
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, utterance: &Utterance) -> Result<Category, ProviderError> {
        Ok(self.classify_text(utterance.as_str()))
    }
}

/// Asks the model for a category name. Replies outside the closed set map to `Unrelated`.
pub struct ProviderClassifier {
    client: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl ProviderClassifier {
    pub fn new(client: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { client, prompts }
    }
}

#[async_trait]
impl IntentClassifier for ProviderClassifier {
    async fn classify(&self, utterance: &Utterance) -> Result<Category, ProviderError> {
        let categories: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
        let prompt = self.prompts.render(
            CLASSIFY,
            &json!({ "categories": categories, "utterance": utterance.as_str() }),
        )?;
        let context = GenerationContext::with_instructions(
            "You are a routing classifier. Answer with a single lowercase word.",
        );

        let reply = self.client.generate(&prompt, Some(&context)).await?;
        let category = Category::parse_or_unrelated(&reply);
        tracing::debug!(
            event_name = "classifier.provider_reply",
            reply = %reply,
            category = %category,
            "provider classification parsed"
        );
        Ok(category)
    }
}
