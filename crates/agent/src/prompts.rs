use serde::Serialize;
use switchboard_core::errors::ProviderError;
use tera::{Context, Tera};

pub const CLASSIFY: &str = "classify";
pub const INPUT_GATE: &str = "input_gate";
pub const OUTPUT_GATE: &str = "output_gate";
pub const COMPOSE: &str = "compose";

const CLASSIFY_TEMPLATE: &str = r#"Classify the customer message into exactly one category.
Categories:
{%- for category in categories %}
- {{ category }}
{%- endfor %}
Use `unrelated` when no other category fits.
Reply with the category name only.

Message: {{ utterance }}"#;

const INPUT_GATE_TEMPLATE: &str = r#"You screen incoming messages for a customer support desk.
The desk only handles: {{ scope }}.
Decide whether the message below is within that scope. Greetings about an in-scope problem count as in scope.
Reply with JSON only, in the form {"allowed": true, "reason": "short reason"}.

Message: {{ utterance }}"#;

const OUTPUT_GATE_TEMPLATE: &str = r#"You review replies written by the `{{ handler }}` support assistant before they reach a customer.
A reply is allowed when it stays within {{ scope }} and reveals no credentials, internal errors or other customers' data.
Reply with JSON only, in the form {"allowed": true, "reason": "short reason"}.

Customer message: {{ utterance }}
Assistant reply: {{ reply }}"#;

const COMPOSE_TEMPLATE: &str = r#"You are the {{ handler }} assistant of a customer support desk.
The customer's name is {{ caller_name }}{% if premium %} and they are a premium member{% endif %}.
Rewrite the draft answer below into a short, friendly reply addressed to the customer.
Keep every fact, amount and account id from the draft. Do not add new promises.

Customer message: {{ utterance }}
Draft answer: {{ draft }}"#;

/// Tera templates for every model-backed stage.
pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> Result<Self, ProviderError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (CLASSIFY, CLASSIFY_TEMPLATE),
            (INPUT_GATE, INPUT_GATE_TEMPLATE),
            (OUTPUT_GATE, OUTPUT_GATE_TEMPLATE),
            (COMPOSE, COMPOSE_TEMPLATE),
        ])
        .map_err(|error| ProviderError::Prompt(error.to_string()))?;
        Ok(Self { tera })
    }

    pub fn render<T: Serialize>(&self, name: &str, values: &T) -> Result<String, ProviderError> {
        let context =
            Context::from_serialize(values).map_err(|error| ProviderError::Prompt(error.to_string()))?;
        self.tera.render(name, &context).map_err(|error| ProviderError::Prompt(error.to_string()))
    }
}
