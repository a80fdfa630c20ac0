use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Caller-scoped multi-turn history. Passed explicitly into each request; the oldest
/// turns are dropped once `limit` is exceeded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    limit: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::with_limit(20)
    }
}

impl ConversationHistory {
    pub fn with_limit(limit: usize) -> Self {
        Self { turns: Vec::new(), limit: limit.max(2) }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, role: TurnRole, text: impl Into<String>) {
        self.turns.push(Turn { role, text: text.into(), at: Utc::now() });
        if self.turns.len() > self.limit {
            let overflow = self.turns.len() - self.limit;
            self.turns.drain(..overflow);
        }
    }

    pub fn record_exchange(&mut self, utterance: impl Into<String>, reply: impl Into<String>) {
        self.push(TurnRole::User, utterance);
        self.push(TurnRole::Assistant, reply);
    }

    /// Plain-text transcript used when rendering prompts.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|turn| match turn.role {
                TurnRole::User => format!("user: {}", turn.text),
                TurnRole::Assistant => format!("assistant: {}", turn.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationHistory, TurnRole};

    #[test]
    fn history_drops_oldest_turns_past_limit() {
        let mut history = ConversationHistory::with_limit(4);
        history.record_exchange("one", "reply one");
        history.record_exchange("two", "reply two");
        history.record_exchange("three", "reply three");

        assert_eq!(history.len(), 4);
        assert_eq!(history.turns()[0].text, "two");
        assert_eq!(history.turns()[3].role, TurnRole::Assistant);
    }

    #[test]
    fn transcript_labels_roles() {
        let mut history = ConversationHistory::default();
        history.record_exchange("hi", "hello");
        assert_eq!(history.transcript(), "user: hi\nassistant: hello");
    }
}
