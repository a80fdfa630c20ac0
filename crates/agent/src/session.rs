//! Caller-scoped sessions.
//!
//! Each caller gets one session holding their conversation history. Requests from the same
//! caller queue on the session lock, so their histories never interleave; requests from
//! different callers run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use switchboard_core::domain::caller::{CallerContext, CallerId};
use switchboard_core::domain::conversation::ConversationHistory;
use switchboard_core::domain::utterance::Utterance;
use tokio::sync::Mutex;

use crate::runtime::{Orchestrator, RouteOutcome, RouteRequest};

#[derive(Debug)]
pub struct Session {
    pub history: ConversationHistory,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<CallerId, Arc<Mutex<Session>>>>,
    history_limit: usize,
}

impl SessionStore {
    pub fn new(history_limit: usize) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), history_limit }
    }

    pub async fn session(&self, caller_id: &CallerId) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(caller_id.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(Session {
                history: ConversationHistory::with_limit(self.history_limit),
            }))
        });
        Arc::clone(session)
    }

    /// Looks up an existing session without creating one.
    pub async fn get(&self, caller_id: &CallerId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.lock().await.get(caller_id).map(Arc::clone)
    }

    /// Drops a caller's session. Returns whether one existed.
    pub async fn reset(&self, caller_id: &CallerId) -> bool {
        self.sessions.lock().await.remove(caller_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

/// Orchestrator plus per-caller history: the entry point used by the CLI and the server.
pub struct ConversationService {
    orchestrator: Orchestrator,
    sessions: SessionStore,
}

impl ConversationService {
    pub fn new(orchestrator: Orchestrator, history_limit: usize) -> Self {
        Self { orchestrator, sessions: SessionStore::new(history_limit) }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Routes one utterance for `caller`. Only delivered exchanges are added to history.
    pub async fn handle(
        &self,
        caller: CallerContext,
        utterance: impl Into<Utterance>,
        correlation_id: Option<String>,
    ) -> RouteOutcome {
        let session = self.sessions.session(&caller.caller_id).await;
        let mut session = session.lock().await;

        let mut request =
            RouteRequest::new(caller, utterance).with_history(session.history.clone());
        if let Some(correlation_id) = correlation_id {
            request = request.with_correlation_id(correlation_id);
        }
        let utterance = request.utterance.clone();

        let outcome = self.orchestrator.route(request).await;
        if outcome.is_delivered() {
            session.history.record_exchange(utterance.as_str(), outcome.reply.clone());
        }
        outcome
    }

    /// History of a caller that has a session. Unknown callers get `None` and no session.
    pub async fn history(&self, caller_id: &CallerId) -> Option<ConversationHistory> {
        let session = self.sessions.get(caller_id).await?;
        let session = session.lock().await;
        Some(session.history.clone())
    }

    pub async fn reset(&self, caller_id: &CallerId) -> bool {
        self.sessions.reset(caller_id).await
    }
}

#[cfg(test)]
mod tests {
    use switchboard_core::config::AppConfig;
    use switchboard_core::domain::caller::{CallerContext, CallerId};

    use super::SessionStore;
    use crate::RouterBuilder;

    #[tokio::test]
    async fn sessions_are_created_once_per_caller() {
        let store = SessionStore::new(6);
        let alice = CallerId("alice".to_string());

        let first = store.session(&alice).await;
        first.lock().await.history.record_exchange("hi", "hello");
        let second = store.session(&alice).await;

        assert_eq!(second.lock().await.history.len(), 2);
        assert_eq!(store.len().await, 1);
        assert!(store.reset(&alice).await);
        assert!(!store.reset(&alice).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn get_never_creates_sessions() {
        let store = SessionStore::new(6);
        let ghost = CallerId("ghost".to_string());

        assert!(store.get(&ghost).await.is_none());
        assert!(store.is_empty().await);
        assert!(!store.reset(&ghost).await);
    }

    #[tokio::test]
    async fn reading_history_of_unknown_caller_leaves_store_untouched() {
        let service = RouterBuilder::new(AppConfig::default()).build().expect("build");
        let never_posted = CallerId("never-posted".to_string());

        assert!(service.history(&never_posted).await.is_none());
        assert_eq!(service.sessions().len().await, 0);
        assert!(!service.reset(&never_posted).await);

        service.handle(CallerContext::new("regular", "Jane"), "price of a pencil", None).await;
        let history = service.history(&CallerId("regular".to_string())).await.expect("session exists");
        assert_eq!(history.len(), 2);
        assert_eq!(service.sessions().len().await, 1);
    }
}
