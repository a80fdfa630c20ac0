//! Category handlers and the dispatch table that routes between them.
//!
//! A handler either replies or hands the request off to another handler by id. Handoffs
//! are followed by [`HandlerRegistry::dispatch`] up to a configured limit, and the final
//! [`Response`] names the handler that actually answered.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use switchboard_core::domain::caller::CallerContext;
use switchboard_core::domain::category::Category;
use switchboard_core::domain::conversation::ConversationHistory;
use switchboard_core::domain::response::{HandlerId, Response, ToolCallRecord};
use switchboard_core::domain::utterance::Utterance;
use switchboard_core::errors::ProviderError;
use thiserror::Error;

use crate::keywords::{tokens, KeywordSet};
use crate::tools::{
    BookShelf, ToolError, ToolOutput, ToolRegistry, CHECK_AVAILABILITY, CHECK_BALANCE, LIST_BOOKS,
    LIST_PRODUCTS, REFUND, RESTART_SERVICE, SEARCH_BOOK,
};

pub const BILLING: &str = "billing";
pub const ACCOUNT: &str = "account";
pub const PRODUCT: &str = "product";
pub const TECHNICAL: &str = "technical";
pub const SUPPORT: &str = "support";
pub const LOAN: &str = "loan";
pub const TRANSACTIONS: &str = "transactions";
pub const LIBRARY: &str = "library";

/// Everything a handler may read. Owned so dispatch can run on its own task.
#[derive(Clone, Debug)]
pub struct HandlerRequest {
    pub correlation_id: String,
    pub utterance: Utterance,
    pub caller: CallerContext,
    pub history: ConversationHistory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerOutcome {
    Reply { text: String, tool_calls: Vec<ToolCallRecord> },
    Handoff { to: HandlerId, reason: String },
}

impl HandlerOutcome {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply { text: text.into(), tool_calls: Vec::new() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("no handler is routed for category `{0}`")]
    NoRoute(Category),
    #[error("handler `{0}` is not registered")]
    UnknownHandler(HandlerId),
    #[error("handoff limit of {limit} exceeded at handler `{at}`")]
    HandoffLimit { limit: usize, at: HandlerId },
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[async_trait]
pub trait Handler: Send + Sync {
    fn id(&self) -> HandlerId;
    async fn handle(
        &self,
        request: &HandlerRequest,
        tools: &ToolRegistry,
    ) -> Result<HandlerOutcome, HandlerError>;
}

pub struct HandlerRegistry {
    handlers: HashMap<HandlerId, Arc<dyn Handler>>,
    routes: HashMap<Category, HandlerId>,
    tools: Arc<ToolRegistry>,
    max_handoffs: usize,
}

impl HandlerRegistry {
    pub fn new(tools: Arc<ToolRegistry>, max_handoffs: usize) -> Self {
        Self { handlers: HashMap::new(), routes: HashMap::new(), tools, max_handoffs }
    }

    /// The built-in handlers: one per category plus the handoff-only `account`, `loan`,
    /// `transactions` and `library` handlers.
    pub fn standard(tools: Arc<ToolRegistry>, max_handoffs: usize) -> Self {
        let mut registry = Self::new(tools, max_handoffs);
        registry.register(BillingHandler::default());
        registry.register(AccountHandler);
        registry.register(LoanHandler);
        registry.register(TransactionsHandler);
        registry.register(ProductHandler::default());
        registry.register(LibraryHandler::default());
        registry.register(TechnicalHandler::default());
        registry.register(SupportHandler);
        registry.route(Category::Billing, HandlerId::new(BILLING));
        registry.route(Category::Product, HandlerId::new(PRODUCT));
        registry.route(Category::Technical, HandlerId::new(TECHNICAL));
        registry.route(Category::Unrelated, HandlerId::new(SUPPORT));
        registry
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: Handler + 'static,
    {
        self.handlers.insert(handler.id(), Arc::new(handler));
    }

    pub fn route(&mut self, category: Category, handler: HandlerId) {
        self.routes.insert(category, handler);
    }

    pub fn handler_for(&self, category: Category) -> Option<&HandlerId> {
        self.routes.get(&category)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub async fn dispatch(
        &self,
        category: Category,
        request: HandlerRequest,
    ) -> Result<Response, HandlerError> {
        let mut current =
            self.routes.get(&category).cloned().ok_or(HandlerError::NoRoute(category))?;
        let mut chain = Vec::new();

        loop {
            let handler = self
                .handlers
                .get(&current)
                .cloned()
                .ok_or_else(|| HandlerError::UnknownHandler(current.clone()))?;

            match handler.handle(&request, &self.tools).await? {
                HandlerOutcome::Reply { text, tool_calls } => {
                    let mut response = Response::new(current, text);
                    response.handoff_chain = chain;
                    response.tool_calls = tool_calls;
                    return Ok(response);
                }
                HandlerOutcome::Handoff { to, reason } => {
                    if chain.len() >= self.max_handoffs {
                        return Err(HandlerError::HandoffLimit { limit: self.max_handoffs, at: current });
                    }
                    tracing::info!(
                        event_name = "handler.handoff",
                        correlation_id = %request.correlation_id,
                        from = %current,
                        to = %to,
                        reason = %reason,
                        "handler delegated request"
                    );
                    chain.push(current);
                    current = to;
                }
            }
        }
    }
}

async fn run_tool(
    tools: &ToolRegistry,
    name: &str,
    caller: &CallerContext,
    input: serde_json::Value,
    calls: &mut Vec<ToolCallRecord>,
) -> Result<ToolOutput, HandlerError> {
    let output = tools.invoke(name, caller, input).await?;
    calls.push(output.record(name));
    Ok(output)
}

/// Refunds and charges. Balance, loan and money-movement questions are handed off.
pub struct BillingHandler {
    balance_terms: KeywordSet,
    refund_terms: KeywordSet,
    loan_terms: KeywordSet,
    transaction_terms: KeywordSet,
}

impl Default for BillingHandler {
    fn default() -> Self {
        Self {
            balance_terms: KeywordSet::new(["balance", "how much do i have", "statement"]),
            refund_terms: KeywordSet::new(["refund", "money back", "reimburse"]),
            loan_terms: KeywordSet::new(["loan", "mortgage", "interest rate", "borrow money"]),
            transaction_terms: KeywordSet::new(["deposit", "withdraw", "transfer", "send money"]),
        }
    }
}

#[async_trait]
impl Handler for BillingHandler {
    fn id(&self) -> HandlerId {
        HandlerId::new(BILLING)
    }

    async fn handle(
        &self,
        request: &HandlerRequest,
        tools: &ToolRegistry,
    ) -> Result<HandlerOutcome, HandlerError> {
        let text = request.utterance.as_str();
        let wants_refund = self.refund_terms.matches(text);
        if !wants_refund {
            let target = if self.loan_terms.matches(text) {
                Some((LOAN, "loan inquiry"))
            } else if self.transaction_terms.matches(text) {
                Some((TRANSACTIONS, "money movement"))
            } else if self.balance_terms.matches(text) {
                Some((ACCOUNT, "balance inquiry"))
            } else {
                None
            };
            if let Some((to, reason)) = target {
                return Ok(HandlerOutcome::Handoff {
                    to: HandlerId::new(to),
                    reason: reason.to_string(),
                });
            }
        }

        if !wants_refund {
            return Ok(HandlerOutcome::reply(format!(
                "Hi {}, I can help with refunds, charges and invoices. Which charge would you like to look at?",
                request.caller.name
            )));
        }

        let mut calls = Vec::new();
        let output = run_tool(tools, REFUND, &request.caller, json!({}), &mut calls).await?;
        let text = match output {
            ToolOutput::Completed(summary) => summary,
            ToolOutput::Declined { reason } => format!(
                "Sorry {}, I can't process that refund: {reason}. Let me know if there is anything else I can do.",
                request.caller.name
            ),
        };
        Ok(HandlerOutcome::Reply { text, tool_calls: calls })
    }
}

/// Account balances. Only reachable through a handoff.
pub struct AccountHandler;

#[async_trait]
impl Handler for AccountHandler {
    fn id(&self) -> HandlerId {
        HandlerId::new(ACCOUNT)
    }

    async fn handle(
        &self,
        request: &HandlerRequest,
        tools: &ToolRegistry,
    ) -> Result<HandlerOutcome, HandlerError> {
        let mut calls = Vec::new();
        let output = run_tool(tools, CHECK_BALANCE, &request.caller, json!({}), &mut calls).await?;
        let text = match output {
            ToolOutput::Completed(summary) => summary,
            ToolOutput::Declined { reason } => {
                format!("Please sign in first: {reason}.")
            }
        };
        Ok(HandlerOutcome::Reply { text, tool_calls: calls })
    }
}

/// Loan basics. Only reachable through a handoff from `billing`.
pub struct LoanHandler;

#[async_trait]
impl Handler for LoanHandler {
    fn id(&self) -> HandlerId {
        HandlerId::new(LOAN)
    }

    async fn handle(
        &self,
        request: &HandlerRequest,
        _tools: &ToolRegistry,
    ) -> Result<HandlerOutcome, HandlerError> {
        let premium_note = if request.caller.is_premium() {
            " As a premium member you also qualify for our reduced-rate personal loan."
        } else {
            ""
        };
        Ok(HandlerOutcome::reply(format!(
            "Hi {}, we offer personal, auto and home loans with terms from 12 to 60 months. \
             Eligibility depends on your income and account history, and the interest rate is \
             fixed for the whole term.{premium_note} To start an application, tell me the loan type \
             and the amount you need.",
            request.caller.name
        )))
    }
}

/// Deposits, withdrawals and transfers. Only reachable through a handoff from `billing`.
pub struct TransactionsHandler;

#[async_trait]
impl Handler for TransactionsHandler {
    fn id(&self) -> HandlerId {
        HandlerId::new(TRANSACTIONS)
    }

    async fn handle(
        &self,
        request: &HandlerRequest,
        _tools: &ToolRegistry,
    ) -> Result<HandlerOutcome, HandlerError> {
        let caller = &request.caller;
        if !caller.authenticated {
            return Ok(HandlerOutcome::reply(format!(
                "Hi {}, please sign in before we move any money. Once you are signed in I can help \
                 with deposits, withdrawals and transfers.",
                caller.name
            )));
        }
        let account = match &caller.account_id {
            Some(account) => format!("account {}", account.0),
            None => "your account".to_string(),
        };
        Ok(HandlerOutcome::reply(format!(
            "Sure {}, I can help with that on {account}. Which amount would you like to move, and \
             for a transfer, which account should receive it?",
            caller.name
        )))
    }
}

/// Stationery catalog. Questions about books are handed off to `library`.
pub struct ProductHandler {
    book_terms: KeywordSet,
}

impl Default for ProductHandler {
    fn default() -> Self {
        Self { book_terms: KeywordSet::new(["book", "library", "author", "copies"]) }
    }
}

#[async_trait]
impl Handler for ProductHandler {
    fn id(&self) -> HandlerId {
        HandlerId::new(PRODUCT)
    }

    async fn handle(
        &self,
        request: &HandlerRequest,
        tools: &ToolRegistry,
    ) -> Result<HandlerOutcome, HandlerError> {
        if self.book_terms.matches(request.utterance.as_str()) {
            return Ok(HandlerOutcome::Handoff {
                to: HandlerId::new(LIBRARY),
                reason: "library question".to_string(),
            });
        }

        let words = tokens(request.utterance.as_str());
        let item = ["pencil", "eraser", "notebook"]
            .into_iter()
            .find(|item| words.iter().any(|word| word.starts_with(item)));
        let input = match item {
            Some(item) => json!({ "item": item }),
            None => json!({}),
        };

        let mut calls = Vec::new();
        let output = run_tool(tools, LIST_PRODUCTS, &request.caller, input, &mut calls).await?;
        let text = match (item, output) {
            (Some(_), ToolOutput::Completed(summary)) => summary,
            (None, ToolOutput::Completed(summary)) => format!("Here is what we carry:\n{summary}"),
            (_, ToolOutput::Declined { reason }) => format!("I can't look that up right now: {reason}."),
        };
        Ok(HandlerOutcome::Reply { text, tool_calls: calls })
    }
}

pub struct TechnicalHandler {
    restart_terms: KeywordSet,
}

impl Default for TechnicalHandler {
    fn default() -> Self {
        Self {
            restart_terms: KeywordSet::new(["restart", "reboot", "down", "not working", "outage", "crash"]),
        }
    }
}

#[async_trait]
impl Handler for TechnicalHandler {
    fn id(&self) -> HandlerId {
        HandlerId::new(TECHNICAL)
    }

    async fn handle(
        &self,
        request: &HandlerRequest,
        tools: &ToolRegistry,
    ) -> Result<HandlerOutcome, HandlerError> {
        if !self.restart_terms.matches(request.utterance.as_str()) {
            return Ok(HandlerOutcome::reply(
                "Sorry about the trouble. Could you share the exact error message and when it started? \
                 If the service is unresponsive I can restart it for you.",
            ));
        }

        let mut calls = Vec::new();
        let output = run_tool(tools, RESTART_SERVICE, &request.caller, json!({}), &mut calls).await?;
        let text = match output {
            ToolOutput::Completed(summary) => {
                format!("{summary} Give it a minute and let me know if the problem persists.")
            }
            ToolOutput::Declined { reason } => format!("I couldn't restart it: {reason}."),
        };
        Ok(HandlerOutcome::Reply { text, tool_calls: calls })
    }
}

/// Book lookups. A named title gets a search plus an availability check; anything else gets
/// the member-only book list.
#[derive(Default)]
pub struct LibraryHandler {
    shelf: BookShelf,
}

#[async_trait]
impl Handler for LibraryHandler {
    fn id(&self) -> HandlerId {
        HandlerId::new(LIBRARY)
    }

    async fn handle(
        &self,
        request: &HandlerRequest,
        tools: &ToolRegistry,
    ) -> Result<HandlerOutcome, HandlerError> {
        let caller = &request.caller;
        let mut calls = Vec::new();

        if let Some(book) = self.shelf.mentioned_in(request.utterance.as_str()) {
            let input = json!({ "title": book.title });
            let found = run_tool(tools, SEARCH_BOOK, caller, input.clone(), &mut calls).await?;
            let copies = run_tool(tools, CHECK_AVAILABILITY, caller, input, &mut calls).await?;
            let text = match (found, copies) {
                (ToolOutput::Completed(found), ToolOutput::Completed(copies)) => {
                    format!("{found} {copies}")
                }
                (ToolOutput::Declined { reason }, _) | (_, ToolOutput::Declined { reason }) => {
                    format!("I can't look that book up right now: {reason}.")
                }
            };
            return Ok(HandlerOutcome::Reply { text, tool_calls: calls });
        }

        let output = run_tool(tools, LIST_BOOKS, caller, json!({}), &mut calls).await?;
        let text = match output {
            ToolOutput::Completed(list) => {
                format!("Hello {}, here is what is on our shelves:\n{list}", caller.name)
            }
            ToolOutput::Declined { reason } => format!(
                "Sorry {}, {reason}. I can still check a specific title for you if you tell me its name.",
                caller.name
            ),
        };
        Ok(HandlerOutcome::Reply { text, tool_calls: calls })
    }
}

/// Catch-all for in-scope utterances the classifier could not place.
pub struct SupportHandler;

#[async_trait]
impl Handler for SupportHandler {
    fn id(&self) -> HandlerId {
        HandlerId::new(SUPPORT)
    }

    async fn handle(
        &self,
        request: &HandlerRequest,
        _tools: &ToolRegistry,
    ) -> Result<HandlerOutcome, HandlerError> {
        Ok(HandlerOutcome::reply(format!(
            "Hi {}, I can help with billing, banking, products, books and technical issues. Could you tell me a bit more about what you need?",
            request.caller.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use switchboard_core::domain::caller::CallerContext;
    use switchboard_core::domain::category::Category;
    use switchboard_core::domain::conversation::ConversationHistory;
    use switchboard_core::domain::response::{HandlerId, ToolCallStatus};
    use switchboard_core::domain::utterance::Utterance;
    use switchboard_core::ledger::InMemoryAccountLedger;

    use super::{
        Handler, HandlerError, HandlerOutcome, HandlerRegistry, HandlerRequest, ACCOUNT, BILLING,
        LIBRARY, LOAN, PRODUCT, SUPPORT, TECHNICAL, TRANSACTIONS,
    };
    use crate::tools::ToolRegistry;

    fn registry() -> HandlerRegistry {
        let tools = ToolRegistry::standard(Arc::new(InMemoryAccountLedger::demo()));
        HandlerRegistry::standard(Arc::new(tools), 3)
    }

    fn request(text: &str, caller: CallerContext) -> HandlerRequest {
        HandlerRequest {
            correlation_id: "req-test".to_string(),
            utterance: Utterance::new(text),
            caller,
            history: ConversationHistory::default(),
        }
    }

    struct LoopingHandler;

    #[async_trait]
    impl Handler for LoopingHandler {
        fn id(&self) -> HandlerId {
            HandlerId::new("loop")
        }

        async fn handle(
            &self,
            _request: &HandlerRequest,
            _tools: &ToolRegistry,
        ) -> Result<HandlerOutcome, HandlerError> {
            Ok(HandlerOutcome::Handoff { to: HandlerId::new("loop"), reason: "again".to_string() })
        }
    }

    #[test]
    fn every_category_has_a_route() {
        let registry = registry();
        for category in Category::ALL {
            assert!(registry.handler_for(category).is_some(), "category {category}");
        }
        assert_eq!(registry.tools().len(), 7);
    }

    #[tokio::test]
    async fn balance_question_is_handed_off_to_account() {
        let caller = CallerContext::new("c-1", "Areeba Irfan").authenticated().with_account("ACC-1003");
        let response = registry()
            .dispatch(Category::Billing, request("What is my balance?", caller))
            .await
            .expect("dispatch succeeds");

        assert_eq!(response.handler, HandlerId::new(ACCOUNT));
        assert_eq!(response.handoff_chain, vec![HandlerId::new(BILLING)]);
        assert!(response.text.contains("87.40"));
    }

    #[tokio::test]
    async fn declined_refund_becomes_a_polite_reply() {
        let caller = CallerContext::new("c-2", "Jane Smith").with_account("ACC-1001");
        let response = registry()
            .dispatch(Category::Billing, request("I want a refund", caller))
            .await
            .expect("dispatch succeeds");

        assert_eq!(response.handler, HandlerId::new(BILLING));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].status, ToolCallStatus::Declined);
        assert!(response.text.contains("premium"));
    }

    #[tokio::test]
    async fn product_and_technical_use_their_tools() {
        let caller = CallerContext::new("c-3", "Guest");
        let registry = registry();

        let product = registry
            .dispatch(Category::Product, request("How much is an Eraser?", caller.clone()))
            .await
            .expect("dispatch succeeds");
        assert_eq!(product.handler, HandlerId::new(PRODUCT));
        assert!(product.text.contains("Dollar brand"));

        let technical = registry
            .dispatch(Category::Technical, request("please restart my service", caller.clone()))
            .await
            .expect("dispatch succeeds");
        assert_eq!(technical.handler, HandlerId::new(TECHNICAL));
        assert!(technical.text.contains("restarted for Guest"));

        let support = registry
            .dispatch(Category::Unrelated, request("support please", caller))
            .await
            .expect("dispatch succeeds");
        assert_eq!(support.handler, HandlerId::new(SUPPORT));
    }

    #[tokio::test]
    async fn banking_questions_are_handed_off_from_billing() {
        let registry = registry();
        let caller = CallerContext::new("c-6", "Hania").premium();

        let loan = registry
            .dispatch(Category::Billing, request("Can I get a LOAN for a car?", caller.clone()))
            .await
            .expect("dispatch succeeds");
        assert_eq!(loan.handler, HandlerId::new(LOAN));
        assert_eq!(loan.handoff_chain, vec![HandlerId::new(BILLING)]);
        assert!(loan.text.contains("premium member"));

        let anonymous = registry
            .dispatch(Category::Billing, request("I want to deposit cash", caller.clone()))
            .await
            .expect("dispatch succeeds");
        assert_eq!(anonymous.handler, HandlerId::new(TRANSACTIONS));
        assert!(anonymous.text.contains("sign in"));

        let signed_in = caller.authenticated().with_account("ACC-1002");
        let transfer = registry
            .dispatch(Category::Billing, request("transfer 20 to my sister", signed_in))
            .await
            .expect("dispatch succeeds");
        assert_eq!(transfer.handler, HandlerId::new(TRANSACTIONS));
        assert!(transfer.text.contains("ACC-1002"));
    }

    #[tokio::test]
    async fn refund_wins_over_money_movement_words() {
        let caller = CallerContext::new("c-7", "Hania").premium().with_account("ACC-1002");
        let response = registry()
            .dispatch(Category::Billing, request("refund the transfer fee", caller))
            .await
            .expect("dispatch succeeds");
        assert_eq!(response.handler, HandlerId::new(BILLING));
        assert!(response.handoff_chain.is_empty());
    }

    #[tokio::test]
    async fn book_questions_reach_the_library() {
        let registry = registry();
        let visitor = CallerContext::new("c-8", "Areeba Irfan");

        let title = registry
            .dispatch(Category::Product, request("Is atomic habits in the library?", visitor.clone()))
            .await
            .expect("dispatch succeeds");
        assert_eq!(title.handler, HandlerId::new(LIBRARY));
        assert_eq!(title.handoff_chain, vec![HandlerId::new(PRODUCT)]);
        assert_eq!(title.tool_calls.len(), 2);
        assert!(title.text.contains("James Clear"));
        assert!(title.text.contains("3 copies"));

        let declined = registry
            .dispatch(Category::Product, request("which books do you have?", visitor.clone()))
            .await
            .expect("dispatch succeeds");
        assert_eq!(declined.tool_calls[0].status, ToolCallStatus::Declined);
        assert!(declined.text.contains("library members"));

        let listed = registry
            .dispatch(Category::Product, request("which books do you have?", visitor.with_member_id("231")))
            .await
            .expect("dispatch succeeds");
        assert_eq!(listed.tool_calls[0].status, ToolCallStatus::Completed);
        assert!(listed.text.contains("The 10X Rule by Grant Cardone"));
    }

    #[tokio::test]
    async fn handoff_cycles_are_cut_off() {
        let tools = Arc::new(ToolRegistry::default());
        let mut registry = HandlerRegistry::new(tools, 2);
        registry.register(LoopingHandler);
        registry.route(Category::Billing, HandlerId::new("loop"));

        let error = registry
            .dispatch(Category::Billing, request("refund", CallerContext::new("c-4", "Guest")))
            .await
            .expect_err("cycle detected");
        assert!(matches!(error, HandlerError::HandoffLimit { limit: 2, .. }));
    }

    #[tokio::test]
    async fn missing_route_is_reported() {
        let registry = HandlerRegistry::new(Arc::new(ToolRegistry::default()), 1);
        let error = registry
            .dispatch(Category::Product, request("pencil", CallerContext::new("c-5", "Guest")))
            .await
            .expect_err("no route");
        assert_eq!(error, HandlerError::NoRoute(Category::Product));
    }
}
