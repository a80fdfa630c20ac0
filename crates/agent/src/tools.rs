use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use switchboard_core::domain::account::AccountId;
use switchboard_core::domain::caller::CallerContext;
use switchboard_core::domain::response::{ToolCallRecord, ToolCallStatus};
use switchboard_core::ledger::{AccountLedger, LedgerError};
use thiserror::Error;

use crate::keywords::tokens;

pub const REFUND: &str = "refund";
pub const CHECK_BALANCE: &str = "check_balance";
pub const RESTART_SERVICE: &str = "restart_service";
pub const LIST_PRODUCTS: &str = "list_products";
pub const SEARCH_BOOK: &str = "search_book";
pub const CHECK_AVAILABILITY: &str = "check_availability";
pub const LIST_BOOKS: &str = "list_books";

/// Result of a tool call that ran to completion. A declined call is a normal outcome, not an
/// error: the conversation continues with the decline explained to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutput {
    Completed(String),
    Declined { reason: String },
}

impl ToolOutput {
    pub fn record(&self, tool: &str) -> ToolCallRecord {
        match self {
            Self::Completed(summary) => ToolCallRecord {
                tool: tool.to_string(),
                status: ToolCallStatus::Completed,
                summary: summary.clone(),
            },
            Self::Declined { reason } => ToolCallRecord {
                tool: tool.to_string(),
                status: ToolCallStatus::Declined,
                summary: reason.clone(),
            },
        }
    }

    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined { .. })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool `{0}` is not registered")]
    UnknownTool(String),
    #[error("invalid input for tool `{tool}`: {message}")]
    InvalidInput { tool: &'static str, message: String },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Capability a caller must hold before a tool body does any work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    Premium,
    Authenticated,
    Member,
}

/// Returns the decline to hand back when `caller` lacks `permission`.
pub fn check_permission(caller: &CallerContext, permission: Permission) -> Option<ToolOutput> {
    match permission {
        Permission::Premium if !caller.is_premium() => Some(ToolOutput::Declined {
            reason: "refunds are reserved for premium members".to_string(),
        }),
        Permission::Authenticated if !caller.authenticated => Some(ToolOutput::Declined {
            reason: "account details are only shared with signed-in callers".to_string(),
        }),
        Permission::Member if !caller.is_member() => Some(ToolOutput::Declined {
            reason: "the full book list is only shared with library members".to_string(),
        }),
        _ => None,
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, caller: &CallerContext, input: Value) -> Result<ToolOutput, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry holding every built-in tool, backed by `ledger`.
    pub fn standard(ledger: Arc<dyn AccountLedger>) -> Self {
        let mut registry = Self::default();
        registry.register(RefundTool::new(Arc::clone(&ledger)));
        registry.register(CheckBalanceTool::new(ledger));
        registry.register(RestartServiceTool);
        registry.register(ListProductsTool::default());

        let shelf = Arc::new(BookShelf::default());
        registry.register(SearchBookTool::new(Arc::clone(&shelf)));
        registry.register(CheckAvailabilityTool::new(Arc::clone(&shelf)));
        registry.register(ListBooksTool::new(shelf));
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn invoke(
        &self,
        name: &str,
        caller: &CallerContext,
        input: Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let result = tool.execute(caller, input).await;
        match &result {
            Ok(output) => tracing::info!(
                event_name = "tool.invoked",
                tool = name,
                caller_id = %caller.caller_id.0,
                declined = output.is_declined(),
                "tool call finished"
            ),
            Err(error) => tracing::warn!(
                event_name = "tool.failed",
                tool = name,
                caller_id = %caller.caller_id.0,
                error = %error,
                "tool call failed"
            ),
        }
        result
    }
}

pub struct RefundTool {
    ledger: Arc<dyn AccountLedger>,
}

impl RefundTool {
    pub fn new(ledger: Arc<dyn AccountLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for RefundTool {
    fn name(&self) -> &'static str {
        REFUND
    }

    fn description(&self) -> &'static str {
        "Refunds the outstanding charge on the caller's account. Premium members only."
    }

    async fn execute(&self, caller: &CallerContext, input: Value) -> Result<ToolOutput, ToolError> {
        if let Some(declined) = check_permission(caller, Permission::Premium) {
            return Ok(declined);
        }

        let Some(account_id) = account_for(caller, &input) else {
            return Ok(ToolOutput::Declined {
                reason: format!("there is no account on file for {}", caller.name),
            });
        };
        let amount = parse_amount(&input)?;

        match self.ledger.refund(&account_id, amount).await {
            Ok(receipt) => Ok(ToolOutput::Completed(format!(
                "Refund of {} processed for {} on account {}. New balance: {}.",
                receipt.amount, caller.name, receipt.account_id.0, receipt.new_balance
            ))),
            Err(LedgerError::NothingRefundable(id)) => Ok(ToolOutput::Declined {
                reason: format!("account {id} has no charge waiting to be refunded"),
            }),
            Err(LedgerError::ExceedsCharge { requested, available }) => Ok(ToolOutput::Declined {
                reason: format!("the requested {requested} is more than the refundable {available}"),
            }),
            Err(error) => Err(ToolError::Ledger(error)),
        }
    }
}

pub struct CheckBalanceTool {
    ledger: Arc<dyn AccountLedger>,
}

impl CheckBalanceTool {
    pub fn new(ledger: Arc<dyn AccountLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for CheckBalanceTool {
    fn name(&self) -> &'static str {
        CHECK_BALANCE
    }

    fn description(&self) -> &'static str {
        "Reports the balance of the caller's account. Signed-in callers only."
    }

    async fn execute(&self, caller: &CallerContext, input: Value) -> Result<ToolOutput, ToolError> {
        if let Some(declined) = check_permission(caller, Permission::Authenticated) {
            return Ok(declined);
        }

        let Some(account_id) = account_for(caller, &input) else {
            return Ok(ToolOutput::Declined {
                reason: format!("there is no account on file for {}", caller.name),
            });
        };

        let account = self
            .ledger
            .find(&account_id)
            .await?
            .ok_or_else(|| LedgerError::UnknownAccount(account_id.0.clone()))?;
        Ok(ToolOutput::Completed(format!(
            "The balance of account {} is {}.",
            account.id.0, account.balance
        )))
    }
}

pub struct RestartServiceTool;

#[async_trait]
impl Tool for RestartServiceTool {
    fn name(&self) -> &'static str {
        RESTART_SERVICE
    }

    fn description(&self) -> &'static str {
        "Restarts the caller's hosted service."
    }

    async fn execute(&self, caller: &CallerContext, input: Value) -> Result<ToolOutput, ToolError> {
        let service = input.get("service").and_then(Value::as_str).unwrap_or("Your service");
        Ok(ToolOutput::Completed(format!("{service} was restarted for {}.", caller.name)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogItem {
    pub name: &'static str,
    pub price: u32,
    pub in_stock: u32,
    pub note: &'static str,
}

pub struct ListProductsTool {
    catalog: Vec<CatalogItem>,
}

impl Default for ListProductsTool {
    fn default() -> Self {
        Self {
            catalog: vec![
                CatalogItem { name: "pencil", price: 250, in_stock: 140, note: "available in just 2 colors" },
                CatalogItem { name: "eraser", price: 29, in_stock: 50, note: "Dollar brand" },
                CatalogItem { name: "notebook", price: 290, in_stock: 20, note: "500, 600, or 900 pages" },
            ],
        }
    }
}

impl ListProductsTool {
    pub fn find(&self, name: &str) -> Option<&CatalogItem> {
        let wanted = name.trim().to_lowercase();
        self.catalog.iter().find(|item| wanted.starts_with(item.name))
    }

    fn describe(item: &CatalogItem) -> String {
        format!("{}: {} each, {} in stock ({})", item.name, item.price, item.in_stock, item.note)
    }
}

#[async_trait]
impl Tool for ListProductsTool {
    fn name(&self) -> &'static str {
        LIST_PRODUCTS
    }

    fn description(&self) -> &'static str {
        "Lists catalog items with price and stock, optionally filtered by `item`."
    }

    async fn execute(&self, _caller: &CallerContext, input: Value) -> Result<ToolOutput, ToolError> {
        if let Some(wanted) = input.get("item").and_then(Value::as_str) {
            return Ok(ToolOutput::Completed(match self.find(wanted) {
                Some(item) => Self::describe(item),
                None => {
                    let names: Vec<&str> = self.catalog.iter().map(|item| item.name).collect();
                    format!("We don't carry `{wanted}`. Available items: {}.", names.join(", "))
                }
            }));
        }

        let lines: Vec<String> = self.catalog.iter().map(Self::describe).collect();
        Ok(ToolOutput::Completed(lines.join("\n")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Book {
    pub title: &'static str,
    pub author: &'static str,
    pub copies: u32,
}

/// Library holdings. Titles are matched ignoring case and surrounding whitespace.
#[derive(Clone, Debug)]
pub struct BookShelf {
    books: Vec<Book>,
}

impl Default for BookShelf {
    fn default() -> Self {
        Self {
            books: vec![
                Book { title: "Atomic Habits", author: "James Clear", copies: 3 },
                Book { title: "Rich Dad Poor Dad", author: "Robert T. Kiyosaki", copies: 2 },
                Book { title: "Think and Grow Rich", author: "Napoleon Hill", copies: 0 },
                Book { title: "The 10X Rule", author: "Grant Cardone", copies: 5 },
            ],
        }
    }
}

impl BookShelf {
    pub fn find(&self, title: &str) -> Option<&Book> {
        let wanted = title.trim();
        self.books.iter().find(|book| book.title.eq_ignore_ascii_case(wanted))
    }

    /// First held title mentioned anywhere in `text`.
    pub fn mentioned_in(&self, text: &str) -> Option<&Book> {
        let words = tokens(text).join(" ");
        self.books.iter().find(|book| {
            let title = tokens(book.title).join(" ");
            format!(" {words} ").contains(&format!(" {title} "))
        })
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }
}

fn requested_title(tool: &'static str, input: &Value) -> Result<String, ToolError> {
    input
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .ok_or(ToolError::InvalidInput { tool, message: "`title` is required".to_string() })
}

pub struct SearchBookTool {
    shelf: Arc<BookShelf>,
}

impl SearchBookTool {
    pub fn new(shelf: Arc<BookShelf>) -> Self {
        Self { shelf }
    }
}

#[async_trait]
impl Tool for SearchBookTool {
    fn name(&self) -> &'static str {
        SEARCH_BOOK
    }

    fn description(&self) -> &'static str {
        "Reports whether the library holds the book titled `title`."
    }

    async fn execute(&self, _caller: &CallerContext, input: Value) -> Result<ToolOutput, ToolError> {
        let title = requested_title(SEARCH_BOOK, &input)?;
        Ok(ToolOutput::Completed(match self.shelf.find(&title) {
            Some(book) => format!("'{}' by {} is in the library.", book.title, book.author),
            None => format!("'{title}' is not in the library."),
        }))
    }
}

pub struct CheckAvailabilityTool {
    shelf: Arc<BookShelf>,
}

impl CheckAvailabilityTool {
    pub fn new(shelf: Arc<BookShelf>) -> Self {
        Self { shelf }
    }
}

#[async_trait]
impl Tool for CheckAvailabilityTool {
    fn name(&self) -> &'static str {
        CHECK_AVAILABILITY
    }

    fn description(&self) -> &'static str {
        "Counts the copies of `title` currently on the shelf."
    }

    async fn execute(&self, _caller: &CallerContext, input: Value) -> Result<ToolOutput, ToolError> {
        let title = requested_title(CHECK_AVAILABILITY, &input)?;
        let (title, copies) = match self.shelf.find(&title) {
            Some(book) => (book.title.to_string(), book.copies),
            None => (title, 0),
        };
        Ok(ToolOutput::Completed(match copies {
            0 => format!("There are no copies of '{title}' available."),
            1 => format!("There is 1 copy of '{title}' available."),
            n => format!("There are {n} copies of '{title}' available."),
        }))
    }
}

pub struct ListBooksTool {
    shelf: Arc<BookShelf>,
}

impl ListBooksTool {
    pub fn new(shelf: Arc<BookShelf>) -> Self {
        Self { shelf }
    }
}

#[async_trait]
impl Tool for ListBooksTool {
    fn name(&self) -> &'static str {
        LIST_BOOKS
    }

    fn description(&self) -> &'static str {
        "Lists every book with author and copies on the shelf. Library members only."
    }

    async fn execute(&self, caller: &CallerContext, _input: Value) -> Result<ToolOutput, ToolError> {
        if let Some(declined) = check_permission(caller, Permission::Member) {
            return Ok(declined);
        }
        let lines: Vec<String> = self
            .shelf
            .books()
            .iter()
            .map(|book| format!("{} by {}: {} on the shelf", book.title, book.author, book.copies))
            .collect();
        Ok(ToolOutput::Completed(lines.join("\n")))
    }
}

fn account_for(caller: &CallerContext, input: &Value) -> Option<AccountId> {
    input
        .get("account_id")
        .and_then(Value::as_str)
        .map(|id| AccountId(id.to_string()))
        .or_else(|| caller.account_id.clone())
}

fn parse_amount(input: &Value) -> Result<Option<Decimal>, ToolError> {
    match input.get("amount") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => Decimal::from_str(raw.trim()).map(Some).map_err(|error| {
            ToolError::InvalidInput { tool: REFUND, message: error.to_string() }
        }),
        Some(Value::Number(number)) => {
            Decimal::from_str(&number.to_string()).map(Some).map_err(|error| ToolError::InvalidInput {
                tool: REFUND,
                message: error.to_string(),
            })
        }
        Some(other) => Err(ToolError::InvalidInput {
            tool: REFUND,
            message: format!("amount must be a string or number, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use serde_json::json;
    use switchboard_core::domain::account::AccountId;
    use switchboard_core::domain::caller::CallerContext;
    use switchboard_core::domain::response::ToolCallStatus;
    use switchboard_core::ledger::{AccountLedger, InMemoryAccountLedger};

    use super::{
        ToolError, ToolOutput, ToolRegistry, CHECK_AVAILABILITY, CHECK_BALANCE, LIST_BOOKS,
        LIST_PRODUCTS, REFUND, RESTART_SERVICE, SEARCH_BOOK,
    };

    fn registry() -> (ToolRegistry, Arc<InMemoryAccountLedger>) {
        let ledger = Arc::new(InMemoryAccountLedger::demo());
        (ToolRegistry::standard(ledger.clone()), ledger)
    }

    #[test]
    fn standard_registry_holds_every_tool() {
        let (registry, _) = registry();
        assert_eq!(registry.len(), 7);
        assert_eq!(
            registry.names(),
            vec![
                CHECK_AVAILABILITY,
                CHECK_BALANCE,
                LIST_BOOKS,
                LIST_PRODUCTS,
                REFUND,
                RESTART_SERVICE,
                SEARCH_BOOK
            ]
        );
    }

    #[tokio::test]
    async fn refund_is_declined_for_standard_members_without_touching_balance() {
        let (registry, ledger) = registry();
        let caller = CallerContext::new("c-1", "Jane Smith").with_account("ACC-1001");

        let output = registry.invoke(REFUND, &caller, json!({})).await.expect("tool runs");
        assert!(output.is_declined());
        assert_eq!(output.record(REFUND).status, ToolCallStatus::Declined);

        let account = ledger
            .find(&AccountId("ACC-1001".to_string()))
            .await
            .expect("lookup")
            .expect("account exists");
        assert_eq!(account.balance, Decimal::new(1_250_00, 2));
        assert_eq!(account.refundable_charge, Some(Decimal::new(49_99, 2)));
    }

    #[tokio::test]
    async fn refund_for_premium_member_names_the_account() {
        let (registry, _) = registry();
        let caller = CallerContext::new("c-2", "Hania").premium().with_account("ACC-1002");

        let output = registry.invoke(REFUND, &caller, json!({})).await.expect("tool runs");
        match output {
            ToolOutput::Completed(text) => {
                assert!(text.contains("ACC-1002"));
                assert!(text.contains("Hania"));
            }
            ToolOutput::Declined { reason } => panic!("unexpected decline: {reason}"),
        }
    }

    #[tokio::test]
    async fn refund_amount_must_be_numeric() {
        let (registry, _) = registry();
        let caller = CallerContext::new("c-2", "Hania").premium().with_account("ACC-1002");

        let error = registry
            .invoke(REFUND, &caller, json!({ "amount": "lots" }))
            .await
            .expect_err("bad amount");
        assert!(matches!(error, ToolError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn balance_requires_authentication() {
        let (registry, _) = registry();
        let anonymous = CallerContext::new("c-3", "Areeba Irfan").with_account("ACC-1003");
        let signed_in = anonymous.clone().authenticated();

        assert!(registry.invoke(CHECK_BALANCE, &anonymous, json!({})).await.expect("runs").is_declined());
        let output = registry.invoke(CHECK_BALANCE, &signed_in, json!({})).await.expect("runs");
        assert_eq!(output, ToolOutput::Completed("The balance of account ACC-1003 is 87.40.".to_string()));
    }

    #[tokio::test]
    async fn catalog_lookup_is_case_insensitive() {
        let (registry, _) = registry();
        let caller = CallerContext::new("c-4", "Guest");

        let output = registry.invoke(LIST_PRODUCTS, &caller, json!({ "item": "PENCIL" })).await.expect("runs");
        assert_eq!(
            output,
            ToolOutput::Completed("pencil: 250 each, 140 in stock (available in just 2 colors)".to_string())
        );

        let missing = registry.invoke(LIST_PRODUCTS, &caller, json!({ "item": "stapler" })).await.expect("runs");
        assert!(matches!(missing, ToolOutput::Completed(ref text) if text.contains("don't carry")));
    }

    #[tokio::test]
    async fn book_search_and_availability_ignore_case() {
        let (registry, _) = registry();
        let caller = CallerContext::new("c-6", "Guest");

        let found = registry.invoke(SEARCH_BOOK, &caller, json!({ "title": "atomic HABITS" })).await.expect("runs");
        assert_eq!(
            found,
            ToolOutput::Completed("'Atomic Habits' by James Clear is in the library.".to_string())
        );
        let missing = registry.invoke(SEARCH_BOOK, &caller, json!({ "title": "Dune" })).await.expect("runs");
        assert_eq!(missing, ToolOutput::Completed("'Dune' is not in the library.".to_string()));

        let copies = registry
            .invoke(CHECK_AVAILABILITY, &caller, json!({ "title": "the 10x rule" }))
            .await
            .expect("runs");
        assert_eq!(copies, ToolOutput::Completed("There are 5 copies of 'The 10X Rule' available.".to_string()));
        let none = registry
            .invoke(CHECK_AVAILABILITY, &caller, json!({ "title": "Think and Grow Rich" }))
            .await
            .expect("runs");
        assert_eq!(
            none,
            ToolOutput::Completed("There are no copies of 'Think and Grow Rich' available.".to_string())
        );

        let error = registry.invoke(SEARCH_BOOK, &caller, json!({ "title": "  " })).await.expect_err("no title");
        assert!(matches!(error, ToolError::InvalidInput { tool: SEARCH_BOOK, .. }));
    }

    #[tokio::test]
    async fn book_list_requires_membership() {
        let (registry, _) = registry();
        let visitor = CallerContext::new("c-7", "Areeba Irfan");
        let member = visitor.clone().with_member_id("231");

        let declined = registry.invoke(LIST_BOOKS, &visitor, json!({})).await.expect("runs");
        assert!(matches!(declined, ToolOutput::Declined { ref reason } if reason.contains("library members")));

        match registry.invoke(LIST_BOOKS, &member, json!({})).await.expect("runs") {
            ToolOutput::Completed(text) => {
                assert_eq!(text.lines().count(), 4);
                assert!(text.contains("Rich Dad Poor Dad by Robert T. Kiyosaki: 2 on the shelf"));
            }
            ToolOutput::Declined { reason } => panic!("unexpected decline: {reason}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let (registry, _) = registry();
        let caller = CallerContext::new("c-5", "Guest");
        let error = registry.invoke("teleport", &caller, json!({})).await.expect_err("unknown");
        assert_eq!(error, ToolError::UnknownTool("teleport".to_string()));
    }
}
