//! Account balances touched by the billing tools.
//!
//! Refunds are the only mutation. A refund credits the account's refundable charge (or a
//! smaller explicit amount) back to the balance and clears the charge.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::account::{Account, AccountId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account `{0}` was not found")]
    UnknownAccount(String),
    #[error("account `{0}` has no refundable charge")]
    NothingRefundable(String),
    #[error("requested refund {requested} exceeds refundable charge {available}")]
    ExceedsCharge { requested: Decimal, available: Decimal },
    #[error("refund amount must be positive")]
    NonPositiveAmount,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefundReceipt {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub new_balance: Decimal,
}

#[async_trait]
pub trait AccountLedger: Send + Sync {
    async fn find(&self, id: &AccountId) -> Result<Option<Account>, LedgerError>;
    async fn refund(
        &self,
        id: &AccountId,
        amount: Option<Decimal>,
    ) -> Result<RefundReceipt, LedgerError>;
}

#[derive(Default)]
pub struct InMemoryAccountLedger {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountLedger {
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let accounts =
            accounts.into_iter().map(|account| (account.id.0.clone(), account)).collect();
        Self { accounts: RwLock::new(accounts) }
    }

    /// Ledger seeded with the demo accounts used by the CLI and server.
    pub fn demo() -> Self {
        Self::with_accounts(demo_accounts())
    }
}

#[async_trait]
impl AccountLedger for InMemoryAccountLedger {
    async fn find(&self, id: &AccountId) -> Result<Option<Account>, LedgerError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id.0).cloned())
    }

    async fn refund(
        &self,
        id: &AccountId,
        amount: Option<Decimal>,
    ) -> Result<RefundReceipt, LedgerError> {
        let mut accounts = self.accounts.write().await;
        let account =
            accounts.get_mut(&id.0).ok_or_else(|| LedgerError::UnknownAccount(id.0.clone()))?;
        let available =
            account.refundable_charge.ok_or_else(|| LedgerError::NothingRefundable(id.0.clone()))?;

        let amount = amount.unwrap_or(available);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount);
        }
        if amount > available {
            return Err(LedgerError::ExceedsCharge { requested: amount, available });
        }

        account.balance += amount;
        account.refundable_charge = None;

        Ok(RefundReceipt { account_id: id.clone(), amount, new_balance: account.balance })
    }
}

pub fn demo_accounts() -> Vec<Account> {
    vec![
        Account {
            id: AccountId("ACC-1001".to_string()),
            holder: "Jane Smith".to_string(),
            balance: Decimal::new(1_250_00, 2),
            refundable_charge: Some(Decimal::new(49_99, 2)),
        },
        Account {
            id: AccountId("ACC-1002".to_string()),
            holder: "Hania".to_string(),
            balance: Decimal::new(100_000_00, 2),
            refundable_charge: Some(Decimal::new(250_00, 2)),
        },
        Account {
            id: AccountId("ACC-1003".to_string()),
            holder: "Areeba Irfan".to_string(),
            balance: Decimal::new(87_40, 2),
            refundable_charge: None,
        },
    ]
}
