use serde::{Deserialize, Serialize};

use crate::domain::account::AccountId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(pub String);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipTier {
    #[default]
    Standard,
    Premium,
}

/// Caller attributes a handler or tool may consult. Read-only once a request starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub caller_id: CallerId,
    pub name: String,
    #[serde(default)]
    pub tier: MembershipTier,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub account_id: Option<AccountId>,
    /// Library membership number, if the caller holds one.
    #[serde(default)]
    pub member_id: Option<String>,
}

impl CallerContext {
    pub fn new(caller_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            caller_id: CallerId(caller_id.into()),
            name: name.into(),
            tier: MembershipTier::Standard,
            authenticated: false,
            account_id: None,
            member_id: None,
        }
    }

    pub fn premium(mut self) -> Self {
        self.tier = MembershipTier::Premium;
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(AccountId(account_id.into()));
        self
    }

    pub fn with_member_id(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }

    pub fn is_member(&self) -> bool {
        self.member_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }

    pub fn is_premium(&self) -> bool {
        self.tier == MembershipTier::Premium
    }
}
