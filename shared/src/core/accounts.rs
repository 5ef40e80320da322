//! Account enumeration interface

use crate::core::types::Account;

/// Source of the accounts configured on this device
pub trait AccountSource: Send + Sync {
    /// All configured accounts, in a stable enumeration order
    fn list_accounts(&self) -> Vec<Account>;
}

/// Fixed account list, for hosts that know their accounts up front
#[derive(Debug, Clone, Default)]
pub struct StaticAccountSource {
    accounts: Vec<Account>,
}

impl StaticAccountSource {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }
}

impl AccountSource for StaticAccountSource {
    fn list_accounts(&self) -> Vec<Account> {
        self.accounts.clone()
    }
}
