//! Account balance book
//!
//! Tracks value credited to each account as pledges resolve and commissions
//! are taken. The registry owns a single ledger and applies every credit
//! inside the same critical section as the status transition that produced
//! it, so balances and statuses never disagree.

use std::collections::HashMap;

use crate::{
    PledgeResult,
    error::PledgeError,
    models::{AccountId, Payout},
};

/// Per-account credited balances
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    balances: HashMap<AccountId, u128>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `account`, returning the updated balance
    ///
    /// Fails without mutating on arithmetic overflow.
    pub fn credit(&mut self, account: AccountId, amount: u128) -> PledgeResult<u128> {
        let current = self.balances.get(&account).copied().unwrap_or(0);
        let updated = current.checked_add(amount).ok_or_else(|| {
            PledgeError::internal(format!("balance overflow crediting {amount} to {account}"))
        })?;
        self.balances.insert(account, updated);
        Ok(updated)
    }

    /// Apply a payout produced by a pledge resolution
    pub fn apply(&mut self, payout: Payout) -> PledgeResult<u128> {
        self.credit(payout.recipient, payout.amount)
    }

    /// Balance credited to `account` so far
    pub fn balance_of(&self, account: AccountId) -> u128 {
        self.balances.get(&account).copied().unwrap_or(0)
    }
}
