//! Wallet balances: native, shares, borrow token, collateral token

use alloy_primitives::{Address, U256};
use futures::FutureExt;
use std::sync::Arc;

use super::{SnapshotCell, SnapshotLoader};
use crate::chain::{ReadFuture, Side, VaultReads, VaultTokens};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub account: Address,
    pub native: U256,
    pub shares: U256,
    pub borrow_token: U256,
    pub collateral_token: U256,
}

impl BalanceSnapshot {
    pub fn token(&self, side: Side) -> U256 {
        match side {
            Side::Borrow => self.borrow_token,
            Side::Collateral => self.collateral_token,
        }
    }
}

pub struct BalanceLoader<R> {
    reader: Arc<R>,
    account: Address,
    tokens: VaultTokens,
    cell: Arc<SnapshotCell<BalanceSnapshot>>,
}

impl<R: VaultReads> BalanceLoader<R> {
    pub fn new(
        reader: Arc<R>,
        account: Address,
        tokens: VaultTokens,
        cell: Arc<SnapshotCell<BalanceSnapshot>>,
    ) -> Self {
        Self {
            reader,
            account,
            tokens,
            cell,
        }
    }
}

impl<R: VaultReads + 'static> SnapshotLoader for BalanceLoader<R> {
    type Value = BalanceSnapshot;

    fn cell(&self) -> &SnapshotCell<BalanceSnapshot> {
        &self.cell
    }

    fn fetch(&self) -> ReadFuture<'_, BalanceSnapshot> {
        async move {
            let reader = self.reader.as_ref();
            let account = self.account;
            let vault = reader.addresses().vault;

            let (native, shares, borrow_token, collateral_token) = futures::try_join!(
                reader.native_balance(account),
                reader.token_balance(vault, account),
                reader.token_balance(self.tokens.borrow, account),
                reader.token_balance(self.tokens.collateral, account),
            )?;

            Ok(BalanceSnapshot {
                account,
                native,
                shares,
                borrow_token,
                collateral_token,
            })
        }
        .boxed()
    }
}

// ============================================
// TESTS
// ============================================
