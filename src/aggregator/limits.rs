//! Protocol limits for one account: max deposit / withdraw / mint /
//! redeem on both sides, plus total assets

use alloy_primitives::{Address, U256};
use futures::FutureExt;
use std::sync::Arc;

use super::{SnapshotCell, SnapshotLoader};
use crate::chain::{LimitKind, ReadFuture, Side, VaultReads};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideValues {
    pub borrow: U256,
    pub collateral: U256,
}

impl SideValues {
    pub fn get(&self, side: Side) -> U256 {
        match side {
            Side::Borrow => self.borrow,
            Side::Collateral => self.collateral,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VaultLimitSnapshot {
    pub account: Address,
    /// in input-asset units
    pub max_deposit: SideValues,
    /// in input-asset units
    pub max_withdraw: SideValues,
    /// in shares
    pub max_mint: SideValues,
    /// in shares
    pub max_redeem: SideValues,
    pub total_assets: U256,
}

pub struct LimitLoader<R> {
    reader: Arc<R>,
    account: Address,
    cell: Arc<SnapshotCell<VaultLimitSnapshot>>,
}

impl<R: VaultReads> LimitLoader<R> {
    /// `account` may be the zero address when no wallet is connected;
    /// the vault then reports its general caps.
    pub fn new(reader: Arc<R>, account: Address, cell: Arc<SnapshotCell<VaultLimitSnapshot>>) -> Self {
        Self {
            reader,
            account,
            cell,
        }
    }
}

impl<R: VaultReads + 'static> SnapshotLoader for LimitLoader<R> {
    type Value = VaultLimitSnapshot;

    fn cell(&self) -> &SnapshotCell<VaultLimitSnapshot> {
        &self.cell
    }

    fn fetch(&self) -> ReadFuture<'_, VaultLimitSnapshot> {
        async move {
            let r = self.reader.as_ref();
            let a = self.account;

            let (
                deposit_b,
                deposit_c,
                withdraw_b,
                withdraw_c,
                mint_b,
                mint_c,
                redeem_b,
                redeem_c,
                total_assets,
            ) = futures::try_join!(
                r.limit(LimitKind::MaxDeposit(Side::Borrow), a),
                r.limit(LimitKind::MaxDeposit(Side::Collateral), a),
                r.limit(LimitKind::MaxWithdraw(Side::Borrow), a),
                r.limit(LimitKind::MaxWithdraw(Side::Collateral), a),
                r.limit(LimitKind::MaxMint(Side::Borrow), a),
                r.limit(LimitKind::MaxMint(Side::Collateral), a),
                r.limit(LimitKind::MaxRedeem(Side::Borrow), a),
                r.limit(LimitKind::MaxRedeem(Side::Collateral), a),
                r.limit(LimitKind::TotalAssets, a),
            )?;

            Ok(VaultLimitSnapshot {
                account: a,
                max_deposit: SideValues { borrow: deposit_b, collateral: deposit_c },
                max_withdraw: SideValues { borrow: withdraw_b, collateral: withdraw_c },
                max_mint: SideValues { borrow: mint_b, collateral: mint_c },
                max_redeem: SideValues { borrow: redeem_b, collateral: redeem_c },
                total_assets,
            })
        }
        .boxed()
    }
}

// ============================================
// TESTS
// ============================================
