//! LTV figures of the vault position

use alloy_primitives::U256;
use futures::FutureExt;
use std::sync::Arc;

use super::{SnapshotCell, SnapshotLoader};
use crate::chain::{LtvFigure, ReadFuture, VaultReads};

/// 1e18 = 100%
pub const WAD: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LtvSnapshot {
    pub target_ltv: U256,
    pub max_safe_ltv: U256,
    pub min_profit_ltv: U256,
    /// Borrow-asset denominated
    pub real_borrow_assets: U256,
    /// Borrow-asset denominated
    pub real_collateral_assets: U256,
}

impl LtvSnapshot {
    /// Borrow / collateral in WAD, `None` for an empty position
    pub fn current_ltv(&self) -> Option<U256> {
        if self.real_collateral_assets.is_zero() {
            return None;
        }
        Some(self.real_borrow_assets * U256::from(WAD) / self.real_collateral_assets)
    }

    /// Whether the position drifted outside [min_profit, max_safe]
    pub fn needs_rebalance(&self) -> bool {
        match self.current_ltv() {
            Some(ltv) => ltv > self.max_safe_ltv || ltv < self.min_profit_ltv,
            None => false,
        }
    }
}

pub struct LtvLoader<R> {
    reader: Arc<R>,
    cell: Arc<SnapshotCell<LtvSnapshot>>,
}

impl<R: VaultReads> LtvLoader<R> {
    pub fn new(reader: Arc<R>, cell: Arc<SnapshotCell<LtvSnapshot>>) -> Self {
        Self { reader, cell }
    }
}

impl<R: VaultReads + 'static> SnapshotLoader for LtvLoader<R> {
    type Value = LtvSnapshot;

    fn cell(&self) -> &SnapshotCell<LtvSnapshot> {
        &self.cell
    }

    fn fetch(&self) -> ReadFuture<'_, LtvSnapshot> {
        async move {
            let r = self.reader.as_ref();
            let (target_ltv, max_safe_ltv, min_profit_ltv, real_borrow_assets, real_collateral_assets) =
                futures::try_join!(
                    r.ltv_figure(LtvFigure::TargetLtv),
                    r.ltv_figure(LtvFigure::MaxSafeLtv),
                    r.ltv_figure(LtvFigure::MinProfitLtv),
                    r.ltv_figure(LtvFigure::RealBorrowAssets),
                    r.ltv_figure(LtvFigure::RealCollateralAssets),
                )?;

            Ok(LtvSnapshot {
                target_ltv,
                max_safe_ltv,
                min_profit_ltv,
                real_borrow_assets,
                real_collateral_assets,
            })
        }
        .boxed()
    }
}
