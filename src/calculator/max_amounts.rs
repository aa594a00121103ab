//! What the user can actually do right now, per action and side.
//!
//! Deposit and mint are bounded by both the wallet budget and the
//! protocol; withdraw and redeem come straight from the protocol.

use alloy_primitives::U256;
use serde::Serialize;
use tracing::warn;

use super::units::format_amount;
use crate::aggregator::{BalanceSnapshot, VaultLimitSnapshot, VaultMetadata};
use crate::chain::{PreviewKind, Side, VaultReads};

/// Native currency kept back for fees when counting wrappable balance (0.002)
pub const GAS_RESERVE: u128 = 2_000_000_000_000_000;

/// Native balance that may be wrapped without touching the gas reserve
pub fn wrappable_native(native: U256, reserve: U256) -> U256 {
    native.saturating_sub(reserve)
}

/// Tokens the user can spend on `side`, counting wrappable native when eligible
pub fn input_budget(balances: &BalanceSnapshot, metadata: &VaultMetadata, side: Side) -> U256 {
    let held = balances.token(side);
    if metadata.is_wrappable(side) {
        held.saturating_add(wrappable_native(balances.native, U256::from(GAS_RESERVE)))
    } else {
        held
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultOp {
    Deposit,
    Mint,
    Withdraw,
    Redeem,
}

impl VaultOp {
    pub const ALL: [VaultOp; 4] = [VaultOp::Deposit, VaultOp::Mint, VaultOp::Withdraw, VaultOp::Redeem];

    /// Whether the amount is denominated in vault shares
    pub fn in_shares(&self) -> bool {
        matches!(self, VaultOp::Mint | VaultOp::Redeem)
    }
}

impl std::fmt::Display for VaultOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VaultOp::Deposit => "deposit",
            VaultOp::Mint => "mint",
            VaultOp::Withdraw => "withdraw",
            VaultOp::Redeem => "redeem",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaxAmount {
    pub raw: U256,
    pub display: String,
}

impl MaxAmount {
    fn new(raw: U256, decimals: u8) -> Self {
        Self {
            raw,
            display: format_amount(raw, decimals),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SidePair<T> {
    pub borrow: T,
    pub collateral: T,
}

impl<T> SidePair<T> {
    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Borrow => &self.borrow,
            Side::Collateral => &self.collateral,
        }
    }

    fn from_fn(mut f: impl FnMut(Side) -> T) -> Self {
        Self {
            borrow: f(Side::Borrow),
            collateral: f(Side::Collateral),
        }
    }
}

/// `None` means the inputs are still loading
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivedMaxAmounts {
    pub deposit: SidePair<Option<MaxAmount>>,
    pub mint: SidePair<Option<MaxAmount>>,
    pub withdraw: SidePair<Option<MaxAmount>>,
    pub redeem: SidePair<Option<MaxAmount>>,
}

impl DerivedMaxAmounts {
    pub fn get(&self, op: VaultOp, side: Side) -> Option<&MaxAmount> {
        let pair = match op {
            VaultOp::Deposit => &self.deposit,
            VaultOp::Mint => &self.mint,
            VaultOp::Withdraw => &self.withdraw,
            VaultOp::Redeem => &self.redeem,
        };
        pair.get(side).as_ref()
    }
}

/// Shares the current budget would buy on each side, per `previewDeposit`
pub type MintQuotes = SidePair<Option<U256>>;

/// Ask the vault how many shares each side's budget converts to.
/// A failed preview leaves that side `None`.
pub async fn quote_mints<R: VaultReads + ?Sized>(
    reader: &R,
    balances: &BalanceSnapshot,
    metadata: &VaultMetadata,
) -> MintQuotes {
    let borrow_budget = input_budget(balances, metadata, Side::Borrow);
    let collateral_budget = input_budget(balances, metadata, Side::Collateral);

    let (borrow, collateral) = futures::join!(
        reader.preview(PreviewKind::Deposit(Side::Borrow), borrow_budget),
        reader.preview(PreviewKind::Deposit(Side::Collateral), collateral_budget),
    );

    let keep = |side: Side, quote: eyre::Result<U256>| match quote {
        Ok(shares) => Some(shares),
        Err(e) => {
            warn!("⚠️  previewDeposit ({}) failed, max mint unavailable: {}", side, e);
            None
        }
    };

    SidePair {
        borrow: keep(Side::Borrow, borrow),
        collateral: keep(Side::Collateral, collateral),
    }
}

/// Inputs of one derivation; `None` for anything not loaded yet
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxInputs<'a> {
    pub metadata: Option<&'a VaultMetadata>,
    pub balances: Option<&'a BalanceSnapshot>,
    pub limits: Option<&'a VaultLimitSnapshot>,
    pub mint_quotes: Option<&'a MintQuotes>,
}

pub fn derive_max_amounts(inputs: MaxInputs<'_>) -> DerivedMaxAmounts {
    let (Some(metadata), Some(limits)) = (inputs.metadata, inputs.limits) else {
        return DerivedMaxAmounts::default();
    };
    let share_decimals = metadata.shares.decimals;

    let withdraw = SidePair::from_fn(|side| {
        Some(MaxAmount::new(limits.max_withdraw.get(side), metadata.asset(side).decimals))
    });
    let redeem = SidePair::from_fn(|side| Some(MaxAmount::new(limits.max_redeem.get(side), share_decimals)));

    let Some(balances) = inputs.balances else {
        return DerivedMaxAmounts {
            withdraw,
            redeem,
            ..Default::default()
        };
    };

    let deposit = SidePair::from_fn(|side| {
        let budget = input_budget(balances, metadata, side);
        let max = budget.min(limits.max_deposit.get(side));
        Some(MaxAmount::new(max, metadata.asset(side).decimals))
    });

    let mint = SidePair::from_fn(|side| {
        let shares = (*inputs.mint_quotes?.get(side))?;
        Some(MaxAmount::new(shares.min(limits.max_mint.get(side)), share_decimals))
    });

    DerivedMaxAmounts {
        deposit,
        mint,
        withdraw,
        redeem,
    }
}

// ============================================
// TESTS
// ============================================
