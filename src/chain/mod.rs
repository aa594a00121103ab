//! Chain access
//!
//! Thin seam over the vault contracts:
//! - `VaultReads` for view calls (balances, limits, previews, LTV figures)
//! - `VaultWrites` for state-changing transactions
//!
//! The alloy-backed implementations live here too; everything above this
//! module only sees the traits.

pub mod contracts;
mod reader;
mod writer;

pub use reader::{RpcVaultReader, VaultReads};
pub use writer::{
    encode_call, RebalanceTarget, RpcVaultWriter, TxHandle, VaultWrites, WatchOnlyWriter, WriteCall,
};

use alloy_primitives::Address;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub type ReadFuture<'a, T> = BoxFuture<'a, eyre::Result<T>>;

/// Which half of the vault an action works against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Borrow,
    Collateral,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Borrow => write!(f, "borrow"),
            Side::Collateral => write!(f, "collateral"),
        }
    }
}

/// Protocol-reported limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitKind {
    MaxDeposit(Side),
    MaxWithdraw(Side),
    MaxMint(Side),
    MaxRedeem(Side),
    TotalAssets,
}

/// Protocol conversions used to size actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviewKind {
    /// input assets -> shares received
    Deposit(Side),
    /// shares -> input assets required
    Mint(Side),
    /// shares -> collateral the mint helper pulls from the user
    FlashLoanMint,
    /// shares -> borrow assets the redeem helper pays out
    FlashLoanRedeem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LtvFigure {
    TargetLtv,
    MaxSafeLtv,
    MinProfitLtv,
    RealBorrowAssets,
    RealCollateralAssets,
}

/// Underlying tokens of the vault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultTokens {
    pub borrow: Address,
    pub collateral: Address,
}

/// Contracts the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VaultAddresses {
    pub vault: Address,
    pub flash_loan_mint_helper: Option<Address>,
    pub flash_loan_redeem_helper: Option<Address>,
}
