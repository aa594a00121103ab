//! State-changing contract calls
//!
//! Every submitted call hands back a `TxHandle`; the action is only done
//! once `TxHandle::confirmed` resolves.

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes, B256, I256, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use eyre::{eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};

use super::contracts::{
    IFlashLoanMintHelper, IFlashLoanRedeemHelper, ILtvVault, IWrappedNative, IERC20,
};
use super::{Side, VaultAddresses};

// ============================================
// CALLS
// ============================================

/// Which position delta a low-level rebalance is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceTarget {
    Shares,
    Borrow,
    Collateral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    Approve { token: Address, spender: Address, amount: U256 },
    WrapNative { token: Address, amount: U256 },
    Deposit { side: Side, assets: U256, receiver: Address },
    Withdraw { side: Side, assets: U256, receiver: Address, owner: Address },
    Mint { side: Side, shares: U256, receiver: Address },
    Redeem { side: Side, shares: U256, receiver: Address, owner: Address },
    FlashLoanMint { shares: U256 },
    FlashLoanRedeem { shares: U256 },
    Auction { side: Side, delta: I256 },
    LowLevelRebalance { target: RebalanceTarget, delta: I256 },
}

impl WriteCall {
    /// Short verb used in status and error messages
    pub fn label(&self) -> &'static str {
        match self {
            WriteCall::Approve { .. } => "approve",
            WriteCall::WrapNative { .. } => "wrap",
            WriteCall::Deposit { .. } => "deposit",
            WriteCall::Withdraw { .. } => "withdraw",
            WriteCall::Mint { .. } => "mint",
            WriteCall::Redeem { .. } => "redeem",
            WriteCall::FlashLoanMint { .. } => "mint with flash loan",
            WriteCall::FlashLoanRedeem { .. } => "redeem with flash loan",
            WriteCall::Auction { .. } => "execute auction",
            WriteCall::LowLevelRebalance { .. } => "rebalance",
        }
    }
}

/// Calldata ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl EncodedCall {
    fn new(to: Address, call: impl SolCall) -> Self {
        Self {
            to,
            data: call.abi_encode().into(),
            value: U256::ZERO,
        }
    }
}

/// Resolve target and calldata for a call
pub fn encode_call(call: &WriteCall, addresses: &VaultAddresses) -> Result<EncodedCall> {
    let vault = addresses.vault;

    let encoded = match *call {
        WriteCall::Approve { token, spender, amount } => {
            EncodedCall::new(token, IERC20::approveCall { spender, amount })
        }
        WriteCall::WrapNative { token, amount } => EncodedCall {
            value: amount,
            ..EncodedCall::new(token, IWrappedNative::depositCall {})
        },
        WriteCall::Deposit { side: Side::Borrow, assets, receiver } => {
            EncodedCall::new(vault, ILtvVault::depositCall { assets, receiver })
        }
        WriteCall::Deposit { side: Side::Collateral, assets, receiver } => EncodedCall::new(
            vault,
            ILtvVault::depositCollateralCall { collateralAssets: assets, receiver },
        ),
        WriteCall::Withdraw { side: Side::Borrow, assets, receiver, owner } => {
            EncodedCall::new(vault, ILtvVault::withdrawCall { assets, receiver, owner })
        }
        WriteCall::Withdraw { side: Side::Collateral, assets, receiver, owner } => {
            EncodedCall::new(
                vault,
                ILtvVault::withdrawCollateralCall { collateralAssets: assets, receiver, owner },
            )
        }
        WriteCall::Mint { side: Side::Borrow, shares, receiver } => {
            EncodedCall::new(vault, ILtvVault::mintCall { shares, receiver })
        }
        WriteCall::Mint { side: Side::Collateral, shares, receiver } => {
            EncodedCall::new(vault, ILtvVault::mintCollateralCall { shares, receiver })
        }
        WriteCall::Redeem { side: Side::Borrow, shares, receiver, owner } => {
            EncodedCall::new(vault, ILtvVault::redeemCall { shares, receiver, owner })
        }
        WriteCall::Redeem { side: Side::Collateral, shares, receiver, owner } => {
            EncodedCall::new(vault, ILtvVault::redeemCollateralCall { shares, receiver, owner })
        }
        WriteCall::FlashLoanMint { shares } => {
            let helper = addresses
                .flash_loan_mint_helper
                .ok_or_else(|| eyre!("No flash-loan mint helper configured"))?;
            EncodedCall::new(
                helper,
                IFlashLoanMintHelper::mintSharesWithFlashLoanCollateralCall { sharesToMint: shares },
            )
        }
        WriteCall::FlashLoanRedeem { shares } => {
            let helper = addresses
                .flash_loan_redeem_helper
                .ok_or_else(|| eyre!("No flash-loan redeem helper configured"))?;
            EncodedCall::new(
                helper,
                IFlashLoanRedeemHelper::redeemSharesWithFlashLoanBorrowCall {
                    sharesToRedeem: shares,
                },
            )
        }
        WriteCall::Auction { side: Side::Borrow, delta } => EncodedCall::new(
            vault,
            ILtvVault::executeAuctionBorrowCall { deltaUserBorrowAssets: delta },
        ),
        WriteCall::Auction { side: Side::Collateral, delta } => EncodedCall::new(
            vault,
            ILtvVault::executeAuctionCollateralCall { deltaUserCollateralAssets: delta },
        ),
        WriteCall::LowLevelRebalance { target: RebalanceTarget::Shares, delta } => {
            EncodedCall::new(
                vault,
                ILtvVault::executeLowLevelRebalanceSharesCall { deltaShares: delta },
            )
        }
        WriteCall::LowLevelRebalance { target: RebalanceTarget::Borrow, delta } => {
            EncodedCall::new(
                vault,
                ILtvVault::executeLowLevelRebalanceBorrowCall { deltaBorrow: delta },
            )
        }
        WriteCall::LowLevelRebalance { target: RebalanceTarget::Collateral, delta } => {
            EncodedCall::new(
                vault,
                ILtvVault::executeLowLevelRebalanceCollateralCall { deltaCollateral: delta },
            )
        }
    };

    Ok(encoded)
}

// ============================================
// TRANSACTION HANDLE
// ============================================

/// A sent transaction whose confirmation is still pending
pub struct TxHandle {
    hash: B256,
    confirmation: BoxFuture<'static, Result<()>>,
}

impl TxHandle {
    pub fn new(hash: B256, confirmation: BoxFuture<'static, Result<()>>) -> Self {
        Self { hash, confirmation }
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Wait for the receipt; errors if the transaction reverted
    pub async fn confirmed(self) -> Result<B256> {
        self.confirmation.await?;
        Ok(self.hash)
    }
}

impl std::fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxHandle").field("hash", &self.hash).finish()
    }
}

pub trait VaultWrites: Send + Sync {
    /// Account that signs and pays for submitted calls
    fn account(&self) -> Address;

    fn submit(&self, call: WriteCall) -> BoxFuture<'_, Result<TxHandle>>;
}

// ============================================
// RPC IMPLEMENTATION
// ============================================

/// Signing connection built from a local private key
pub struct RpcVaultWriter {
    provider: DynProvider,
    account: Address,
    addresses: VaultAddresses,
}

impl RpcVaultWriter {
    pub fn connect(
        rpc_url: &str,
        signer: PrivateKeySigner,
        addresses: VaultAddresses,
    ) -> Result<Self> {
        let account = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url.parse()?)
            .erased();

        info!("✓ Signing connection ready for {:?}", account);

        Ok(Self {
            provider,
            account,
            addresses,
        })
    }
}

impl VaultWrites for RpcVaultWriter {
    fn account(&self) -> Address {
        self.account
    }

    fn submit(&self, call: WriteCall) -> BoxFuture<'_, Result<TxHandle>> {
        async move {
            let encoded = encode_call(&call, &self.addresses)?;
            let tx = TransactionRequest::default()
                .from(self.account)
                .to(encoded.to)
                .value(encoded.value)
                .input(encoded.data.into());

            let pending = self.provider.send_transaction(tx).await?;
            let hash = *pending.tx_hash();
            debug!("📤 {} sent: {:?}", call.label(), hash);

            let label = call.label();
            let confirmation = async move {
                let receipt = pending.get_receipt().await?;
                if !receipt.status() {
                    return Err(eyre!("{} transaction {:?} reverted", label, hash));
                }
                Ok(())
            }
            .boxed();

            Ok(TxHandle::new(hash, confirmation))
        }
        .boxed()
    }
}

/// Account without a signer; every submission fails
pub struct WatchOnlyWriter {
    account: Address,
}

impl WatchOnlyWriter {
    pub fn new(account: Address) -> Self {
        Self { account }
    }
}

impl VaultWrites for WatchOnlyWriter {
    fn account(&self) -> Address {
        self.account
    }

    fn submit(&self, call: WriteCall) -> BoxFuture<'_, Result<TxHandle>> {
        let label = call.label();
        futures::future::ready(Err(eyre!("Watch-only wallet cannot {}", label))).boxed()
    }
}

// ============================================
// TESTS
// ============================================
