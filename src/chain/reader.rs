//! Read-only contract access

use alloy_primitives::{Address, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use eyre::{eyre, Result};
use futures::FutureExt;
use tracing::trace;

use super::contracts::{IFlashLoanMintHelper, IFlashLoanRedeemHelper, ILtvVault, IERC20};
use super::{LimitKind, LtvFigure, PreviewKind, ReadFuture, Side, VaultAddresses, VaultTokens};

/// View calls the client needs from the chain
pub trait VaultReads: Send + Sync {
    fn addresses(&self) -> &VaultAddresses;

    fn native_balance(&self, owner: Address) -> ReadFuture<'_, U256>;

    fn token_balance(&self, token: Address, owner: Address) -> ReadFuture<'_, U256>;

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> ReadFuture<'_, U256>;

    fn decimals(&self, token: Address) -> ReadFuture<'_, u8>;

    fn symbol(&self, token: Address) -> ReadFuture<'_, String>;

    fn vault_tokens(&self) -> ReadFuture<'_, VaultTokens>;

    /// `account` is ignored for `LimitKind::TotalAssets`
    fn limit(&self, kind: LimitKind, account: Address) -> ReadFuture<'_, U256>;

    fn preview(&self, kind: PreviewKind, amount: U256) -> ReadFuture<'_, U256>;

    fn ltv_figure(&self, figure: LtvFigure) -> ReadFuture<'_, U256>;
}

// ============================================
// RPC IMPLEMENTATION
// ============================================

/// `VaultReads` over a shared read-only provider
#[derive(Clone)]
pub struct RpcVaultReader {
    provider: DynProvider,
    addresses: VaultAddresses,
}

impl RpcVaultReader {
    pub fn connect(rpc_url: &str, addresses: VaultAddresses) -> Result<Self> {
        let provider = ProviderBuilder::new().connect_http(rpc_url.parse()?).erased();
        Ok(Self::new(provider, addresses))
    }

    pub fn new(provider: DynProvider, addresses: VaultAddresses) -> Self {
        Self {
            provider,
            addresses,
        }
    }

    pub async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    /// `eth_call` one view function and decode its return value
    async fn view<C: SolCall>(&self, target: Address, call: C) -> Result<C::Return> {
        let tx = TransactionRequest::default()
            .to(target)
            .input(call.abi_encode().into());

        let raw = self
            .provider
            .call(tx)
            .await
            .map_err(|e| eyre!("{} on {} failed: {}", C::SIGNATURE, target, e))?;

        trace!("{} on {} -> {} bytes", C::SIGNATURE, target, raw.len());

        C::abi_decode_returns(&raw)
            .map_err(|e| eyre!("Failed to decode {} from {}: {}", C::SIGNATURE, target, e))
    }

    fn helper(&self, helper: Option<Address>, name: &str) -> Result<Address> {
        helper.ok_or_else(|| eyre!("No {} helper configured", name))
    }
}

impl VaultReads for RpcVaultReader {
    fn addresses(&self) -> &VaultAddresses {
        &self.addresses
    }

    fn native_balance(&self, owner: Address) -> ReadFuture<'_, U256> {
        async move {
            self.provider
                .get_balance(owner)
                .await
                .map_err(|e| eyre!("Native balance of {} failed: {}", owner, e))
        }
        .boxed()
    }

    fn token_balance(&self, token: Address, owner: Address) -> ReadFuture<'_, U256> {
        self.view(token, IERC20::balanceOfCall { account: owner }).boxed()
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> ReadFuture<'_, U256> {
        self.view(token, IERC20::allowanceCall { owner, spender }).boxed()
    }

    fn decimals(&self, token: Address) -> ReadFuture<'_, u8> {
        self.view(token, IERC20::decimalsCall {}).boxed()
    }

    fn symbol(&self, token: Address) -> ReadFuture<'_, String> {
        self.view(token, IERC20::symbolCall {}).boxed()
    }

    fn vault_tokens(&self) -> ReadFuture<'_, VaultTokens> {
        async move {
            let vault = self.addresses.vault;
            let (borrow, collateral) = futures::try_join!(
                self.view(vault, ILtvVault::assetCall {}),
                self.view(vault, ILtvVault::assetCollateralCall {}),
            )?;
            Ok(VaultTokens { borrow, collateral })
        }
        .boxed()
    }

    fn limit(&self, kind: LimitKind, account: Address) -> ReadFuture<'_, U256> {
        let vault = self.addresses.vault;
        match kind {
            LimitKind::MaxDeposit(Side::Borrow) => {
                self.view(vault, ILtvVault::maxDepositCall { receiver: account }).boxed()
            }
            LimitKind::MaxDeposit(Side::Collateral) => self
                .view(vault, ILtvVault::maxDepositCollateralCall { receiver: account })
                .boxed(),
            LimitKind::MaxWithdraw(Side::Borrow) => {
                self.view(vault, ILtvVault::maxWithdrawCall { owner: account }).boxed()
            }
            LimitKind::MaxWithdraw(Side::Collateral) => self
                .view(vault, ILtvVault::maxWithdrawCollateralCall { owner: account })
                .boxed(),
            LimitKind::MaxMint(Side::Borrow) => {
                self.view(vault, ILtvVault::maxMintCall { receiver: account }).boxed()
            }
            LimitKind::MaxMint(Side::Collateral) => self
                .view(vault, ILtvVault::maxMintCollateralCall { receiver: account })
                .boxed(),
            LimitKind::MaxRedeem(Side::Borrow) => {
                self.view(vault, ILtvVault::maxRedeemCall { owner: account }).boxed()
            }
            LimitKind::MaxRedeem(Side::Collateral) => self
                .view(vault, ILtvVault::maxRedeemCollateralCall { owner: account })
                .boxed(),
            LimitKind::TotalAssets => self.view(vault, ILtvVault::totalAssetsCall {}).boxed(),
        }
    }

    fn preview(&self, kind: PreviewKind, amount: U256) -> ReadFuture<'_, U256> {
        let vault = self.addresses.vault;
        match kind {
            PreviewKind::Deposit(Side::Borrow) => {
                self.view(vault, ILtvVault::previewDepositCall { assets: amount }).boxed()
            }
            PreviewKind::Deposit(Side::Collateral) => self
                .view(
                    vault,
                    ILtvVault::previewDepositCollateralCall { collateralAssets: amount },
                )
                .boxed(),
            PreviewKind::Mint(Side::Borrow) => {
                self.view(vault, ILtvVault::previewMintCall { shares: amount }).boxed()
            }
            PreviewKind::Mint(Side::Collateral) => self
                .view(vault, ILtvVault::previewMintCollateralCall { shares: amount })
                .boxed(),
            PreviewKind::FlashLoanMint => async move {
                let helper =
                    self.helper(self.addresses.flash_loan_mint_helper, "flash-loan mint")?;
                self.view(
                    helper,
                    IFlashLoanMintHelper::previewMintSharesWithFlashLoanCollateralCall {
                        sharesToMint: amount,
                    },
                )
                .await
            }
            .boxed(),
            PreviewKind::FlashLoanRedeem => async move {
                let helper =
                    self.helper(self.addresses.flash_loan_redeem_helper, "flash-loan redeem")?;
                self.view(
                    helper,
                    IFlashLoanRedeemHelper::previewRedeemSharesWithFlashLoanBorrowCall {
                        sharesToRedeem: amount,
                    },
                )
                .await
            }
            .boxed(),
        }
    }

    fn ltv_figure(&self, figure: LtvFigure) -> ReadFuture<'_, U256> {
        let vault = self.addresses.vault;
        match figure {
            LtvFigure::TargetLtv => self.view(vault, ILtvVault::targetLtvCall {}).boxed(),
            LtvFigure::MaxSafeLtv => self.view(vault, ILtvVault::maxSafeLtvCall {}).boxed(),
            LtvFigure::MinProfitLtv => self.view(vault, ILtvVault::minProfitLtvCall {}).boxed(),
            LtvFigure::RealBorrowAssets => self
                .view(vault, ILtvVault::getRealBorrowAssetsCall { isDeposit: false })
                .boxed(),
            LtvFigure::RealCollateralAssets => self
                .view(vault, ILtvVault::getRealCollateralAssetsCall { isDeposit: false })
                .boxed(),
        }
    }
}
