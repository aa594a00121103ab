//! Contract interfaces used by the client
//!
//! Only the functions the client actually calls are declared.

use alloy_sol_types::sol;

sol! {
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }

    /// WETH-style wrapper around the chain's native currency
    interface IWrappedNative {
        function deposit() external payable;
    }
}

sol! {
    /// Leveraged vault: ERC-4626 surface on the borrow side plus the
    /// mirrored collateral-side functions, LTV figures, auctions and
    /// low-level rebalances.
    interface ILtvVault {
        // Tokens
        function asset() external view returns (address);
        function assetCollateral() external view returns (address);
        function totalAssets() external view returns (uint256);

        // Borrow-side limits
        function maxDeposit(address receiver) external view returns (uint256);
        function maxWithdraw(address owner) external view returns (uint256);
        function maxMint(address receiver) external view returns (uint256);
        function maxRedeem(address owner) external view returns (uint256);

        // Collateral-side limits
        function maxDepositCollateral(address receiver) external view returns (uint256);
        function maxWithdrawCollateral(address owner) external view returns (uint256);
        function maxMintCollateral(address receiver) external view returns (uint256);
        function maxRedeemCollateral(address owner) external view returns (uint256);

        // Previews
        function previewDeposit(uint256 assets) external view returns (uint256);
        function previewMint(uint256 shares) external view returns (uint256);
        function previewDepositCollateral(uint256 collateralAssets) external view returns (uint256);
        function previewMintCollateral(uint256 shares) external view returns (uint256);

        // LTV figures (1e18 = 100%)
        function targetLtv() external view returns (uint256);
        function maxSafeLtv() external view returns (uint256);
        function minProfitLtv() external view returns (uint256);
        function getRealBorrowAssets(bool isDeposit) external view returns (uint256);
        function getRealCollateralAssets(bool isDeposit) external view returns (uint256);

        // Borrow-side actions
        function deposit(uint256 assets, address receiver) external returns (uint256);
        function withdraw(uint256 assets, address receiver, address owner) external returns (uint256);
        function mint(uint256 shares, address receiver) external returns (uint256);
        function redeem(uint256 shares, address receiver, address owner) external returns (uint256);

        // Collateral-side actions
        function depositCollateral(uint256 collateralAssets, address receiver) external returns (uint256);
        function withdrawCollateral(uint256 collateralAssets, address receiver, address owner) external returns (uint256);
        function mintCollateral(uint256 shares, address receiver) external returns (uint256);
        function redeemCollateral(uint256 shares, address receiver, address owner) external returns (uint256);

        // Auctions
        function executeAuctionBorrow(int256 deltaUserBorrowAssets) external returns (int256);
        function executeAuctionCollateral(int256 deltaUserCollateralAssets) external returns (int256);

        // Low-level rebalances
        function executeLowLevelRebalanceShares(int256 deltaShares) external returns (int256, int256);
        function executeLowLevelRebalanceBorrow(int256 deltaBorrow) external returns (int256, int256);
        function executeLowLevelRebalanceCollateral(int256 deltaCollateral) external returns (int256, int256);
    }
}

sol! {
    interface IFlashLoanMintHelper {
        function previewMintSharesWithFlashLoanCollateral(uint256 sharesToMint) external view returns (uint256);
        function mintSharesWithFlashLoanCollateral(uint256 sharesToMint) external returns (uint256);
    }

    interface IFlashLoanRedeemHelper {
        function previewRedeemSharesWithFlashLoanBorrow(uint256 sharesToRedeem) external view returns (uint256);
        function redeemSharesWithFlashLoanBorrow(uint256 sharesToRedeem) external returns (uint256);
    }
}
