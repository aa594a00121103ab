//! Action Runner - validate, wrap, approve, submit, confirm

use alloy_primitives::{Address, B256, U256};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{classify_error, ActionError, ActionStatus, SubmitMode, VaultAction};
use crate::aggregator::VaultMetadata;
use crate::calculator::units::{format_amount, parse_amount, parse_signed_amount};
use crate::calculator::{wrappable_native, DerivedMaxAmounts, VaultOp, GAS_RESERVE};
use crate::chain::{encode_call, PreviewKind, RebalanceTarget, Side, VaultReads, VaultWrites, WriteCall};

type ActionResult<T> = Result<T, ActionError>;

/// Token the user pays with, and whether native can be wrapped into it
struct Payment<'a> {
    token: Address,
    symbol: &'a str,
    decimals: u8,
    wrappable: bool,
}

pub struct ActionRunner<R, W: ?Sized> {
    reader: Arc<R>,
    writer: Arc<W>,
    mode: SubmitMode,
    status: watch::Sender<ActionStatus>,
}

impl<R: VaultReads, W: VaultWrites + ?Sized> ActionRunner<R, W> {
    pub fn new(reader: Arc<R>, writer: Arc<W>, mode: SubmitMode) -> Self {
        let (status, _) = watch::channel(ActionStatus::Idle);
        Self {
            reader,
            writer,
            mode,
            status,
        }
    }

    pub fn status(&self) -> ActionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ActionStatus> {
        self.status.subscribe()
    }

    /// Run one action end to end; returns the hashes of every confirmed
    /// transaction (empty in preview mode)
    pub async fn run(
        &self,
        action: &VaultAction,
        metadata: &VaultMetadata,
        derived: &DerivedMaxAmounts,
    ) -> ActionResult<Vec<B256>> {
        let label = action.label();
        self.status.send_replace(ActionStatus::InProgress(label.clone()));
        info!("🚀 Starting {}", label);

        let mut hashes = Vec::new();
        let outcome = self.execute(action, metadata, derived, &mut hashes).await;

        match &outcome {
            Ok(()) => {
                let message = match self.mode {
                    SubmitMode::Live => format!("{} confirmed", capitalize(&label)),
                    SubmitMode::Preview => format!("{} previewed, nothing sent", capitalize(&label)),
                };
                info!("✅ {}", message);
                self.status.send_replace(ActionStatus::Succeeded(message));
            }
            Err(e) => {
                info!("⛔ {}: {}", label, e);
                self.status.send_replace(ActionStatus::Failed(e.to_string()));
            }
        }
        outcome.map(|()| hashes)
    }

    async fn execute(
        &self,
        action: &VaultAction,
        metadata: &VaultMetadata,
        derived: &DerivedMaxAmounts,
        hashes: &mut Vec<B256>,
    ) -> ActionResult<()> {
        let account = self.writer.account();
        let vault = self.reader.addresses().vault;

        match action {
            VaultAction::Vault { op, side, amount } => {
                let (op, side) = (*op, *side);
                let decimals = if op.in_shares() {
                    metadata.shares.decimals
                } else {
                    metadata.asset(side).decimals
                };
                let amount = parse_amount(amount, decimals).map_err(|e| ActionError::validation(e.to_string()))?;
                self.check_max(derived, op, side, amount, metadata)?;

                let call = match op {
                    VaultOp::Deposit => {
                        let pay = payment(metadata, side);
                        self.ensure_balance(&pay, amount, hashes).await?;
                        self.ensure_allowance(&pay, vault, amount, hashes).await?;
                        WriteCall::Deposit { side, assets: amount, receiver: account }
                    }
                    VaultOp::Mint => {
                        let pay = payment(metadata, side);
                        let assets = self.preview(PreviewKind::Mint(side), amount, "mint").await?;
                        self.ensure_balance(&pay, assets, hashes).await?;
                        self.ensure_allowance(&pay, vault, assets, hashes).await?;
                        WriteCall::Mint { side, shares: amount, receiver: account }
                    }
                    VaultOp::Withdraw => WriteCall::Withdraw {
                        side,
                        assets: amount,
                        receiver: account,
                        owner: account,
                    },
                    VaultOp::Redeem => WriteCall::Redeem {
                        side,
                        shares: amount,
                        receiver: account,
                        owner: account,
                    },
                };
                self.send(call, hashes).await
            }

            VaultAction::FlashLoanMint { shares } => {
                let helper = self
                    .reader
                    .addresses()
                    .flash_loan_mint_helper
                    .ok_or_else(|| ActionError::validation("No flash-loan mint helper configured"))?;
                let shares = parse_amount(shares, metadata.shares.decimals)
                    .map_err(|e| ActionError::validation(e.to_string()))?;
                let pay = payment(metadata, Side::Collateral);
                let collateral = self.preview(PreviewKind::FlashLoanMint, shares, "mint with flash loan").await?;
                self.ensure_balance(&pay, collateral, hashes).await?;
                self.ensure_allowance(&pay, helper, collateral, hashes).await?;
                self.send(WriteCall::FlashLoanMint { shares }, hashes).await
            }

            VaultAction::FlashLoanRedeem { shares } => {
                let helper = self
                    .reader
                    .addresses()
                    .flash_loan_redeem_helper
                    .ok_or_else(|| ActionError::validation("No flash-loan redeem helper configured"))?;
                let shares = parse_amount(shares, metadata.shares.decimals)
                    .map_err(|e| ActionError::validation(e.to_string()))?;
                let pay = Payment {
                    token: metadata.shares.address,
                    symbol: &metadata.shares.symbol,
                    decimals: metadata.shares.decimals,
                    wrappable: false,
                };
                self.ensure_balance(&pay, shares, hashes).await?;
                self.ensure_allowance(&pay, helper, shares, hashes).await?;
                self.send(WriteCall::FlashLoanRedeem { shares }, hashes).await
            }

            VaultAction::Auction { side, delta } => {
                let delta = parse_signed_amount(delta, metadata.asset(*side).decimals)
                    .map_err(|e| ActionError::validation(e.to_string()))?;
                self.send(WriteCall::Auction { side: *side, delta }, hashes).await
            }

            VaultAction::Rebalance { target, delta } => {
                let decimals = match target {
                    RebalanceTarget::Shares => metadata.shares.decimals,
                    RebalanceTarget::Borrow => metadata.borrow.decimals,
                    RebalanceTarget::Collateral => metadata.collateral.decimals,
                };
                let delta = parse_signed_amount(delta, decimals).map_err(|e| ActionError::validation(e.to_string()))?;
                self.send(WriteCall::LowLevelRebalance { target: *target, delta }, hashes).await
            }
        }
    }

    fn check_max(
        &self,
        derived: &DerivedMaxAmounts,
        op: VaultOp,
        side: Side,
        amount: U256,
        metadata: &VaultMetadata,
    ) -> ActionResult<()> {
        let Some(max) = derived.get(op, side) else {
            return Ok(());
        };
        if amount > max.raw {
            let unit = if op.in_shares() {
                &metadata.shares.symbol
            } else {
                &metadata.asset(side).symbol
            };
            return Err(ActionError::validation(format!(
                "Amount exceeds the maximum of {} {}",
                max.display, unit
            )));
        }
        Ok(())
    }

    async fn preview(&self, kind: PreviewKind, amount: U256, action: &str) -> ActionResult<U256> {
        self.reader.preview(kind, amount).await.map_err(|e| classify_error(action, &e))
    }

    /// Make sure the wallet holds `required` of the payment token, wrapping
    /// native currency (minus the gas reserve) when that is allowed
    async fn ensure_balance(&self, pay: &Payment<'_>, required: U256, hashes: &mut Vec<B256>) -> ActionResult<()> {
        let account = self.writer.account();
        let held = self.token_balance(pay.token, account).await?;
        if held >= required {
            return Ok(());
        }

        let insufficient = || ActionError::validation(format!("Insufficient {} balance", pay.symbol));
        if !pay.wrappable {
            return Err(insufficient());
        }

        let native = self
            .reader
            .native_balance(account)
            .await
            .map_err(|e| classify_error("read balance", &e))?;
        let shortfall = required - held;
        if wrappable_native(native, U256::from(GAS_RESERVE)) < shortfall {
            return Err(insufficient());
        }

        info!(
            "🎁 Wrapping {} native into {}",
            format_amount(shortfall, pay.decimals),
            pay.symbol
        );
        self.send(WriteCall::WrapNative { token: pay.token, amount: shortfall }, hashes)
            .await?;
        if self.mode == SubmitMode::Preview {
            return Ok(());
        }

        let held = self.token_balance(pay.token, account).await?;
        if held < required {
            return Err(ActionError::validation(format!(
                "Insufficient {} balance after wrapping",
                pay.symbol
            )));
        }
        Ok(())
    }

    async fn ensure_allowance(
        &self,
        pay: &Payment<'_>,
        spender: Address,
        required: U256,
        hashes: &mut Vec<B256>,
    ) -> ActionResult<()> {
        let allowance = self
            .reader
            .allowance(pay.token, self.writer.account(), spender)
            .await
            .map_err(|e| classify_error("read allowance", &e))?;
        if allowance >= required {
            debug!("Allowance of {} already covers {}", pay.symbol, required);
            return Ok(());
        }
        self.send(
            WriteCall::Approve {
                token: pay.token,
                spender,
                amount: required,
            },
            hashes,
        )
        .await
    }

    async fn token_balance(&self, token: Address, account: Address) -> ActionResult<U256> {
        self.reader
            .token_balance(token, account)
            .await
            .map_err(|e| classify_error("read balance", &e))
    }

    /// Submit and wait for confirmation, or only log in preview mode
    async fn send(&self, call: WriteCall, hashes: &mut Vec<B256>) -> ActionResult<()> {
        let label = call.label();

        if self.mode == SubmitMode::Preview {
            let encoded = encode_call(&call, self.reader.addresses()).map_err(|e| classify_error(label, &e))?;
            info!(
                "📝 [preview] {} -> {} value={} data={}",
                label, encoded.to, encoded.value, encoded.data
            );
            return Ok(());
        }

        self.status.send_replace(ActionStatus::InProgress(label.to_string()));
        let handle = self.writer.submit(call).await.map_err(|e| classify_error(label, &e))?;
        info!("📤 {} sent: {}", label, handle.hash());
        let hash = handle.confirmed().await.map_err(|e| classify_error(label, &e))?;
        info!("✓ {} confirmed: {}", label, hash);
        hashes.push(hash);
        Ok(())
    }
}

fn payment(metadata: &VaultMetadata, side: Side) -> Payment<'_> {
    let asset = metadata.asset(side);
    Payment {
        token: asset.address,
        symbol: &asset.symbol,
        decimals: asset.decimals,
        wrappable: metadata.is_wrappable(side),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AssetInfo;
    use crate::calculator::{MaxAmount, SidePair};
    use crate::testing::{ether, MockReader, MockWriter, BORROW, COLLATERAL, USER, VAULT};
    use alloy_primitives::I256;

    fn metadata() -> VaultMetadata {
        let asset = |address, symbol: &str| AssetInfo {
            address,
            symbol: symbol.to_string(),
            decimals: 18,
        };
        VaultMetadata {
            shares: asset(VAULT, "LTV"),
            borrow: asset(BORROW, "WETH"),
            collateral: asset(COLLATERAL, "COLL"),
            wrapped_native: Some(BORROW),
        }
    }

    fn deposit(side: Side, amount: &str) -> VaultAction {
        VaultAction::Vault {
            op: VaultOp::Deposit,
            side,
            amount: amount.to_string(),
        }
    }

    fn runner(reader: Arc<MockReader>, writer: MockWriter) -> (ActionRunner<MockReader, MockWriter>, Arc<MockWriter>) {
        let writer = Arc::new(writer);
        (ActionRunner::new(reader, writer.clone(), SubmitMode::Live), writer)
    }

    #[tokio::test]
    async fn test_deposit_approves_then_deposits() {
        let reader = Arc::new(MockReader::default().with_token(COLLATERAL, USER, ether(3, 0)));
        let (runner, writer) = runner(reader.clone(), MockWriter::new(reader));

        let hashes = runner
            .run(&deposit(Side::Collateral, "2.5"), &metadata(), &DerivedMaxAmounts::default())
            .await
            .unwrap();

        let amount = U256::from(ether(2, 500));
        assert_eq!(hashes.len(), 2);
        assert_eq!(
            writer.submitted(),
            vec![
                WriteCall::Approve { token: COLLATERAL, spender: VAULT, amount },
                WriteCall::Deposit { side: Side::Collateral, assets: amount, receiver: USER },
            ]
        );
        assert_eq!(runner.status(), ActionStatus::Succeeded("Deposit collateral confirmed".into()));
    }

    #[tokio::test]
    async fn test_rejected_approval_is_cancellation() {
        let reader = Arc::new(MockReader::default().with_token(BORROW, USER, ether(3, 0)));
        let writer = MockWriter::new(reader.clone()).fail("approve", "User rejected the request. (code 4001)");
        let (runner, writer) = runner(reader, writer);

        let err = runner
            .run(&deposit(Side::Borrow, "1"), &metadata(), &DerivedMaxAmounts::default())
            .await
            .unwrap_err();

        assert_eq!(err, ActionError::UserCancelled);
        assert_eq!(runner.status(), ActionStatus::Failed("Transaction canceled by user".into()));
        assert!(writer.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_revert_reports_failed_action() {
        let reader = Arc::new(MockReader::default().with_token(BORROW, USER, ether(3, 0)));
        let writer = MockWriter::new(reader.clone()).fail("deposit", "execution reverted");
        let (runner, _) = runner(reader, writer);

        let err = runner
            .run(&deposit(Side::Borrow, "1"), &metadata(), &DerivedMaxAmounts::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to deposit");
    }

    #[tokio::test]
    async fn test_amount_above_max_is_rejected() {
        let reader = Arc::new(MockReader::default().with_token(BORROW, USER, ether(9, 0)));
        let (runner, writer) = runner(reader.clone(), MockWriter::new(reader));
        let derived = DerivedMaxAmounts {
            deposit: SidePair {
                borrow: Some(MaxAmount {
                    raw: U256::from(ether(4, 0)),
                    display: "4.0".into(),
                }),
                collateral: None,
            },
            ..Default::default()
        };

        let err = runner
            .run(&deposit(Side::Borrow, "4.5"), &metadata(), &derived)
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::validation("Amount exceeds the maximum of 4.0 WETH"));
        assert!(writer.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_amounts_are_validation_errors() {
        let reader = Arc::new(MockReader::default());
        let (runner, writer) = runner(reader.clone(), MockWriter::new(reader));

        for input in ["", "0", "-1", "abc"] {
            let err = runner
                .run(&deposit(Side::Borrow, input), &metadata(), &DerivedMaxAmounts::default())
                .await
                .unwrap_err();
            assert!(matches!(err, ActionError::Validation(_)), "{input}: {err:?}");
        }
        assert!(writer.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_wraps_shortfall_keeping_gas_reserve() {
        let reader = Arc::new(
            MockReader::default()
                .with_token(BORROW, USER, ether(1, 0))
                .with_native(USER, ether(1, 0)),
        );
        let (runner, writer) = runner(reader.clone(), MockWriter::new(reader.clone()));

        runner
            .run(&deposit(Side::Borrow, "1.5"), &metadata(), &DerivedMaxAmounts::default())
            .await
            .unwrap();

        let calls = writer.submitted();
        assert_eq!(calls[0], WriteCall::WrapNative { token: BORROW, amount: U256::from(ether(0, 500)) });
        assert_eq!(calls.len(), 3);
        assert_eq!(reader.token(BORROW, USER), U256::from(ether(1, 500)));
    }

    #[tokio::test]
    async fn test_native_inside_reserve_is_not_wrapped() {
        let reader = Arc::new(
            MockReader::default()
                .with_token(BORROW, USER, ether(1, 0))
                .with_native(USER, ether(0, 501)),
        );
        let (runner, writer) = runner(reader.clone(), MockWriter::new(reader));

        // needs 0.5, only 0.499 is wrappable
        let err = runner
            .run(&deposit(Side::Borrow, "1.5"), &metadata(), &DerivedMaxAmounts::default())
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::validation("Insufficient WETH balance"));
        assert!(writer.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_wrap_without_balance_change_is_validation_error() {
        let reader = Arc::new(
            MockReader::default()
                .with_token(BORROW, USER, ether(1, 0))
                .with_native(USER, ether(2, 0)),
        );
        let writer = MockWriter::new(reader.clone()).ignore_wraps();
        let (runner, writer) = runner(reader, writer);

        let err = runner
            .run(&deposit(Side::Borrow, "1.5"), &metadata(), &DerivedMaxAmounts::default())
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::validation("Insufficient WETH balance after wrapping"));
        assert_eq!(writer.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_collateral_is_never_wrapped() {
        let reader = Arc::new(MockReader::default().with_native(USER, ether(10, 0)));
        let (runner, _) = runner(reader.clone(), MockWriter::new(reader));

        let err = runner
            .run(&deposit(Side::Collateral, "1"), &metadata(), &DerivedMaxAmounts::default())
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::validation("Insufficient COLL balance"));
    }

    #[tokio::test]
    async fn test_mint_pays_previewed_assets() {
        let reader = Arc::new(
            MockReader::default()
                .with_token(COLLATERAL, USER, ether(10, 0))
                .with_preview_rate(PreviewKind::Mint(Side::Collateral), 2, 1),
        );
        let (runner, writer) = runner(reader.clone(), MockWriter::new(reader));
        let action = VaultAction::Vault {
            op: VaultOp::Mint,
            side: Side::Collateral,
            amount: "3".into(),
        };

        runner.run(&action, &metadata(), &DerivedMaxAmounts::default()).await.unwrap();

        let calls = writer.submitted();
        assert_eq!(
            calls[0],
            WriteCall::Approve { token: COLLATERAL, spender: VAULT, amount: U256::from(ether(6, 0)) }
        );
        assert_eq!(
            calls[1],
            WriteCall::Mint { side: Side::Collateral, shares: U256::from(ether(3, 0)), receiver: USER }
        );
    }

    #[tokio::test]
    async fn test_redeem_needs_no_approval() {
        let reader = Arc::new(MockReader::default());
        let (runner, writer) = runner(reader.clone(), MockWriter::new(reader));
        let action = VaultAction::Vault {
            op: VaultOp::Redeem,
            side: Side::Borrow,
            amount: "1".into(),
        };

        runner.run(&action, &metadata(), &DerivedMaxAmounts::default()).await.unwrap();
        assert_eq!(
            writer.submitted(),
            vec![WriteCall::Redeem {
                side: Side::Borrow,
                shares: U256::from(ether(1, 0)),
                receiver: USER,
                owner: USER,
            }]
        );
    }

    #[tokio::test]
    async fn test_flash_loan_mint_requires_helper() {
        let reader = Arc::new(MockReader::default());
        let (runner, _) = runner(reader.clone(), MockWriter::new(reader));
        let action = VaultAction::FlashLoanMint { shares: "1".into() };

        let err = runner.run(&action, &metadata(), &DerivedMaxAmounts::default()).await.unwrap_err();
        assert_eq!(err, ActionError::validation("No flash-loan mint helper configured"));
    }

    #[tokio::test]
    async fn test_auction_submits_signed_delta() {
        let reader = Arc::new(MockReader::default());
        let (runner, writer) = runner(reader.clone(), MockWriter::new(reader));
        let action = VaultAction::Auction {
            side: Side::Borrow,
            delta: "-0.5".into(),
        };

        runner.run(&action, &metadata(), &DerivedMaxAmounts::default()).await.unwrap();

        let expected = -I256::try_from(ether(0, 500)).unwrap();
        assert_eq!(writer.submitted(), vec![WriteCall::Auction { side: Side::Borrow, delta: expected }]);
    }

    #[tokio::test]
    async fn test_preview_mode_sends_nothing() {
        let reader = Arc::new(
            MockReader::default()
                .with_token(BORROW, USER, ether(1, 0))
                .with_native(USER, ether(5, 0)),
        );
        let writer = Arc::new(MockWriter::new(reader.clone()));
        let runner = ActionRunner::new(reader, writer.clone(), SubmitMode::Preview);

        let hashes = runner
            .run(&deposit(Side::Borrow, "3"), &metadata(), &DerivedMaxAmounts::default())
            .await
            .unwrap();

        assert!(hashes.is_empty());
        assert!(writer.submitted().is_empty());
        assert_eq!(
            runner.status(),
            ActionStatus::Succeeded("Deposit borrow previewed, nothing sent".into())
        );
    }
}
