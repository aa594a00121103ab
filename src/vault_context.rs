//! Vault Context - owner of every snapshot and of the derived max amounts
//!
//! Metadata is loaded once. Limits and LTV are polled for the whole
//! session; balances only while an account is connected. A single
//! recompute task listens to the input cells and republishes
//! `DerivedMaxAmounts` whenever one of them changes.

use alloy_primitives::Address;
use eyre::{eyre, Result};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::aggregator::{
    load_once, poll_refresh, BalanceLoader, BalanceSnapshot, LimitLoader, LtvLoader, LtvSnapshot,
    MetadataLoader, Snapshot, SnapshotCell, VaultLimitSnapshot, VaultMetadata,
};
use crate::calculator::{derive_max_amounts, quote_mints, DerivedMaxAmounts, MaxInputs};
use crate::chain::VaultReads;
use crate::poller::{refresh_fn, BackoffPolicy, PollTask, RefreshFn};

/// A polled entity whose last batch failed to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub entity: &'static str,
    pub message: String,
    /// Failed batches since the context was built
    pub failures: u64,
}

pub struct VaultContext<R: VaultReads + 'static> {
    reader: Arc<R>,
    account: Option<Address>,
    started: bool,

    metadata: Arc<SnapshotCell<Option<VaultMetadata>>>,
    balances: Arc<SnapshotCell<BalanceSnapshot>>,
    limits: Arc<SnapshotCell<VaultLimitSnapshot>>,
    ltv: Arc<SnapshotCell<LtvSnapshot>>,
    derived: Arc<watch::Sender<DerivedMaxAmounts>>,

    metadata_loader: MetadataLoader<R>,
    limit_loader: Arc<LimitLoader<R>>,
    ltv_loader: Arc<LtvLoader<R>>,
    balance_loader: Option<Arc<BalanceLoader<R>>>,

    limit_task: PollTask,
    ltv_task: PollTask,
    balance_task: PollTask,
    recompute: JoinHandle<()>,
}

fn idle_refresh() -> RefreshFn {
    refresh_fn(|_| async { Err(eyre!("No account connected")) }.boxed())
}

impl<R: VaultReads + 'static> VaultContext<R> {
    /// Build the context with every task disabled. Call `start` to load
    /// metadata and begin polling.
    pub fn new(reader: Arc<R>, wrapped_native: Option<Address>, policy: BackoffPolicy) -> Self {
        let metadata = Arc::new(SnapshotCell::new("metadata", None));
        let balances = Arc::new(SnapshotCell::new("balances", BalanceSnapshot::default()));
        let limits = Arc::new(SnapshotCell::new("limits", VaultLimitSnapshot::default()));
        let ltv = Arc::new(SnapshotCell::new("ltv", LtvSnapshot::default()));
        let (derived, _) = watch::channel(DerivedMaxAmounts::default());
        let derived = Arc::new(derived);

        let metadata_loader = MetadataLoader::new(reader.clone(), wrapped_native, metadata.clone());
        let limit_loader = Arc::new(LimitLoader::new(reader.clone(), Address::ZERO, limits.clone()));
        let ltv_loader = Arc::new(LtvLoader::new(reader.clone(), ltv.clone()));

        let limit_task = PollTask::new("limits", policy, poll_refresh(limit_loader.clone()));
        let ltv_task = PollTask::new("ltv", policy, poll_refresh(ltv_loader.clone()));
        let balance_task = PollTask::new("balances", policy, idle_refresh());

        let recompute = tokio::spawn(recompute_loop(
            reader.clone(),
            metadata.subscribe(),
            balances.subscribe(),
            limits.subscribe(),
            derived.clone(),
        ));

        Self {
            reader,
            account: None,
            started: false,
            metadata,
            balances,
            limits,
            ltv,
            derived,
            metadata_loader,
            limit_loader,
            ltv_loader,
            balance_loader: None,
            limit_task,
            ltv_task,
            balance_task,
            recompute,
        }
    }

    /// Load metadata once, then enable polling
    pub async fn start(&mut self) -> Result<()> {
        if !self.metadata.current().is_loaded() {
            load_once(&self.metadata_loader).await?;
        }
        self.started = true;
        self.resume_tasks().await;
        Ok(())
    }

    /// Switch the connected account. Account-bound snapshots go back to
    /// loading and their poll chains restart for the new account.
    pub async fn set_account(&mut self, account: Option<Address>) {
        if self.account == account {
            return;
        }
        info!("👛 Account changed: {:?} -> {:?}", self.account, account);
        self.account = account;

        self.balance_task.set_enabled(false);
        self.limit_task.set_enabled(false);
        self.balances.reset(BalanceSnapshot::default());
        self.limits.reset(VaultLimitSnapshot::default());
        self.balance_loader = None;

        self.limit_loader = Arc::new(LimitLoader::new(
            self.reader.clone(),
            account.unwrap_or(Address::ZERO),
            self.limits.clone(),
        ));
        self.limit_task.set_refresh(poll_refresh(self.limit_loader.clone())).await;

        self.resume_tasks().await;
    }

    async fn resume_tasks(&mut self) {
        if !self.started {
            return;
        }
        self.limit_task.set_enabled(true);
        self.ltv_task.set_enabled(true);

        let tokens = self.metadata.current().value().as_ref().map(|m| m.tokens());
        if let (Some(account), Some(tokens)) = (self.account, tokens) {
            if self.balance_loader.is_none() {
                let loader = Arc::new(BalanceLoader::new(
                    self.reader.clone(),
                    account,
                    tokens,
                    self.balances.clone(),
                ));
                self.balance_task.set_refresh(poll_refresh(loader.clone())).await;
                self.balance_loader = Some(loader);
            }
            self.balance_task.set_enabled(true);
        }
    }

    /// Stop every poll chain; snapshots stay as they are
    pub fn pause(&mut self) {
        self.limit_task.set_enabled(false);
        self.ltv_task.set_enabled(false);
        self.balance_task.set_enabled(false);
        self.started = false;
    }

    /// Reload every polled snapshot right away, e.g. after a confirmed transaction
    pub async fn refresh_now(&self) {
        let balances = async {
            if let Some(loader) = &self.balance_loader {
                let _ = load_once(loader.as_ref()).await;
            }
        };
        let _ = futures::join!(
            load_once(self.limit_loader.as_ref()),
            load_once(self.ltv_loader.as_ref()),
            balances,
        );
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn metadata(&self) -> Option<VaultMetadata> {
        self.metadata.current().value().clone()
    }

    pub fn balances(&self) -> Snapshot<BalanceSnapshot> {
        self.balances.current()
    }

    pub fn ltv(&self) -> Snapshot<LtvSnapshot> {
        self.ltv.current()
    }

    pub fn derived(&self) -> DerivedMaxAmounts {
        self.derived.borrow().clone()
    }

    pub fn subscribe_ltv(&self) -> watch::Receiver<Snapshot<LtvSnapshot>> {
        self.ltv.subscribe()
    }

    pub fn subscribe_derived(&self) -> watch::Receiver<DerivedMaxAmounts> {
        self.derived.subscribe()
    }

    /// Error channel per polled entity. `Some` means the last batch
    /// failed to load, as opposed to a snapshot that is still loading.
    pub fn subscribe_errors(&self) -> Vec<(&'static str, watch::Receiver<Option<String>>)> {
        vec![
            (self.balances.name(), self.balances.subscribe_errors()),
            (self.limits.name(), self.limits.subscribe_errors()),
            (self.ltv.name(), self.ltv.subscribe_errors()),
        ]
    }

    /// Entities currently failing to load, for status output
    pub fn errors(&self) -> Vec<LoadFailure> {
        fn failing<T: Send + Sync + 'static>(cell: &SnapshotCell<T>) -> Option<LoadFailure> {
            cell.last_error().map(|message| LoadFailure {
                entity: cell.name(),
                message,
                failures: cell.failures(),
            })
        }
        [failing(&self.balances), failing(&self.limits), failing(&self.ltv)]
            .into_iter()
            .flatten()
            .collect()
    }
}

impl<R: VaultReads + 'static> Drop for VaultContext<R> {
    fn drop(&mut self) {
        self.recompute.abort();
    }
}

async fn recompute_loop<R: VaultReads + 'static>(
    reader: Arc<R>,
    mut metadata_rx: watch::Receiver<Snapshot<Option<VaultMetadata>>>,
    mut balances_rx: watch::Receiver<Snapshot<BalanceSnapshot>>,
    mut limits_rx: watch::Receiver<Snapshot<VaultLimitSnapshot>>,
    derived: Arc<watch::Sender<DerivedMaxAmounts>>,
) {
    loop {
        let metadata = metadata_rx.borrow_and_update().clone();
        let balances = balances_rx.borrow_and_update().clone();
        let limits = limits_rx.borrow_and_update().clone();

        let versions = (balances.version(), limits.version());
        let metadata = metadata.value().as_ref();
        let balances = balances.is_loaded().then(|| balances.value());
        let limits = limits.is_loaded().then(|| limits.value());

        let mint_quotes = match (metadata, balances) {
            (Some(meta), Some(bal)) => Some(quote_mints(reader.as_ref(), bal, meta).await),
            _ => None,
        };

        let next = derive_max_amounts(MaxInputs {
            metadata,
            balances,
            limits,
            mint_quotes: mint_quotes.as_ref(),
        });
        let changed = derived.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!("🧮 Max amounts recomputed (balances v{}, limits v{})", versions.0, versions.1);
        }

        let closed = tokio::select! {
            r = metadata_rx.changed() => r.is_err(),
            r = balances_rx.changed() => r.is_err(),
            r = limits_rx.changed() => r.is_err(),
        };
        if closed {
            break;
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::VaultOp;
    use crate::chain::{LimitKind, LtvFigure, Side};
    use crate::testing::{ether, MockReader, BORROW, COLLATERAL, USER, VAULT};
    use alloy_primitives::U256;
    use std::time::Duration;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(8), 2.0).unwrap()
    }

    fn funded_reader() -> MockReader {
        MockReader::default()
            .with_vault_tokens()
            .with_native(USER, ether(0, 10))
            .with_token(BORROW, USER, ether(5, 0))
            .with_token(COLLATERAL, USER, ether(1, 0))
            .with_token(VAULT, USER, ether(2, 0))
            .with_limit(LimitKind::MaxDeposit(Side::Borrow), ether(4, 0))
            .with_limit(LimitKind::MaxDeposit(Side::Collateral), ether(4, 0))
            .with_limit(LimitKind::MaxMint(Side::Borrow), ether(100, 0))
            .with_limit(LimitKind::MaxMint(Side::Collateral), ether(100, 0))
            .with_limit(LimitKind::MaxWithdraw(Side::Borrow), ether(3, 0))
            .with_limit(LimitKind::MaxRedeem(Side::Borrow), ether(2, 0))
            .with_ltv(LtvFigure::TargetLtv, ether(0, 750))
    }

    async fn wait_for(
        rx: &mut watch::Receiver<DerivedMaxAmounts>,
        f: impl FnMut(&DerivedMaxAmounts) -> bool,
    ) -> DerivedMaxAmounts {
        tokio::time::timeout(Duration::from_secs(30), rx.wait_for(f))
            .await
            .expect("timed out waiting for derived amounts")
            .expect("derived channel closed")
            .clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_derives_after_start() {
        let mut ctx = VaultContext::new(Arc::new(funded_reader()), Some(BORROW), policy());
        let mut rx = ctx.subscribe_derived();
        ctx.set_account(Some(USER)).await;
        ctx.start().await.unwrap();

        let derived = wait_for(&mut rx, |d| d.deposit.borrow.is_some() && d.mint.borrow.is_some()).await;

        assert_eq!(derived.get(VaultOp::Deposit, Side::Borrow).unwrap().display, "4.0");
        assert_eq!(derived.get(VaultOp::Deposit, Side::Collateral).unwrap().display, "1.0");
        // 1:1 preview on a 5.008 budget
        assert_eq!(derived.get(VaultOp::Mint, Side::Borrow).unwrap().display, "5.008");
        assert_eq!(derived.get(VaultOp::Withdraw, Side::Borrow).unwrap().display, "3.0");
        assert_eq!(derived.get(VaultOp::Redeem, Side::Borrow).unwrap().display, "2.0");

        assert_eq!(ctx.ltv().value().target_ltv, U256::from(ether(0, 750)));
        assert!(ctx.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_account_keeps_deposit_loading() {
        let mut ctx = VaultContext::new(Arc::new(funded_reader()), Some(BORROW), policy());
        let mut rx = ctx.subscribe_derived();
        ctx.start().await.unwrap();

        let derived = wait_for(&mut rx, |d| d.withdraw.borrow.is_some()).await;
        assert!(derived.deposit.borrow.is_none());
        assert!(derived.mint.collateral.is_none());
        assert!(!ctx.balances().is_loaded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_resets_account_state() {
        let mut ctx = VaultContext::new(Arc::new(funded_reader()), Some(BORROW), policy());
        let mut rx = ctx.subscribe_derived();
        ctx.set_account(Some(USER)).await;
        ctx.start().await.unwrap();
        wait_for(&mut rx, |d| d.deposit.borrow.is_some()).await;

        ctx.set_account(None).await;
        assert!(!ctx.balances().is_loaded());

        let derived = wait_for(&mut rx, |d| d.deposit.borrow.is_none() && d.withdraw.borrow.is_some()).await;
        assert!(derived.mint.borrow.is_none());
        assert_eq!(ctx.account(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_change_is_picked_up_by_polling() {
        let reader = Arc::new(funded_reader());
        let mut ctx = VaultContext::new(reader.clone(), None, policy());
        let mut rx = ctx.subscribe_derived();
        ctx.set_account(Some(USER)).await;
        ctx.start().await.unwrap();
        wait_for(&mut rx, |d| d.deposit.collateral.is_some()).await;

        reader.set_token(COLLATERAL, USER, ether(2, 500));
        let derived = wait_for(&mut rx, |d| {
            d.deposit.collateral.as_ref().map(|m| m.display.as_str()) == Some("2.5")
        })
        .await;
        assert_eq!(derived.mint.collateral.as_ref().unwrap().raw, U256::from(ether(2, 500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_polling() {
        let reader = Arc::new(funded_reader());
        let mut ctx = VaultContext::new(reader.clone(), None, policy());
        let mut rx = ctx.subscribe_derived();
        ctx.set_account(Some(USER)).await;
        ctx.start().await.unwrap();
        wait_for(&mut rx, |d| d.deposit.collateral.is_some()).await;

        ctx.pause();
        reader.set_token(COLLATERAL, USER, ether(2, 500));
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(ctx.derived().deposit.collateral.unwrap().display, "1.0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_limits_are_reported_apart_from_loading() {
        let reader = Arc::new(funded_reader().failing_limit(LimitKind::MaxRedeem(Side::Borrow)));
        let mut ctx = VaultContext::new(reader, Some(BORROW), policy());
        let mut errors = ctx.subscribe_errors();
        ctx.set_account(Some(USER)).await;
        ctx.start().await.unwrap();

        let (name, limits_rx) = errors
            .iter_mut()
            .find(|(name, _)| *name == "limits")
            .unwrap();
        let failed = tokio::time::timeout(Duration::from_secs(30), limits_rx.wait_for(|e| e.is_some()))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(*name, "limits");
        assert!(failed.is_some());

        // balances loaded fine and carry no error
        let reported = ctx.errors();
        let limits = reported.iter().find(|f| f.entity == "limits").unwrap();
        assert!(limits.message.contains("reverted"));
        assert!(limits.failures >= 1);
        assert!(!reported.iter().any(|f| f.entity == "balances"));
        assert!(ctx.derived().withdraw.borrow.is_none());
    }

    #[tokio::test]
    async fn test_start_fails_without_metadata() {
        let mut ctx = VaultContext::new(Arc::new(MockReader::default()), None, policy());
        assert!(ctx.start().await.is_err());
        assert!(ctx.metadata().is_none());
    }
}
