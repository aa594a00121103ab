//! Read aggregation
//!
//! Each loader fans out the reads that describe one entity, waits for all
//! of them, and publishes the result into a `SnapshotCell` in one step.
//! A single failed read throws the whole batch away; the previous snapshot
//! stays visible.

mod balances;
mod limits;
mod ltv;
mod metadata;
mod snapshot;

pub use balances::{BalanceLoader, BalanceSnapshot};
pub use limits::{LimitLoader, SideValues, VaultLimitSnapshot};
pub use ltv::{LtvLoader, LtvSnapshot};
pub use metadata::{AssetInfo, MetadataLoader, VaultMetadata};
pub use snapshot::{Snapshot, SnapshotCell};

use eyre::Result;
use futures::FutureExt;
use std::sync::Arc;
use tracing::warn;

use crate::chain::ReadFuture;
use crate::poller::{refresh_fn, Liveness, RefreshFn};

/// A batch of reads that together form one snapshot
pub trait SnapshotLoader: Send + Sync + 'static {
    type Value: Send + Sync + 'static;

    fn cell(&self) -> &SnapshotCell<Self::Value>;

    /// All reads of the batch; fails if any of them fails
    fn fetch(&self) -> ReadFuture<'_, Self::Value>;
}

/// Run one batch and publish it, or record the failure
pub async fn refresh<L: SnapshotLoader>(loader: &L, liveness: &Liveness) -> Result<()> {
    match loader.fetch().await {
        Ok(value) => {
            loader.cell().publish_if_live(liveness, value);
            Ok(())
        }
        Err(e) => {
            if !liveness.is_cancelled() {
                warn!("⚠️  {} refresh failed, keeping previous snapshot: {}", loader.cell().name(), e);
                loader.cell().record_failure(e.to_string());
            }
            Err(e)
        }
    }
}

/// One-shot load outside of any poll task
pub async fn load_once<L: SnapshotLoader>(loader: &L) -> Result<()> {
    refresh(loader, &Liveness::new()).await
}

/// Adapt a loader into a poll task refresh function
pub fn poll_refresh<L: SnapshotLoader>(loader: Arc<L>) -> RefreshFn {
    refresh_fn(move |liveness| {
        let loader = loader.clone();
        async move { refresh(loader.as_ref(), &liveness).await }.boxed()
    })
}
