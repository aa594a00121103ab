//! Token metadata of the vault: addresses, symbols, decimals.
//! Loaded once per session; stays `None` until the whole set is known.

use alloy_primitives::Address;
use futures::FutureExt;
use std::sync::Arc;
use tracing::info;

use super::{SnapshotCell, SnapshotLoader};
use crate::chain::{ReadFuture, Side, VaultReads, VaultTokens};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultMetadata {
    pub shares: AssetInfo,
    pub borrow: AssetInfo,
    pub collateral: AssetInfo,
    pub wrapped_native: Option<Address>,
}

impl VaultMetadata {
    pub fn asset(&self, side: Side) -> &AssetInfo {
        match side {
            Side::Borrow => &self.borrow,
            Side::Collateral => &self.collateral,
        }
    }

    pub fn tokens(&self) -> VaultTokens {
        VaultTokens {
            borrow: self.borrow.address,
            collateral: self.collateral.address,
        }
    }

    /// Whether native currency can be wrapped into this side's asset
    pub fn is_wrappable(&self, side: Side) -> bool {
        self.wrapped_native == Some(self.asset(side).address)
    }
}

pub struct MetadataLoader<R> {
    reader: Arc<R>,
    wrapped_native: Option<Address>,
    cell: Arc<SnapshotCell<Option<VaultMetadata>>>,
}

impl<R: VaultReads> MetadataLoader<R> {
    pub fn new(
        reader: Arc<R>,
        wrapped_native: Option<Address>,
        cell: Arc<SnapshotCell<Option<VaultMetadata>>>,
    ) -> Self {
        Self {
            reader,
            wrapped_native,
            cell,
        }
    }
}

impl<R: VaultReads + 'static> SnapshotLoader for MetadataLoader<R> {
    type Value = Option<VaultMetadata>;

    fn cell(&self) -> &SnapshotCell<Option<VaultMetadata>> {
        &self.cell
    }

    fn fetch(&self) -> ReadFuture<'_, Option<VaultMetadata>> {
        async move {
            let r = self.reader.as_ref();
            let vault = r.addresses().vault;
            let tokens = r.vault_tokens().await?;

            let (share_decimals, share_symbol, borrow_decimals, borrow_symbol, coll_decimals, coll_symbol) =
                futures::try_join!(
                    r.decimals(vault),
                    r.symbol(vault),
                    r.decimals(tokens.borrow),
                    r.symbol(tokens.borrow),
                    r.decimals(tokens.collateral),
                    r.symbol(tokens.collateral),
                )?;

            info!(
                "✓ Vault {} ({}): borrow {} / collateral {}",
                share_symbol, vault, borrow_symbol, coll_symbol
            );

            Ok(Some(VaultMetadata {
                shares: AssetInfo { address: vault, symbol: share_symbol, decimals: share_decimals },
                borrow: AssetInfo {
                    address: tokens.borrow,
                    symbol: borrow_symbol,
                    decimals: borrow_decimals,
                },
                collateral: AssetInfo {
                    address: tokens.collateral,
                    symbol: coll_symbol,
                    decimals: coll_decimals,
                },
                wrapped_native: self.wrapped_native,
            }))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::load_once;
    use crate::testing::{MockReader, BORROW, COLLATERAL};

    #[tokio::test]
    async fn test_metadata_and_wrap_eligibility() {
        let reader = MockReader::default().with_vault_tokens();
        let cell = Arc::new(SnapshotCell::new("metadata", None));
        let loader = MetadataLoader::new(Arc::new(reader), Some(BORROW), cell.clone());

        load_once(&loader).await.unwrap();

        let snap = cell.current();
        let meta = snap.value().as_ref().unwrap();
        assert_eq!(meta.borrow.address, BORROW);
        assert_eq!(meta.collateral.address, COLLATERAL);
        assert_eq!(meta.borrow.decimals, 18);
        assert_eq!(meta.collateral.symbol, "COLL");
        assert!(meta.is_wrappable(Side::Borrow));
        assert!(!meta.is_wrappable(Side::Collateral));
    }

    #[tokio::test]
    async fn test_missing_tokens_leave_metadata_empty() {
        let cell = Arc::new(SnapshotCell::new("metadata", None));
        let loader = MetadataLoader::new(Arc::new(MockReader::default()), None, cell.clone());

        assert!(load_once(&loader).await.is_err());
        assert!(cell.current().value().is_none());
    }
}
