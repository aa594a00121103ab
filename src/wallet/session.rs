//! Wallet session: read provider plus the optional signing connection.
//!
//! A session is immutable. Connecting, disconnecting or switching network
//! builds a new one and swaps it in through the `SessionHandle`, the only
//! writer; readers keep the `Arc` they were handed.

use alloy_primitives::Address;
use eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{StoredWallet, WalletAnnouncement, WalletDiscovery, WalletStore};
use crate::chain::{RpcVaultReader, RpcVaultWriter, VaultAddresses};

/// Wallet attached to a session
pub struct ConnectedWallet {
    pub name: String,
    pub address: Address,
    /// `None` for watch-only wallets
    pub writer: Option<Arc<RpcVaultWriter>>,
}

pub struct WalletSession {
    pub chain_id: u64,
    pub reader: Arc<RpcVaultReader>,
    pub wallet: Option<ConnectedWallet>,
}

impl WalletSession {
    pub fn account(&self) -> Option<Address> {
        self.wallet.as_ref().map(|w| w.address)
    }

    pub fn writer(&self) -> Option<Arc<RpcVaultWriter>> {
        self.wallet.as_ref().and_then(|w| w.writer.clone())
    }
}

pub struct SessionHandle {
    rpc_url: String,
    chain_id: u64,
    addresses: VaultAddresses,
    store: WalletStore,
    /// Kept so a network switch can rebuild the signing connection
    connected: Option<WalletAnnouncement>,
    session: watch::Sender<Arc<WalletSession>>,
}

impl SessionHandle {
    /// Start with a read-only session
    pub fn new(rpc_url: &str, chain_id: u64, addresses: VaultAddresses, store: WalletStore) -> Result<Self> {
        let reader = Arc::new(RpcVaultReader::connect(rpc_url, addresses)?);
        let (session, _) = watch::channel(Arc::new(WalletSession {
            chain_id,
            reader,
            wallet: None,
        }));
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            chain_id,
            addresses,
            store,
            connected: None,
            session,
        })
    }

    pub fn current(&self) -> Arc<WalletSession> {
        self.session.borrow().clone()
    }

    fn build(&self, reader: Arc<RpcVaultReader>, announcement: Option<&WalletAnnouncement>) -> Result<WalletSession> {
        let wallet = match announcement {
            Some(a) => {
                let writer = match &a.signer {
                    Some(signer) => Some(Arc::new(RpcVaultWriter::connect(
                        &self.rpc_url,
                        signer.clone(),
                        self.addresses,
                    )?)),
                    None => None,
                };
                Some(ConnectedWallet {
                    name: a.name.clone(),
                    address: a.address,
                    writer,
                })
            }
            None => None,
        };
        Ok(WalletSession {
            chain_id: self.chain_id,
            reader,
            wallet,
        })
    }

    /// Connect an announced wallet and remember it for next time
    pub fn connect(&mut self, announcement: &WalletAnnouncement) -> Result<()> {
        let session = self.build(self.current().reader.clone(), Some(announcement))?;
        self.session.send_replace(Arc::new(session));
        self.connected = Some(announcement.clone());
        self.store.save(&StoredWallet::now(&announcement.name, announcement.address))?;
        info!("🔗 Connected '{}' ({})", announcement.name, announcement.address);
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<()> {
        let session = self.build(self.current().reader.clone(), None)?;
        self.session.send_replace(Arc::new(session));
        self.connected = None;
        self.store.clear()?;
        info!("🔌 Wallet disconnected");
        Ok(())
    }

    /// Point every connection at another network, keeping the wallet
    pub fn switch_network(&mut self, rpc_url: &str, chain_id: u64) -> Result<()> {
        self.rpc_url = rpc_url.to_string();
        self.chain_id = chain_id;
        let reader = Arc::new(RpcVaultReader::connect(rpc_url, self.addresses)?);
        let session = self.build(reader, self.connected.as_ref())?;
        self.session.send_replace(Arc::new(session));
        info!("🌐 Switched to chain {}", chain_id);
        Ok(())
    }

    /// Reconnect the stored wallet without prompting if it is announced
    /// again under the same name and address
    pub async fn reconnect_silently(
        &mut self,
        discovery: &WalletDiscovery,
        window: Duration,
    ) -> Result<Option<Address>> {
        let Some(stored) = self.store.load()? else {
            debug!("No stored wallet to reconnect");
            return Ok(None);
        };
        let announced = discovery.discover(window).await;
        match stored.find_in(&announced) {
            Some(announcement) => {
                let announcement = announcement.clone();
                self.connect(&announcement)?;
                Ok(Some(announcement.address))
            }
            None => {
                debug!("Stored wallet '{}' not announced, staying disconnected", stored.name);
                Ok(None)
            }
        }
    }
}
