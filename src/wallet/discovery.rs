//! Wallet discovery - request / announce exchange
//!
//! Providers listen on a broadcast request channel and answer each request
//! with an announcement. They may also announce on their own, e.g. right
//! after they start. `discover` asks once and collects whatever arrives
//! within the window.

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use eyre::{eyre, Result};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Provider backed by `PRIVATE_KEY`
pub const LOCAL_KEY_NAME: &str = "local-key";

/// Read-only provider backed by `USER_ADDRESS`
pub const WATCH_ONLY_NAME: &str = "watch-only";

/// A wallet provider offering itself for connection
#[derive(Debug, Clone)]
pub struct WalletAnnouncement {
    pub name: String,
    pub address: Address,
    /// `None` for providers that can only watch
    pub signer: Option<PrivateKeySigner>,
}

impl WalletAnnouncement {
    pub fn local_key(private_key: &str) -> Result<Self> {
        let signer = PrivateKeySigner::from_str(private_key.trim().trim_start_matches("0x"))
            .map_err(|e| eyre!("Invalid PRIVATE_KEY: {}", e))?;
        Ok(Self {
            name: LOCAL_KEY_NAME.to_string(),
            address: signer.address(),
            signer: Some(signer),
        })
    }

    pub fn watch_only(address: Address) -> Self {
        Self {
            name: WATCH_ONLY_NAME.to_string(),
            address,
            signer: None,
        }
    }

    pub fn can_sign(&self) -> bool {
        self.signer.is_some()
    }
}

pub struct WalletDiscovery {
    requests: broadcast::Sender<()>,
    announce_tx: mpsc::UnboundedSender<WalletAnnouncement>,
    announce_rx: Mutex<mpsc::UnboundedReceiver<WalletAnnouncement>>,
}

impl Default for WalletDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletDiscovery {
    pub fn new() -> Self {
        let (requests, _) = broadcast::channel(16);
        let (announce_tx, announce_rx) = mpsc::unbounded_channel();
        Self {
            requests,
            announce_tx,
            announce_rx: Mutex::new(announce_rx),
        }
    }

    /// Channel ends for a provider living elsewhere
    pub fn endpoints(
        &self,
    ) -> (broadcast::Receiver<()>, mpsc::UnboundedSender<WalletAnnouncement>) {
        (self.requests.subscribe(), self.announce_tx.clone())
    }

    /// Run a provider that announces once on start and then answers
    /// every request until discovery goes away
    pub fn register(&self, announcement: WalletAnnouncement) -> JoinHandle<()> {
        let (mut requests, announce) = self.endpoints();
        tokio::spawn(async move {
            debug!("Wallet provider '{}' registered", announcement.name);
            if announce.send(announcement.clone()).is_err() {
                return;
            }
            loop {
                match requests.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        if announce.send(announcement.clone()).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Request announcements and collect them until `window` elapses.
    /// Later announcements replace earlier ones of the same name.
    pub async fn discover(&self, window: Duration) -> Vec<WalletAnnouncement> {
        let mut rx = self.announce_rx.lock().await;
        // no providers listening is fine
        let _ = self.requests.send(());

        let deadline = tokio::time::Instant::now() + window;
        let mut found: Vec<WalletAnnouncement> = Vec::new();
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                next = rx.recv() => match next {
                    Some(announcement) => {
                        match found.iter_mut().find(|a| a.name == announcement.name) {
                            Some(existing) => *existing = announcement,
                            None => found.push(announcement),
                        }
                    }
                    None => break,
                },
            }
        }

        info!("🔍 Discovered {} wallet provider(s)", found.len());
        found
    }
}
