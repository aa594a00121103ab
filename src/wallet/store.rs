//! Last connected wallet, persisted as a single JSON file

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::WalletAnnouncement;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredWallet {
    pub name: String,
    pub address: Address,
    pub connected_at: DateTime<Utc>,
}

impl StoredWallet {
    pub fn now(name: &str, address: Address) -> Self {
        Self {
            name: name.to_string(),
            address,
            connected_at: Utc::now(),
        }
    }

    /// The announced provider matching this wallet, if any
    pub fn find_in<'a>(&self, announced: &'a [WalletAnnouncement]) -> Option<&'a WalletAnnouncement> {
        announced
            .iter()
            .find(|a| a.name == self.name && a.address == self.address)
    }
}

#[derive(Debug, Clone)]
pub struct WalletStore {
    path: PathBuf,
}

impl WalletStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `None` when nothing was stored; an unreadable file counts as nothing
    pub fn load(&self) -> Result<Option<StoredWallet>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&content) {
            Ok(wallet) => Ok(Some(wallet)),
            Err(e) => {
                warn!("Ignoring corrupt wallet store {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, wallet: &StoredWallet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(wallet)?)?;
        debug!("💾 Remembered wallet '{}' ({})", wallet.name, wallet.address);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            debug!("Forgot stored wallet");
        }
        Ok(())
    }
}
