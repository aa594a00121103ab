//! Wallets: discovery, the active session, and the remembered wallet

mod discovery;
mod session;
mod store;

pub use discovery::{WalletAnnouncement, WalletDiscovery};
pub use session::SessionHandle;
pub use store::{StoredWallet, WalletStore};
