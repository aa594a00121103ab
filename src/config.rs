//! Configuration for vault-watch
//!
//! Every key has a default so the watcher starts with nothing but a vault
//! address. Values come from the environment (and `.env`) or a TOML file.

use alloy_primitives::Address;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::actions::SubmitMode;
use crate::chain::VaultAddresses;
use crate::poller::BackoffPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Network Settings ==========
    pub rpc_url: String,

    /// Chain ID (1 = Ethereum Mainnet)
    pub chain_id: u64,

    // ========== Contracts ==========
    pub vault_address: Option<Address>,

    /// Token that native currency wraps into (WETH on mainnet)
    pub wrapped_native_address: Option<Address>,

    pub flash_loan_mint_helper: Option<Address>,
    pub flash_loan_redeem_helper: Option<Address>,

    // ========== Wallet Settings ==========
    /// Address to watch when no signing key is configured
    pub user_address: Option<Address>,

    /// Signing key for the local-key wallet (KEEP SECRET!)
    #[serde(skip_serializing)]
    pub private_key: Option<String>,

    /// Where the last connected wallet is remembered
    pub wallet_store_path: String,

    /// How long wallet discovery waits for announcements
    pub discovery_window_ms: u64,

    /// Preview only logs planned transactions
    pub submit_mode: SubmitMode,

    // ========== Off-chain API ==========
    pub api_base_url: String,
    pub api_timeout_secs: u64,

    // ========== Polling ==========
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    pub poll_multiplier: f64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Empty or unset is `None`; anything else must be a valid address
pub fn parse_address_opt(key: &str, value: Option<String>) -> Result<Option<Address>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Address::from_str(raw)
            .map(Some)
            .map_err(|e| eyre!("Invalid {} '{}': {}", key, raw, e)),
    }
}

fn env_address(key: &str) -> Result<Option<Address>> {
    parse_address_opt(key, env::var(key).ok())
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: env_or("CHAIN_ID", defaults.chain_id),

            // Contracts
            vault_address: env_address("VAULT_ADDRESS")?,
            wrapped_native_address: env_address("WRAPPED_NATIVE_ADDRESS")?,
            flash_loan_mint_helper: env_address("FLASH_LOAN_MINT_HELPER")?,
            flash_loan_redeem_helper: env_address("FLASH_LOAN_REDEEM_HELPER")?,

            // Wallet
            user_address: env_address("USER_ADDRESS")?,
            private_key: env::var("PRIVATE_KEY").ok().filter(|k| !k.trim().is_empty()),
            wallet_store_path: env::var("WALLET_STORE_PATH").unwrap_or(defaults.wallet_store_path),
            discovery_window_ms: env_or("DISCOVERY_WINDOW_MS", defaults.discovery_window_ms),
            submit_mode: match env::var("SUBMIT_MODE") {
                Ok(mode) => mode.parse()?,
                Err(_) => defaults.submit_mode,
            },

            // API
            api_base_url: env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            api_timeout_secs: env_or("API_TIMEOUT_SECS", defaults.api_timeout_secs),

            // Polling
            poll_initial_ms: env_or("POLL_INITIAL_MS", defaults.poll_initial_ms),
            poll_max_ms: env_or("POLL_MAX_MS", defaults.poll_max_ms),
            poll_multiplier: env_or("POLL_MULTIPLIER", defaults.poll_multiplier),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn backoff_policy(&self) -> Result<BackoffPolicy> {
        BackoffPolicy::new(
            Duration::from_millis(self.poll_initial_ms),
            Duration::from_millis(self.poll_max_ms),
            self.poll_multiplier,
        )
    }

    pub fn vault_addresses(&self) -> Result<VaultAddresses> {
        let vault = self
            .vault_address
            .ok_or_else(|| eyre!("VAULT_ADDRESS is not set"))?;
        Ok(VaultAddresses {
            vault,
            flash_loan_mint_helper: self.flash_loan_mint_helper,
            flash_loan_redeem_helper: self.flash_loan_redeem_helper,
        })
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    /// Validate configuration before connecting anywhere
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre!("Invalid RPC_URL - please set a valid RPC endpoint"));
        }
        self.vault_addresses()?;
        self.backoff_policy()?;

        if self.api_timeout_secs == 0 {
            return Err(eyre!("API_TIMEOUT_SECS must be at least 1"));
        }
        if self.submit_mode == SubmitMode::Live && self.private_key.is_none() {
            return Err(eyre!("Live submit mode requires PRIVATE_KEY"));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let addr = |a: Option<Address>| a.map(|a| a.to_string()).unwrap_or_else(|| "✗ Not Set".to_string());

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              VAULT WATCH - CONFIGURATION                   ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Submit Mode:       {:^40} ║", format!("{:?}", self.submit_mode).to_uppercase());
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CONTRACTS                                                  ║");
        println!("║ • Vault:        {:^43} ║", addr(self.vault_address));
        println!("║ • Wrapped:      {:^43} ║", addr(self.wrapped_native_address));
        println!("║ • Mint Helper:  {:^43} ║", addr(self.flash_loan_mint_helper));
        println!("║ • Redeem Help.: {:^43} ║", addr(self.flash_loan_redeem_helper));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ WALLET                                                     ║");
        println!("║ • Private Key:     {:^40} ║",
            if self.private_key.is_some() { "✓ Configured" } else { "✗ Not Set" }
        );
        println!("║ • Watch Address:   {:^40} ║",
            if self.user_address.is_some() { "✓ Configured" } else { "✗ Not Set" }
        );
        println!("║ • Store:           {:^40} ║", self.wallet_store_path);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ POLLING                                                    ║");
        println!("║ • Initial:         {:>37} ms ║", self.poll_initial_ms);
        println!("║ • Max:             {:>37} ms ║", self.poll_max_ms);
        println!("║ • Multiplier:      {:>38.2}x ║", self.poll_multiplier);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ API                                                        ║");
        println!("║ • Base URL:        {:^40} ║", self.api_base_url);
        println!("║ • Timeout:         {:>39}s ║", self.api_timeout_secs);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://eth.llamarpc.com".to_string(),
            chain_id: 1,
            vault_address: None,
            wrapped_native_address: None,
            flash_loan_mint_helper: None,
            flash_loan_redeem_helper: None,
            user_address: None,
            private_key: None,
            wallet_store_path: "./data/wallet.json".to_string(),
            discovery_window_ms: 500,
            submit_mode: SubmitMode::Preview,
            api_base_url: "https://api.ltv.finance".to_string(),
            api_timeout_secs: 10,
            poll_initial_ms: 12_000, // ~1 block
            poll_max_ms: 120_000,
            poll_multiplier: 2.0,
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const VAULT: Address = address!("1111111111111111111111111111111111111111");

    fn valid() -> Config {
        Config {
            vault_address: Some(VAULT),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_need_a_vault() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("VAULT_ADDRESS"));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_poll_settings_are_validated() {
        let config = Config {
            poll_multiplier: 1.0,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = Config {
            poll_initial_ms: 5_000,
            poll_max_ms: 1_000,
            ..valid()
        };
        assert!(config.validate().is_err());

        let policy = valid().backoff_policy().unwrap();
        assert_eq!(policy, BackoffPolicy::default());
    }

    #[test]
    fn test_live_mode_requires_key() {
        let config = Config {
            submit_mode: SubmitMode::Live,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = Config {
            submit_mode: SubmitMode::Live,
            private_key: Some("0x01".into()),
            ..valid()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_address_parsing() {
        assert_eq!(parse_address_opt("X", None).unwrap(), None);
        assert_eq!(parse_address_opt("X", Some("  ".into())).unwrap(), None);
        assert_eq!(
            parse_address_opt("X", Some("0x1111111111111111111111111111111111111111".into())).unwrap(),
            Some(VAULT)
        );
        assert!(parse_address_opt("VAULT_ADDRESS", Some("0x123".into())).is_err());
    }

    #[test]
    fn test_toml_round_trip_drops_private_key() {
        let dir = std::env::temp_dir().join(format!("vault-watch-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let config = Config {
            private_key: Some("secret".into()),
            submit_mode: SubmitMode::Live,
            ..valid()
        };
        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("secret"));

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.vault_address, Some(VAULT));
        assert_eq!(loaded.submit_mode, SubmitMode::Live);
        assert_eq!(loaded.private_key, None);
        assert_eq!(loaded.poll_max_ms, 120_000);
    }
}
