//! vault-watch - leveraged vault client
//!
//! Run with: cargo run -- watch
//!
//! Subcommands:
//! - watch: poll the vault and print state and max amounts as they change
//! - act:   validate and run one vault action
//! - terms: sign the terms of use with the local key
//! - forget: drop the remembered wallet

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod actions;
mod aggregator;
mod api;
mod calculator;
mod chain;
mod config;
mod poller;
#[cfg(test)]
mod testing;
mod vault_context;
mod wallet;

use actions::{ActionRunner, ActionStatus, SubmitMode, VaultAction};
use api::ApiClient;
use calculator::units::format_wad_percent;
use calculator::{DerivedMaxAmounts, VaultOp};
use chain::{RebalanceTarget, RpcVaultReader, Side, VaultWrites, WatchOnlyWriter};
use config::Config;
use vault_context::{LoadFailure, VaultContext};
use wallet::{SessionHandle, WalletAnnouncement, WalletDiscovery, WalletStore};

// ============================================
// CLI
// ============================================

#[derive(Parser)]
#[command(name = "vault-watch", version, about = "Adaptive polling client for leveraged vaults")]
struct Cli {
    /// Load settings from a TOML file instead of the environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the vault and print state as it changes
    Watch,

    /// Run one vault action
    Act {
        #[arg(value_enum)]
        action: ActionArg,

        #[arg(long, value_enum, default_value = "borrow")]
        side: SideArg,

        /// Amount as typed, e.g. 1.5 (signed for auctions and rebalances)
        #[arg(long, allow_hyphen_values = true)]
        amount: String,

        /// Delta unit for low-level rebalances
        #[arg(long, value_enum, default_value = "shares")]
        target: TargetArg,
    },

    /// Sign the terms of use with the local key
    Terms,

    /// Forget the remembered wallet
    Forget,
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Deposit,
    Mint,
    Withdraw,
    Redeem,
    FlashMint,
    FlashRedeem,
    Auction,
    Rebalance,
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Borrow,
    Collateral,
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetArg {
    Shares,
    Borrow,
    Collateral,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Borrow => Side::Borrow,
            SideArg::Collateral => Side::Collateral,
        }
    }
}

fn build_action(action: ActionArg, side: Side, amount: String, target: TargetArg) -> VaultAction {
    let vault = |op| VaultAction::Vault { op, side, amount: amount.clone() };
    match action {
        ActionArg::Deposit => vault(VaultOp::Deposit),
        ActionArg::Mint => vault(VaultOp::Mint),
        ActionArg::Withdraw => vault(VaultOp::Withdraw),
        ActionArg::Redeem => vault(VaultOp::Redeem),
        ActionArg::FlashMint => VaultAction::FlashLoanMint { shares: amount },
        ActionArg::FlashRedeem => VaultAction::FlashLoanRedeem { shares: amount },
        ActionArg::Auction => VaultAction::Auction { side, delta: amount },
        ActionArg::Rebalance => VaultAction::Rebalance {
            target: match target {
                TargetArg::Shares => RebalanceTarget::Shares,
                TargetArg::Borrow => RebalanceTarget::Borrow,
                TargetArg::Collateral => RebalanceTarget::Collateral,
            },
            delta: amount,
        },
    }
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!("{}", style(" 🏦 VAULT WATCH - Leveraged Vault Client").cyan().bold());
    println!(
        "{}",
        style("    Adaptive Polling | Atomic Snapshots | Max Amounts").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

// ============================================
// SESSION SETUP
// ============================================

/// Build the session, announce the configured wallets and connect one
async fn open_session(config: &Config) -> Result<SessionHandle> {
    let store = WalletStore::new(&config.wallet_store_path);
    let mut session = SessionHandle::new(&config.rpc_url, config.chain_id, config.vault_addresses()?, store)?;

    let served = session.current().reader.chain_id().await?;
    if served != config.chain_id {
        warn!("RPC serves chain {} but CHAIN_ID is {}; following the RPC", served, config.chain_id);
        session.switch_network(&config.rpc_url, served)?;
    }

    let discovery = WalletDiscovery::new();
    if let Some(key) = &config.private_key {
        discovery.register(WalletAnnouncement::local_key(key)?);
    }
    if let Some(address) = config.user_address {
        discovery.register(WalletAnnouncement::watch_only(address));
    }

    if session.reconnect_silently(&discovery, config.discovery_window()).await?.is_some() {
        return Ok(session);
    }

    let mut announced = discovery.discover(config.discovery_window()).await;
    // signing wallets first
    announced.sort_by_key(|a| !a.can_sign());
    match announced.first() {
        Some(announcement) => session.connect(announcement)?,
        None => warn!("No wallet configured, watching vault-wide figures only"),
    }
    Ok(session)
}

async fn start_context(config: &Config, session: &SessionHandle) -> Result<VaultContext<RpcVaultReader>> {
    let current = session.current();
    let mut ctx = VaultContext::new(
        current.reader.clone(),
        config.wrapped_native_address,
        config.backoff_policy()?,
    );
    ctx.set_account(current.account()).await;
    ctx.start().await?;
    Ok(ctx)
}

/// Snapshots a max amount is derived from
fn inputs_of(op: VaultOp) -> &'static [&'static str] {
    match op {
        VaultOp::Deposit | VaultOp::Mint => &["balances", "limits"],
        VaultOp::Withdraw | VaultOp::Redeem => &["limits"],
    }
}

/// `…` while loading, `✗` when an input failed to load
fn print_max_amounts(derived: &DerivedMaxAmounts, errors: &[LoadFailure]) {
    println!("{}", style("Max amounts").bold());
    for side in [Side::Borrow, Side::Collateral] {
        let cells: Vec<String> = VaultOp::ALL
            .iter()
            .map(|op| {
                let failed = errors.iter().any(|f| inputs_of(*op).contains(&f.entity));
                let value = match derived.get(*op, side) {
                    Some(max) => max.display.clone(),
                    None if failed => "✗".to_string(),
                    None => "…".to_string(),
                };
                format!("{} {:>14}", op, value)
            })
            .collect();
        println!("  {:<11} {}", side.to_string(), cells.join("  "));
    }
}

// ============================================
// COMMANDS
// ============================================

async fn watch(config: &Config) -> Result<()> {
    let session = open_session(config).await?;
    let mut ctx = start_context(config, &session).await?;
    let current = session.current();

    if let Some(wallet) = &current.wallet {
        println!("{} Wallet '{}' {}", style("👛").cyan(), wallet.name, wallet.address);
    }
    if let Some(meta) = ctx.metadata() {
        println!(
            "{} Vault {} | borrow {} | collateral {}",
            style("✓").green(),
            meta.shares.symbol,
            meta.borrow.symbol,
            meta.collateral.symbol
        );
    }

    let api = ApiClient::new(&config.api_base_url, current.chain_id, config.api_timeout())?;
    let vault = config.vault_addresses()?.vault;
    if let Some(apy) = api.apy(vault).await {
        println!(
            "   APY 30d: {} | 7d: {}",
            apy.apy_30d.map(|v| format!("{:.2}%", v)).unwrap_or_else(|| "-".into()),
            apy.apy_7d.map(|v| format!("{:.2}%", v)).unwrap_or_else(|| "-".into()),
        );
    }
    if let Some(account) = ctx.account() {
        match api.points(account).await {
            Some(points) => println!("   Points: {}", points),
            None => println!("   Points: unavailable"),
        }
    }
    println!();

    let mut derived_rx = ctx.subscribe_derived();
    let mut ltv_rx = ctx.subscribe_ltv();
    let mut error_rxs = ctx.subscribe_errors();

    loop {
        tokio::select! {
            changed = derived_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let derived = derived_rx.borrow_and_update().clone();
                print_max_amounts(&derived, &ctx.errors());
            }
            (changed, index) = async {
                let (changed, index, _) = futures::future::select_all(
                    error_rxs.iter_mut().map(|(_, rx)| Box::pin(rx.changed())),
                )
                .await;
                (changed, index)
            } => {
                if changed.is_err() {
                    break;
                }
                let (name, rx) = &mut error_rxs[index];
                match rx.borrow_and_update().clone() {
                    Some(err) => {
                        let failures = ctx
                            .errors()
                            .iter()
                            .find(|f| f.entity == *name)
                            .map_or(1, |f| f.failures);
                        println!("{} {} failed to load ({}x): {}", style("✗").red(), name, failures, err);
                    }
                    None => println!("{} {} recovered", style("✓").green(), name),
                }
            }
            changed = ltv_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = ltv_rx.borrow_and_update().clone();
                let ltv = *snapshot.value();
                let at = snapshot
                    .taken_at()
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_default();
                let current = ltv.current_ltv().map(format_wad_percent).unwrap_or_else(|| "-".into());
                println!(
                    "{} {} LTV {} (target {}, safe ≤ {}){}",
                    style("📈").cyan(),
                    at,
                    current,
                    format_wad_percent(ltv.target_ltv),
                    format_wad_percent(ltv.max_safe_ltv),
                    if ltv.needs_rebalance() { " ⚠️  outside band" } else { "" }
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                ctx.pause();
                break;
            }
        }
    }

    Ok(())
}

async fn act(config: &Config, action: VaultAction) -> Result<()> {
    let session = open_session(config).await?;
    let current = session.current();
    let account = current
        .account()
        .ok_or_else(|| eyre!("No wallet connected; set PRIVATE_KEY or USER_ADDRESS"))?;
    if config.submit_mode == SubmitMode::Live && current.writer().is_none() {
        return Err(eyre!("Live submit mode needs a signing wallet (PRIVATE_KEY)"));
    }

    let ctx = start_context(config, &session).await?;
    let metadata = ctx.metadata().ok_or_else(|| eyre!("Vault metadata not loaded"))?;

    ctx.refresh_now().await;
    let mut derived_rx = ctx.subscribe_derived();
    let loaded = tokio::time::timeout(
        Duration::from_secs(10),
        derived_rx.wait_for(|d| d.withdraw.borrow.is_some() && d.deposit.borrow.is_some()),
    )
    .await
    .is_ok_and(|r| r.is_ok());
    if !loaded {
        warn!("Max amounts not ready, continuing without max checks");
        for failure in ctx.errors() {
            warn!("{} failed to load: {}", failure.entity, failure.message);
        }
    }
    let derived = ctx.derived();

    let writer: Arc<dyn VaultWrites> = match current.writer() {
        Some(writer) => writer as Arc<dyn VaultWrites>,
        None => Arc::new(WatchOnlyWriter::new(account)),
    };
    let runner = ActionRunner::new(current.reader.clone(), writer, config.submit_mode);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let mut status_rx = runner.subscribe();
    let progress = spinner.clone();
    let status_task = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            if let ActionStatus::InProgress(label) = status_rx.borrow_and_update().clone() {
                progress.set_message(format!("{}…", label));
            }
        }
    });

    let outcome = runner.run(&action, &metadata, &derived).await;
    spinner.finish_and_clear();
    status_task.abort();

    match outcome {
        Ok(hashes) => {
            if let ActionStatus::Succeeded(message) = runner.status() {
                println!("{} {}", style("✓").green(), message);
            }
            for hash in hashes {
                println!("   tx {}", hash);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} {}", style("✗").red(), e);
            Err(e.into())
        }
    }
}

async fn terms(config: &Config) -> Result<()> {
    let key = config
        .private_key
        .as_deref()
        .ok_or_else(|| eyre!("Signing the terms needs PRIVATE_KEY"))?;
    let local = WalletAnnouncement::local_key(key)?;
    let signer = local.signer.as_ref().ok_or_else(|| eyre!("Local key has no signer"))?;
    let api = ApiClient::new(&config.api_base_url, config.chain_id, config.api_timeout())?;

    if api.terms_signed(local.address).await == Some(true) {
        println!("{} Terms already accepted by {}", style("✓").green(), local.address);
        return Ok(());
    }

    let signature = api::sign_terms(signer).await?;
    if api.submit_terms_signature(local.address, &signature).await {
        println!("{} Terms accepted by {}", style("✓").green(), local.address);
        Ok(())
    } else {
        Err(eyre!("Terms signature was not accepted"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vault_watch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Command::Forget = cli.command {
        let store = WalletStore::new(&config.wallet_store_path);
        SessionHandle::new(&config.rpc_url, config.chain_id, config.vault_addresses()?, store)?.disconnect()?;
        println!("{} Forgot the remembered wallet", style("✓").green());
        return Ok(());
    }

    print_banner();

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }

    config.print_summary();
    println!();

    match cli.command {
        Command::Watch => watch(&config).await,
        Command::Act { action, side, amount, target } => {
            act(&config, build_action(action, side.into(), amount, target)).await
        }
        Command::Terms => terms(&config).await,
        Command::Forget => Ok(()),
    }
}
