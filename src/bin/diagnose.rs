//! Diagnostic tool - Check configuration before watching a vault
//!
//! Run with: cargo run --bin diagnose

use std::env;

fn is_set(key: &str) -> bool {
    env::var(key).map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn looks_like_address(value: &str) -> bool {
    let hex = value.trim().trim_start_matches("0x");
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

fn main() {
    println!("🔍 VAULT WATCH DIAGNOSTIC CHECK\n");

    // Load .env
    dotenvy::dotenv().ok();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("CHAIN_ID", "1", "Network the vault lives on"),
        ("SUBMIT_MODE", "preview", "Preview logs calls, live sends them"),
        ("POLL_INITIAL_MS", "12000", "First polling delay"),
        ("POLL_MAX_MS", "120000", "Slowest polling delay"),
        ("POLL_MULTIPLIER", "2.0", "Delay growth per failed poll"),
        ("API_BASE_URL", "https://api.ltv.finance", "Points, APY and terms service"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let marker = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    // RPC check
    let rpc = env::var("RPC_URL").unwrap_or_else(|_| "NOT SET".to_string());
    let rpc_display = if rpc.len() > 50 {
        format!("{}...{}", &rpc[..30], &rpc[rpc.len() - 15..])
    } else {
        rpc.clone()
    };
    println!("  RPC_URL: {}", rpc_display);

    println!("\n═══════════════════════════════════════════════════");
    println!("                     CONTRACTS                      ");
    println!("═══════════════════════════════════════════════════\n");

    let mut bad_addresses = Vec::new();
    for key in [
        "VAULT_ADDRESS",
        "WRAPPED_NATIVE_ADDRESS",
        "FLASH_LOAN_MINT_HELPER",
        "FLASH_LOAN_REDEEM_HELPER",
        "USER_ADDRESS",
    ] {
        let status = match env::var(key) {
            Ok(v) if v.trim().is_empty() => "❌ Not set",
            Ok(v) if looks_like_address(&v) => "✅ Set",
            Ok(_) => {
                bad_addresses.push(key);
                "⚠️  Not an address"
            }
            Err(_) => "❌ Not set",
        };
        println!("  {:<26} {}", format!("{}:", key), status);
    }

    let vault = is_set("VAULT_ADDRESS");
    let key = is_set("PRIVATE_KEY");
    let watch = is_set("USER_ADDRESS");
    let mode = env::var("SUBMIT_MODE").unwrap_or_else(|_| "preview".to_string());

    println!("\n═══════════════════════════════════════════════════");
    println!("                      WALLET                        ");
    println!("═══════════════════════════════════════════════════\n");

    println!("  PRIVATE_KEY:               {}", if key { "✅ Set" } else { "❌ Not set" });
    println!("  USER_ADDRESS:              {}", if watch { "✅ Set" } else { "❌ Not set" });

    match (key, watch) {
        (true, _) => println!("\n  🔑 local-key wallet can sign actions"),
        (false, true) => println!("\n  👀 watch-only wallet: balances and max amounts, no signing"),
        (false, false) => println!("\n  🌐 No wallet: vault-wide figures only"),
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    match mode.to_lowercase().as_str() {
        "preview" => {
            println!("  📋 PREVIEW MODE");
            println!("     → Actions are validated and encoded");
            println!("     → Nothing is sent to the network");
        }
        "live" => {
            println!("  🚀 LIVE MODE");
            println!("     → Actions WILL submit real transactions!");
            if !key {
                println!("\n  ⚠️  WARNING: Live mode but PRIVATE_KEY is missing!");
                println!("     vault-watch will refuse to start.");
            }
        }
        _ => {
            println!("  ❓ Unknown mode: {}", mode);
        }
    }

    if !vault {
        println!("\n  ⚠️  VAULT_ADDRESS is required. Nothing to watch without it.");
    }
    if !bad_addresses.is_empty() {
        println!("\n  ⚠️  Fix malformed addresses: {}", bad_addresses.join(", "));
    }

    println!("\n✅ Diagnostic complete!\n");
}
