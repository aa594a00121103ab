//! In-memory chain doubles for unit tests

use alloy_primitives::{address, Address, B256, U256};
use eyre::eyre;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::chain::{
    LimitKind, LtvFigure, PreviewKind, ReadFuture, TxHandle, VaultAddresses, VaultReads,
    VaultTokens, VaultWrites, WriteCall,
};

pub const VAULT: Address = address!("1111111111111111111111111111111111111111");
pub const USER: Address = address!("2222222222222222222222222222222222222222");
pub const BORROW: Address = address!("3333333333333333333333333333333333333333");
pub const COLLATERAL: Address = address!("4444444444444444444444444444444444444444");

/// `whole.thousandths` of an 18-decimal token in base units
pub fn ether(whole: u64, thousandths: u64) -> u128 {
    whole as u128 * 1_000_000_000_000_000_000 + thousandths as u128 * 1_000_000_000_000_000
}

#[derive(Default)]
struct ReaderState {
    native: HashMap<Address, U256>,
    tokens: HashMap<(Address, Address), U256>,
    failing_tokens: HashSet<Address>,
    allowances: HashMap<(Address, Address, Address), U256>,
    vault_tokens: Option<VaultTokens>,
    limits: HashMap<LimitKind, U256>,
    failing_limits: HashSet<LimitKind>,
    /// numerator / denominator applied to the previewed amount
    preview_rates: HashMap<PreviewKind, (u64, u64)>,
    failing_previews: HashSet<PreviewKind>,
    ltv: HashMap<LtvFigure, U256>,
}

pub struct MockReader {
    addresses: VaultAddresses,
    state: Mutex<ReaderState>,
}

impl Default for MockReader {
    fn default() -> Self {
        Self {
            addresses: VaultAddresses { vault: VAULT, ..Default::default() },
            state: Mutex::new(ReaderState::default()),
        }
    }
}

impl MockReader {
    fn with(self, f: impl FnOnce(&mut ReaderState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_native(self, owner: Address, amount: u128) -> Self {
        let amount = U256::from(amount);
        self.with(|s| {
            s.native.insert(owner, amount);
        })
    }

    pub fn with_token(self, token: Address, owner: Address, amount: u128) -> Self {
        let amount = U256::from(amount);
        self.with(|s| {
            s.tokens.insert((token, owner), amount);
        })
    }

    pub fn failing_token(self, token: Address) -> Self {
        self.with(|s| {
            s.failing_tokens.insert(token);
        })
    }

    pub fn with_vault_tokens(self) -> Self {
        self.with(|s| s.vault_tokens = Some(VaultTokens { borrow: BORROW, collateral: COLLATERAL }))
    }

    pub fn with_limit(self, kind: LimitKind, amount: u128) -> Self {
        let amount = U256::from(amount);
        self.with(|s| {
            s.limits.insert(kind, amount);
        })
    }

    pub fn failing_limit(self, kind: LimitKind) -> Self {
        self.with(|s| {
            s.failing_limits.insert(kind);
        })
    }

    pub fn with_preview_rate(self, kind: PreviewKind, numerator: u64, denominator: u64) -> Self {
        self.with(|s| {
            s.preview_rates.insert(kind, (numerator, denominator));
        })
    }

    pub fn failing_preview(self, kind: PreviewKind) -> Self {
        self.with(|s| {
            s.failing_previews.insert(kind);
        })
    }

    pub fn with_ltv(self, figure: LtvFigure, value: u128) -> Self {
        let value = U256::from(value);
        self.with(|s| {
            s.ltv.insert(figure, value);
        })
    }

    pub fn set_token(&self, token: Address, owner: Address, amount: u128) {
        self.state.lock().unwrap().tokens.insert((token, owner), U256::from(amount));
    }

    pub fn add_token(&self, token: Address, owner: Address, amount: U256) {
        let mut state = self.state.lock().unwrap();
        let entry = state.tokens.entry((token, owner)).or_default();
        *entry += amount;
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.state.lock().unwrap().allowances.insert((token, owner, spender), amount);
    }

    pub fn fail_token(&self, token: Address) {
        self.state.lock().unwrap().failing_tokens.insert(token);
    }

    pub fn token(&self, token: Address, owner: Address) -> U256 {
        self.state.lock().unwrap().tokens.get(&(token, owner)).copied().unwrap_or_default()
    }

    fn ready<T: Send + 'static>(value: eyre::Result<T>) -> ReadFuture<'static, T> {
        futures::future::ready(value).boxed()
    }
}

impl VaultReads for MockReader {
    fn addresses(&self) -> &VaultAddresses {
        &self.addresses
    }

    fn native_balance(&self, owner: Address) -> ReadFuture<'_, U256> {
        let state = self.state.lock().unwrap();
        Self::ready(Ok(state.native.get(&owner).copied().unwrap_or_default()))
    }

    fn token_balance(&self, token: Address, owner: Address) -> ReadFuture<'_, U256> {
        let state = self.state.lock().unwrap();
        if state.failing_tokens.contains(&token) {
            return Self::ready(Err(eyre!("balanceOf on {} reverted", token)));
        }
        Self::ready(Ok(state.tokens.get(&(token, owner)).copied().unwrap_or_default()))
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> ReadFuture<'_, U256> {
        let state = self.state.lock().unwrap();
        Self::ready(Ok(state
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()))
    }

    fn decimals(&self, _token: Address) -> ReadFuture<'_, u8> {
        Self::ready(Ok(18))
    }

    fn symbol(&self, token: Address) -> ReadFuture<'_, String> {
        let symbol = if token == VAULT {
            "LTV"
        } else if token == BORROW {
            "WETH"
        } else if token == COLLATERAL {
            "COLL"
        } else {
            "???"
        };
        Self::ready(Ok(symbol.to_string()))
    }

    fn vault_tokens(&self) -> ReadFuture<'_, VaultTokens> {
        let state = self.state.lock().unwrap();
        Self::ready(state.vault_tokens.ok_or_else(|| eyre!("asset() reverted")))
    }

    fn limit(&self, kind: LimitKind, _account: Address) -> ReadFuture<'_, U256> {
        let state = self.state.lock().unwrap();
        if state.failing_limits.contains(&kind) {
            return Self::ready(Err(eyre!("{:?} reverted", kind)));
        }
        Self::ready(Ok(state.limits.get(&kind).copied().unwrap_or_default()))
    }

    fn preview(&self, kind: PreviewKind, amount: U256) -> ReadFuture<'_, U256> {
        let state = self.state.lock().unwrap();
        if state.failing_previews.contains(&kind) {
            return Self::ready(Err(eyre!("{:?} reverted", kind)));
        }
        let (num, den) = state.preview_rates.get(&kind).copied().unwrap_or((1, 1));
        Self::ready(Ok(amount * U256::from(num) / U256::from(den)))
    }

    fn ltv_figure(&self, figure: LtvFigure) -> ReadFuture<'_, U256> {
        let state = self.state.lock().unwrap();
        Self::ready(Ok(state.ltv.get(&figure).copied().unwrap_or_default()))
    }
}

// ============================================
// WRITER
// ============================================

/// Records submitted calls; wraps and approvals update the shared reader
pub struct MockWriter {
    account: Address,
    reader: Arc<MockReader>,
    submitted: Mutex<Vec<WriteCall>>,
    failures: Mutex<HashMap<&'static str, String>>,
    credit_wraps: AtomicBool,
}

impl MockWriter {
    pub fn new(reader: Arc<MockReader>) -> Self {
        Self {
            account: USER,
            reader,
            submitted: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            credit_wraps: AtomicBool::new(true),
        }
    }

    /// Make every call with this label fail with `message`
    pub fn fail(self, label: &'static str, message: &str) -> Self {
        self.failures.lock().unwrap().insert(label, message.to_string());
        self
    }

    pub fn submitted(&self) -> Vec<WriteCall> {
        self.submitted.lock().unwrap().clone()
    }

    /// Wraps succeed on chain but never credit the wrapped token
    pub fn ignore_wraps(self) -> Self {
        self.credit_wraps.store(false, Ordering::SeqCst);
        self
    }
}

impl VaultWrites for MockWriter {
    fn account(&self) -> Address {
        self.account
    }

    fn submit(&self, call: WriteCall) -> BoxFuture<'_, eyre::Result<TxHandle>> {
        let failure = self.failures.lock().unwrap().get(call.label()).cloned();
        if let Some(message) = failure {
            return futures::future::ready(Err(eyre!(message))).boxed();
        }

        let credit = self.credit_wraps.load(Ordering::SeqCst);
        match call {
            WriteCall::WrapNative { token, amount } if credit => {
                self.reader.add_token(token, self.account, amount)
            }
            WriteCall::Approve { token, spender, amount } => {
                self.reader.set_allowance(token, self.account, spender, amount)
            }
            _ => {}
        }

        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(call);
        let hash = B256::with_last_byte(submitted.len() as u8);
        let handle = TxHandle::new(hash, futures::future::ready(Ok(())).boxed());
        futures::future::ready(Ok(handle)).boxed()
    }
}
