//! Poll Task - serial refresh loop with adaptive delay
//!
//! One task owns one refresh chain: invoke, await, adjust the delay,
//! sleep, repeat. A new invocation never starts before the previous one
//! resolved. Every invocation gets a `Liveness` token so work finishing
//! after the task was disabled can be thrown away instead of published.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::backoff::{Backoff, BackoffPolicy};

pub type RefreshFuture = BoxFuture<'static, eyre::Result<()>>;

/// Refresh callback. Errors only slow the loop down.
pub type RefreshFn = Arc<dyn Fn(Liveness) -> RefreshFuture + Send + Sync>;

/// Wrap a closure as a `RefreshFn`
pub fn refresh_fn<F>(f: F) -> RefreshFn
where
    F: Fn(Liveness) -> RefreshFuture + Send + Sync + 'static,
{
    Arc::new(f)
}

// ============================================
// LIVENESS
// ============================================

#[derive(Debug, Default)]
struct LivenessInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation flag shared between a poll loop and its invocations
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    inner: Arc<LivenessInner>,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ============================================
// POLL TASK
// ============================================

struct Running {
    liveness: Liveness,
    handle: JoinHandle<()>,
}

pub struct PollTask {
    name: &'static str,
    policy: BackoffPolicy,
    refresh: Arc<RwLock<RefreshFn>>,
    running: Option<Running>,
}

impl PollTask {
    /// Create a disabled task
    pub fn new(name: &'static str, policy: BackoffPolicy, refresh: RefreshFn) -> Self {
        Self {
            name,
            policy,
            refresh: Arc::new(RwLock::new(refresh)),
            running: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.running.is_some()
    }

    /// Replace the refresh callback; the next invocation picks it up
    pub async fn set_refresh(&self, refresh: RefreshFn) {
        *self.refresh.write().await = refresh;
    }

    /// Enable or disable the loop.
    ///
    /// Enabling an already running task is a no-op. Re-enabling after a
    /// disable starts a fresh chain at the initial delay.
    pub fn set_enabled(&mut self, enabled: bool) {
        match (enabled, self.is_enabled()) {
            (true, false) => self.start(),
            (false, true) => self.stop(),
            _ => {}
        }
    }

    fn start(&mut self) {
        let liveness = Liveness::new();
        let handle = tokio::spawn(run_loop(
            self.name,
            self.policy,
            self.refresh.clone(),
            liveness.clone(),
        ));
        debug!("🔁 Poll task '{}' enabled", self.name);
        self.running = Some(Running { liveness, handle });
    }

    /// Cancel the pending call. An in-flight refresh runs to completion
    /// but sees a cancelled `Liveness`.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.liveness.cancel();
            // the loop exits on its own; the handle is detached
            drop(running.handle);
            debug!("⏹ Poll task '{}' disabled", self.name);
        }
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    name: &'static str,
    policy: BackoffPolicy,
    refresh: Arc<RwLock<RefreshFn>>,
    liveness: Liveness,
) {
    let mut backoff = Backoff::new(policy);

    loop {
        if liveness.is_cancelled() {
            break;
        }

        let current = refresh.read().await.clone();
        // a panicking refresh counts as a failure; the chain keeps going
        let outcome = match AssertUnwindSafe(current(liveness.clone())).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                warn!("Poll '{}' refresh panicked", name);
                Err(eyre::eyre!("refresh panicked"))
            }
        };
        match outcome {
            Ok(()) => {
                let delay = backoff.on_success();
                trace!("Poll '{}' refreshed, next in {:?}", name, delay);
            }
            Err(e) => {
                let delay = backoff.on_failure();
                debug!(
                    "Poll '{}' failed ({} in a row), next in {:?}: {}",
                    name,
                    backoff.consecutive_failures(),
                    delay,
                    e
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff.delay()) => {}
            _ = liveness.cancelled() => break,
        }
    }

    trace!("Poll '{}' loop exited", name);
}

// ============================================
// TESTS
// ============================================
