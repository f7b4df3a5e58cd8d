//! # Shutdown Coordination
//!
//! [`CancellationSignal`] is the single cancellation value threaded through
//! every suspension point of the engine. [`ShutdownCoordinator`] owns it and
//! moves the engine through `Running → ShutdownRequested → Draining → Stopped`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct SignalInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cloneable, level-triggered cancellation flag.
///
/// Once cancelled it stays cancelled; every clone observes the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<SignalInner>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is cancelled (immediately if it already is)
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration` unless cancelled first.
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
            _ = self.cancelled() => false,
        }
    }

    /// Run `future` to completion unless cancelled first
    pub async fn run_until_cancelled<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}

/// Engine lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShutdownState {
    /// Passes are being scheduled
    Running = 0,
    /// Stop requested; the in-flight observer is being cancelled
    ShutdownRequested = 1,
    /// Waiting (bounded) for the in-flight observer to unwind
    Draining = 2,
    /// Reports flushed; no further invocations
    Stopped = 3,
}

impl From<u8> for ShutdownState {
    fn from(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::ShutdownRequested,
            2 => ShutdownState::Draining,
            _ => ShutdownState::Stopped,
        }
    }
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownState::Running => "running",
            ShutdownState::ShutdownRequested => "shutdown_requested",
            ShutdownState::Draining => "draining",
            ShutdownState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Owns the cancellation signal and the monotonic lifecycle state
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    state: AtomicU8,
    signal: CancellationSignal,
    stopped: Notify,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn signal(&self) -> CancellationSignal {
        self.signal.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Observers may only be invoked while running
    pub fn invocation_permitted(&self) -> bool {
        self.is_running() && !self.signal.is_cancelled()
    }

    /// Request a stop. Returns `true` only for the call that moved the engine
    /// out of `Running`.
    pub fn request_shutdown(&self, reason: &str) -> bool {
        let moved = self.advance(ShutdownState::ShutdownRequested);
        self.signal.cancel();
        if moved {
            info!(reason = %reason, "🛑 SHUTDOWN: Shutdown requested");
        } else {
            debug!(reason = %reason, state = %self.state(), "Shutdown already in progress");
        }
        moved
    }

    pub fn begin_draining(&self) {
        self.signal.cancel();
        if self.advance(ShutdownState::Draining) {
            debug!("🛑 SHUTDOWN: Draining in-flight work");
        }
    }

    pub fn mark_stopped(&self) {
        self.signal.cancel();
        if self.advance(ShutdownState::Stopped) {
            info!("🛑 SHUTDOWN: Stopped");
        }
        self.stopped.notify_waiters();
    }

    /// Resolves once the engine reaches `Stopped`
    pub async fn wait_for_stopped(&self) {
        loop {
            let notified = self.stopped.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state() == ShutdownState::Stopped {
                return;
            }
            notified.await;
        }
    }

    /// Move forward to `target`; never backwards. Returns whether the state changed.
    fn advance(&self, target: ShutdownState) -> bool {
        let previous = self.state.fetch_max(target as u8, Ordering::SeqCst);
        previous < target as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, assert_ready_eq, task};

    #[tokio::test]
    async fn test_signal_wakes_all_clones() {
        let signal = CancellationSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            waiter.is_cancelled()
        });

        tokio::task::yield_now().await;
        signal.cancel();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let signal = CancellationSignal::new();
        signal.cancel();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_cancel_wakes_a_pending_waiter() {
        let signal = CancellationSignal::new();
        let mut waiter = task::spawn(signal.cancelled());
        assert_pending!(waiter.poll());

        signal.cancel();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[test]
    fn test_run_until_cancelled() {
        let signal = CancellationSignal::new();
        let mut work = task::spawn(signal.run_until_cancelled(std::future::ready(7)));
        assert_ready_eq!(work.poll(), Some(7));

        let mut stuck = task::spawn(signal.run_until_cancelled(std::future::pending::<()>()));
        assert_pending!(stuck.poll());
        signal.cancel();
        assert_ready_eq!(stuck.poll(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_interrupted_by_cancel() {
        let signal = CancellationSignal::new();
        let sleeper = signal.clone();
        let handle = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(30)).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        signal.cancel();
        assert!(!handle.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_cancel() {
        let signal = CancellationSignal::new();
        assert!(signal.sleep(Duration::from_secs(5)).await);
    }

    #[test]
    fn test_state_is_monotonic() {
        let coordinator = ShutdownCoordinator::new();
        assert!(coordinator.invocation_permitted());

        assert!(coordinator.request_shutdown("test"));
        assert!(!coordinator.request_shutdown("again"));
        assert_eq!(coordinator.state(), ShutdownState::ShutdownRequested);
        assert!(!coordinator.invocation_permitted());

        coordinator.begin_draining();
        coordinator.mark_stopped();
        assert_eq!(coordinator.state(), ShutdownState::Stopped);

        coordinator.begin_draining();
        assert!(!coordinator.request_shutdown("late"));
        assert_eq!(coordinator.state(), ShutdownState::Stopped);
    }

    #[test]
    fn test_state_from_u8() {
        assert_eq!(ShutdownState::from(0), ShutdownState::Running);
        assert_eq!(ShutdownState::from(2), ShutdownState::Draining);
        assert_eq!(ShutdownState::from(42), ShutdownState::Stopped);
    }

    #[tokio::test]
    async fn test_wait_for_stopped() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let waiter = Arc::clone(&coordinator);
        let handle = tokio::spawn(async move { waiter.wait_for_stopped().await });

        coordinator.request_shutdown("test");
        coordinator.mark_stopped();
        handle.await.unwrap();
    }
}
