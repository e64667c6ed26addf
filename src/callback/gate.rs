//! Exactly-once completion signal
//!
//! [`CompletionGate`] unblocks the orchestrator when the first successful
//! callback has stored its token.  Only the first [`CompletionGate::fire`]
//! has an effect; every later call is a no-op.  Waiting on a fired gate
//! returns immediately, so a gate can be awaited any number of times.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Single-slot, single-fire event.
///
/// # Examples
///
/// ```
/// use konfigurator::callback::gate::CompletionGate;
///
/// # async fn example() {
/// let gate = CompletionGate::new();
/// assert!(gate.fire());
/// assert!(!gate.fire());
/// gate.wait().await;
/// gate.wait().await;
/// # }
/// ```
#[derive(Debug, Default)]
pub struct CompletionGate {
    fired: AtomicBool,
    notify: Notify,
}

impl CompletionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the gate.
    ///
    /// Returns `true` only for the call that actually fired it.
    pub fn fire(&self) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.notify.notify_waiters();
            true
        } else {
            false
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Waits until the gate has fired.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before checking the flag so a concurrent fire is not lost
            notified.as_mut().enable();

            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }

    /// Waits at most `timeout` for the gate to fire.
    ///
    /// Returns `true` if the gate fired.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_only_first_fire_takes_effect() {
        let gate = CompletionGate::new();
        assert!(!gate.is_fired());
        assert!(gate.fire());
        assert!(!gate.fire());
        assert!(gate.is_fired());
    }

    #[tokio::test]
    async fn test_wait_returns_after_fire_from_other_task() {
        let gate = Arc::new(CompletionGate::new());
        let firing = Arc::clone(&gate);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            firing.fire();
        });

        assert!(gate.wait_timeout(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_wait_on_fired_gate_returns_immediately_twice() {
        let gate = CompletionGate::new();
        gate.fire();
        assert!(gate.wait_timeout(Duration::from_millis(50)).await);
        assert!(gate.wait_timeout(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_unfired_gate_times_out() {
        let gate = CompletionGate::new();
        assert!(!gate.wait_timeout(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_racing_fires_report_single_winner() {
        let gate = Arc::new(CompletionGate::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.fire() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_multiple_waiters_all_wake() {
        let gate = Arc::new(CompletionGate::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.fire();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(2), waiter)
                .await
                .expect("waiter should wake")
                .unwrap();
        }
    }
}
