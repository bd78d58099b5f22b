//! Process-wide drain serializer.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Gate allowing a single drain pass at a time.
///
/// Waiters queue in FIFO order. There is no timeout: a pass that never
/// finishes holds the gate forever.
#[derive(Clone, Default)]
pub struct DrainGate {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of one pass; the gate is released on drop.
pub struct DrainPermit {
    _guard: OwnedMutexGuard<()>,
}

impl DrainGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other pass is running, then hold the gate.
    pub async fn acquire(&self) -> DrainPermit {
        if self.is_held() {
            debug!("drain_gate_waiting");
        }
        let guard = Arc::clone(&self.inner).lock_owned().await;
        DrainPermit { _guard: guard }
    }

    /// Whether a pass currently holds the gate.
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_release_on_drop() {
        let gate = DrainGate::new();

        let permit = gate.acquire().await;
        assert!(gate.is_held());

        drop(permit);
        assert!(!gate.is_held());
    }

    #[tokio::test]
    async fn test_second_acquire_waits() {
        let gate = DrainGate::new();
        let permit = gate.acquire().await;

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_release_after_panic() {
        let gate = DrainGate::new();

        let task = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire().await;
                panic!("drain blew up");
            })
        };
        assert!(task.await.is_err());

        assert!(!gate.is_held());
    }
}
