//! Teardown barrier for in-flight work.

use crate::error::Errc;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// One-shot barrier gating in-flight operations during teardown.
///
/// `enter` hands out guards while the gate is open and rejects with
/// shutting_down once closed; `close` waits for every guard to drop.
#[derive(Debug)]
pub(crate) struct DispatchGate {
    state: Mutex<GateState>,
    drained: Notify,
}

#[derive(Debug)]
struct GateState {
    open: bool,
    active: usize,
}

impl DispatchGate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState {
                open: true,
                active: 0,
            }),
            drained: Notify::new(),
        })
    }

    pub(crate) fn enter(self: &Arc<Self>) -> Result<GateGuard, Errc> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(Errc::ShuttingDown);
        }
        state.active += 1;
        Ok(GateGuard {
            gate: Arc::clone(self),
        })
    }

    /// Closes the gate and waits for all outstanding guards to drop.
    /// Idempotent; concurrent closers all wait for the drain.
    pub(crate) async fn close(&self) {
        self.state.lock().unwrap().open = false;
        loop {
            let drained = self.drained.notified();
            if self.state.lock().unwrap().active == 0 {
                return;
            }
            drained.await;
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }
}

/// Tracks one in-flight operation; dropping it releases the gate.
#[derive(Debug)]
pub(crate) struct GateGuard {
    gate: Arc<DispatchGate>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        let remaining = {
            let mut state = self.gate.state.lock().unwrap();
            state.active -= 1;
            state.active
        };
        if remaining == 0 {
            self.gate.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_close_waits_for_guards() {
        let gate = DispatchGate::new();
        let guard = gate.enter().unwrap();

        let closer = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.close().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!closer.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), closer)
            .await
            .expect("close did not complete after drain")
            .unwrap();
    }

    #[tokio::test]
    async fn test_enter_after_close_rejected() {
        let gate = DispatchGate::new();
        gate.close().await;
        assert!(matches!(gate.enter(), Err(Errc::ShuttingDown)));
        assert!(!gate.is_open());
    }

    #[tokio::test]
    async fn test_close_with_no_guards_returns_immediately() {
        let gate = DispatchGate::new();
        tokio::time::timeout(Duration::from_millis(100), gate.close())
            .await
            .unwrap();
    }
}
