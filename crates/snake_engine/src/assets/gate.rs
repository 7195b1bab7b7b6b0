use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::sync;

/// One-shot latch: once released it stays released and every waiter, past
/// and future, returns immediately.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    released: Mutex<bool>,
    signal: Condvar,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self) {
        let mut released = sync::lock(&self.released, "gate_release");
        *released = true;
        self.signal.notify_all();
    }

    pub fn is_released(&self) -> bool {
        *sync::lock(&self.released, "gate_read")
    }

    pub fn wait(&self) {
        let released = sync::lock(&self.released, "gate_wait");
        let _released = sync::wait_while(&self.signal, released, "gate_wait", |released| {
            !*released
        });
    }

    /// Returns `true` if the gate opened before `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let released = sync::lock(&self.released, "gate_wait");
        let (released, _) = sync::wait_timeout_while(
            &self.signal,
            released,
            timeout,
            "gate_wait",
            |released| !*released,
        );
        *released
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn release_wakes_every_waiter() {
        let gate = Arc::new(ReadinessGate::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || gate.wait_timeout(Duration::from_secs(5)))
            })
            .collect();

        gate.release();

        for waiter in waiters {
            assert!(waiter.join().expect("waiter thread"));
        }
    }

    #[test]
    fn wait_after_release_returns_immediately() {
        let gate = ReadinessGate::new();
        gate.release();
        gate.release();

        gate.wait();
        assert!(gate.is_released());
        assert!(gate.wait_timeout(Duration::ZERO));
    }

    #[test]
    fn unreleased_gate_times_out() {
        let gate = ReadinessGate::new();

        assert!(!gate.wait_timeout(Duration::from_millis(10)));
    }
}
