//! Single-slot admission control for a data channel.
//!
//! Analysis calls take seconds, and scene state goes stale quickly, so the
//! channel never queues work: while one analysis is in flight, every other
//! payload is dropped on arrival. Each data channel owns its own gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-channel "analysis in flight" flag.
///
/// Cloning shares the same flag; create a fresh gate per channel.
#[derive(Debug, Clone, Default)]
pub struct AdmissionGate {
    busy: Arc<AtomicBool>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot if it is free.
    ///
    /// Returns `None` immediately, with no side effect, when an analysis is
    /// already in flight. The slot is released when the returned permit is
    /// dropped or [`AdmissionPermit::leave`] is called.
    pub fn try_enter(&self) -> Option<AdmissionPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| AdmissionPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof that the holder owns the channel's single analysis slot.
#[derive(Debug)]
#[must_use = "dropping the permit immediately releases the gate"]
pub struct AdmissionPermit {
    busy: Arc<AtomicBool>,
}

impl AdmissionPermit {
    /// Release the slot explicitly. Equivalent to dropping the permit.
    pub fn leave(self) {}
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_enter_is_refused_until_leave() {
        let gate = AdmissionGate::new();
        let permit = gate.try_enter().expect("first enter");
        assert!(gate.is_busy());
        assert!(gate.try_enter().is_none());
        assert!(gate.try_enter().is_none());

        permit.leave();
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_some());
    }

    #[test]
    fn drop_releases_the_slot() {
        let gate = AdmissionGate::new();
        {
            let _permit = gate.try_enter().expect("enter");
            assert!(gate.is_busy());
        }
        assert!(!gate.is_busy());
    }

    #[test]
    fn gates_are_independent_per_channel() {
        let a = AdmissionGate::new();
        let b = AdmissionGate::new();
        let _held = a.try_enter().expect("enter a");
        assert!(b.try_enter().is_some());
    }

    #[tokio::test]
    async fn panicking_holder_still_releases() {
        let gate = AdmissionGate::new();
        let permit = gate.try_enter().expect("enter");
        let handle = tokio::spawn(async move {
            let _permit = permit;
            panic!("analysis blew up");
        });
        assert!(handle.await.is_err());
        assert!(!gate.is_busy());
    }

    #[test]
    fn only_one_thread_wins_a_race() {
        let gate = AdmissionGate::new();
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    // Hold on to the permit so losers cannot re-enter after release.
                    gate.try_enter().map(std::mem::forget).is_some()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
