//! Process-wide in-flight request ceiling.
//!
//! [`ConcurrencyGate::try_enter`] hands out an RAII [`GatePermit`] when the
//! in-flight count is below the configured ceiling. Dropping the permit
//! releases the slot, so release happens exactly once per admission no
//! matter how the request ends (success, error, or cancellation).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Shared counter of in-flight requests with a hard ceiling.
#[derive(Clone)]
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    in_flight: AtomicUsize,
    ceiling: usize,
}

/// RAII guard for one admitted request. Dropping it frees the slot.
pub struct GatePermit {
    inner: Arc<GateInner>,
}

impl ConcurrencyGate {
    pub fn new(ceiling: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                in_flight: AtomicUsize::new(0),
                ceiling,
            }),
        }
    }

    /// Attempts to claim an in-flight slot.
    ///
    /// Returns `None` without side effect when the gate is full. The
    /// check-and-increment is a single atomic compare-exchange, so the
    /// count can never overshoot the ceiling.
    pub fn try_enter(&self) -> Option<GatePermit> {
        let mut current = self.inner.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.inner.ceiling {
                warn!(in_flight = current, ceiling = self.inner.ceiling, "concurrency gate full");
                return None;
            }
            match self.inner.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(GatePermit {
                        inner: self.inner.clone(),
                    })
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Current number of in-flight requests.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_ceiling() {
        let gate = ConcurrencyGate::new(3);
        let p1 = gate.try_enter().unwrap();
        let p2 = gate.try_enter().unwrap();
        let p3 = gate.try_enter().unwrap();
        assert!(gate.try_enter().is_none());
        assert_eq!(gate.in_flight(), 3);
        drop((p1, p2, p3));
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn releasing_one_slot_frees_exactly_one_admission() {
        let gate = ConcurrencyGate::new(2);
        let _a = gate.try_enter().unwrap();
        let b = gate.try_enter().unwrap();
        assert!(gate.try_enter().is_none());
        drop(b);
        let _c = gate.try_enter().unwrap();
        assert!(gate.try_enter().is_none());
    }

    #[test]
    fn permit_released_on_panic_unwind() {
        let gate = ConcurrencyGate::new(1);
        let gate2 = gate.clone();
        let result = std::panic::catch_unwind(move || {
            let _permit = gate2.try_enter().unwrap();
            panic!("work blew up");
        });
        assert!(result.is_err());
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.try_enter().is_some());
    }

    #[test]
    fn failed_try_enter_has_no_side_effect() {
        let gate = ConcurrencyGate::new(1);
        let _p = gate.try_enter().unwrap();
        for _ in 0..5 {
            assert!(gate.try_enter().is_none());
        }
        assert_eq!(gate.in_flight(), 1);
    }
}
