//! Guard/lifecycle state machine for a page held in cache (spec §4.4
//! "Guard lifecycle & eviction"). Grounded on
//! `buffer::page_cache::FrameGuard`'s RAII pin-on-construct,
//! unpin-on-`Drop` pattern and `BufferFrame`'s packed `AtomicU32`/
//! `AtomicBool` state fields, generalized here into one CAS-updated packed
//! `AtomicU64` carrying guard count, lifecycle phase, and the advisory HOT
//! bit together so every transition is a single atomic operation.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{PageError, Result};

const COUNT_MASK: u64 = 0xFFFF_FFFF;
const PHASE_SHIFT: u32 = 32;
const PHASE_MASK: u64 = 0b11 << PHASE_SHIFT;
const HOT_BIT: u64 = 1 << 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
enum Phase {
    Alive = 0,
    Orphaned = 1,
    Closed = 2,
}

impl Phase {
    fn from_bits(bits: u64) -> Phase {
        match (bits & PHASE_MASK) >> PHASE_SHIFT {
            0 => Phase::Alive,
            1 => Phase::Orphaned,
            _ => Phase::Closed,
        }
    }

    fn pack(self, rest: u64) -> u64 {
        (rest & !PHASE_MASK) | ((self as u64) << PHASE_SHIFT)
    }
}

/// Observable lifecycle state of a page (spec §4.4): unguarded/guarded are
/// derived from the guard count rather than tracked as a distinct phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    AliveUnguarded,
    AliveGuarded,
    Orphaned,
    Closed,
}

/// Packed guard-count + lifecycle-phase + advisory HOT bit, CAS-updated as
/// one unit.
#[derive(Debug)]
pub struct GuardState {
    packed: AtomicU64,
}

impl Default for GuardState {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardState {
    pub fn new() -> Self {
        Self {
            packed: AtomicU64::new(Phase::Alive.pack(0)),
        }
    }

    fn load(&self) -> u64 {
        self.packed.load(Ordering::Acquire)
    }

    pub fn guard_count(&self) -> u32 {
        (self.load() & COUNT_MASK) as u32
    }

    fn phase(&self) -> Phase {
        Phase::from_bits(self.load())
    }

    pub fn state(&self) -> LifecycleState {
        match self.phase() {
            Phase::Alive if self.guard_count() > 0 => LifecycleState::AliveGuarded,
            Phase::Alive => LifecycleState::AliveUnguarded,
            Phase::Orphaned => LifecycleState::Orphaned,
            Phase::Closed => LifecycleState::Closed,
        }
    }

    /// Sets the advisory HOT bit (second-chance clock access marker). No
    /// memory barrier is required for correctness, so this uses `Relaxed`.
    pub fn mark_hot(&self) {
        self.packed.fetch_or(HOT_BIT, Ordering::Relaxed);
    }

    /// Clears the HOT bit, returning whether it had been set (the clock
    /// sweeper's "second chance" read-and-clear).
    pub fn take_hot(&self) -> bool {
        let prev = self.packed.fetch_and(!HOT_BIT, Ordering::Relaxed);
        prev & HOT_BIT != 0
    }

    /// Acquires a guard, failing if the page is Orphaned or Closed
    /// (spec's `tryAcquireGuard` variant).
    pub fn try_acquire_guard(&self) -> Result<()> {
        let mut current = self.load();
        loop {
            let phase = Phase::from_bits(current);
            if phase != Phase::Alive {
                return Err(PageError::GuardMisuse {
                    reason: format!("cannot acquire a guard while {:?}", phase),
                });
            }
            let count = current & COUNT_MASK;
            let next = phase.pack(count + 1);
            match self.packed.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases a guard. Underflow (releasing below zero) is
    /// [`PageError::GuardMisuse`]. If the count reaches zero while
    /// Orphaned, the page transitions to Closed, and the caller must
    /// release the backing buffer.
    pub fn release_guard(&self) -> Result<LifecycleState> {
        let mut current = self.load();
        loop {
            let count = current & COUNT_MASK;
            if count == 0 {
                return Err(PageError::GuardMisuse {
                    reason: "released a page guard below zero".to_string(),
                });
            }
            let phase = Phase::from_bits(current);
            let new_count = count - 1;
            let new_phase = if phase == Phase::Orphaned && new_count == 0 {
                Phase::Closed
            } else {
                phase
            };
            let next = new_phase.pack(new_count);
            match self.packed.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(match new_phase {
                        Phase::Alive if new_count > 0 => LifecycleState::AliveGuarded,
                        Phase::Alive => LifecycleState::AliveUnguarded,
                        Phase::Orphaned => LifecycleState::Orphaned,
                        Phase::Closed => LifecycleState::Closed,
                    })
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Idempotent: Alive -> Orphaned. No-op if already Orphaned or Closed.
    pub fn mark_orphaned(&self) {
        let mut current = self.load();
        loop {
            let phase = Phase::from_bits(current);
            if phase != Phase::Alive {
                return;
            }
            let next = Phase::Orphaned.pack(current);
            match self.packed.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Closes the page. Idempotent when already Closed; refused while any
    /// guard is held. The caller is responsible for releasing the backing
    /// buffer (or invoking the zero-copy releaser) only when this returns
    /// `Ok(true)` (a fresh transition, not a no-op repeat).
    pub fn close(&self) -> Result<bool> {
        let mut current = self.load();
        loop {
            let phase = Phase::from_bits(current);
            if phase == Phase::Closed {
                return Ok(false);
            }
            let count = current & COUNT_MASK;
            if count > 0 {
                return Err(PageError::GuardMisuse {
                    reason: "cannot close a page with an outstanding guard".to_string(),
                });
            }
            let next = Phase::Closed.pack(current);
            match self.packed.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(true),
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_alive_unguarded() {
        let g = GuardState::new();
        assert_eq!(g.state(), LifecycleState::AliveUnguarded);
    }

    #[test]
    fn guard_then_release_returns_to_unguarded() {
        let g = GuardState::new();
        g.try_acquire_guard().unwrap();
        assert_eq!(g.state(), LifecycleState::AliveGuarded);
        assert_eq!(g.release_guard().unwrap(), LifecycleState::AliveUnguarded);
    }

    #[test]
    fn release_underflow_is_guard_misuse() {
        let g = GuardState::new();
        assert!(g.release_guard().is_err());
    }

    #[test]
    fn orphan_then_release_last_guard_closes() {
        let g = GuardState::new();
        g.try_acquire_guard().unwrap();
        g.mark_orphaned();
        assert_eq!(g.state(), LifecycleState::Orphaned);
        assert_eq!(g.release_guard().unwrap(), LifecycleState::Closed);
    }

    #[test]
    fn cannot_acquire_guard_on_orphaned_or_closed() {
        let g = GuardState::new();
        g.mark_orphaned();
        assert!(g.try_acquire_guard().is_err());

        let g2 = GuardState::new();
        g2.close().unwrap();
        assert!(g2.try_acquire_guard().is_err());
    }

    #[test]
    fn close_refuses_while_guarded() {
        let g = GuardState::new();
        g.try_acquire_guard().unwrap();
        assert!(g.close().is_err());
        g.release_guard().unwrap();
        assert!(g.close().unwrap());
    }

    #[test]
    fn close_is_idempotent() {
        let g = GuardState::new();
        assert!(g.close().unwrap());
        assert!(!g.close().unwrap());
        assert_eq!(g.state(), LifecycleState::Closed);
    }

    #[test]
    fn mark_orphaned_is_idempotent_and_noop_once_closed() {
        let g = GuardState::new();
        g.mark_orphaned();
        g.mark_orphaned();
        assert_eq!(g.state(), LifecycleState::Orphaned);

        let g2 = GuardState::new();
        g2.close().unwrap();
        g2.mark_orphaned();
        assert_eq!(g2.state(), LifecycleState::Closed);
    }

    #[test]
    fn hot_bit_is_set_and_cleared_on_take() {
        let g = GuardState::new();
        assert!(!g.take_hot());
        g.mark_hot();
        assert!(g.take_hot());
        assert!(!g.take_hot());
    }
}
