//! Software timer pool driven by the 1 ms tick event.
//!
//! A fixed pool of countdown timers, decremented once per tick delivery and
//! fired from task context — expiry callbacks never run in the ISR. Timers
//! are identified two ways:
//!
//! - a [`TimerId`] handle (1-based; 0 is reserved invalid) returned by
//!   [`TimerPool::set`], used to cancel or query a specific arm, and
//! - a [`TimerHandler`] tag naming *what the timer does*. Arming a handler
//!   that already has a live timer re-arms the existing slot and returns the
//!   same handle, so callers can blindly call `set` on every state change
//!   without leaking slots.
//!
//! Expiry is split into two phases so re-entrant arming works: `advance`
//! collects expired slots, the owner dispatches each handler (which may set
//! or re-arm timers, including this one), and `settle` then decides whether
//! the slot reloads, stays armed, or frees — a handler that re-armed its own
//! timer during dispatch must not have that fresh arm consumed.

use heapless::Vec;
use log::{trace, warn};

use crate::bus::EventBus;
use crate::error::{Error, FaultCode, Result};

/// Number of pool slots.
pub const MAX_TIMERS: usize = 8;

/// Timer handle. `INVALID` (0) never names a live timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(pub u8);

impl TimerId {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// What an armed timer does when it fires. This is the dedup identity:
/// one live timer per distinct handler value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerHandler {
    /// Advance the idle-stage chain (ACTIVE → DEFAULT → DOZING → shutdown).
    IdleStage,
    /// Send the next telemetry poll to the motor controller.
    VescPoll,
    /// An externally supplied handler, tagged by the observer's own id.
    Observer(u8),
}

/// What `settle` did with an expired slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryAction {
    /// The handler re-armed the timer during dispatch; the new arm stands.
    Rearmed,
    /// A repeating timer was reloaded with its interval.
    Reloaded,
    /// A one-shot timer was freed.
    Freed,
}

#[derive(Debug, Clone, Copy)]
struct TimerSlot {
    handler: TimerHandler,
    /// Remaining ticks; 0 only transiently, between expiry and settle.
    counter: u32,
    /// Reload interval for repeating timers.
    interval: u32,
    repeating: bool,
}

/// One expired timer, as reported by [`TimerPool::advance`].
#[derive(Debug, Clone, Copy)]
pub struct Expiry {
    pub id: TimerId,
    pub handler: TimerHandler,
}

/// Fixed-capacity pool of software timers.
#[derive(Debug)]
pub struct TimerPool {
    slots: [Option<TimerSlot>; MAX_TIMERS],
}

impl TimerPool {
    pub fn new() -> Self {
        Self {
            slots: [None; MAX_TIMERS],
        }
    }

    /// Arm a timer for `handler`, firing after `timeout_ticks`.
    ///
    /// If a live timer already exists for this exact handler value, that
    /// slot is re-armed in place and its existing handle returned. A zero
    /// timeout is rejected — it would fire on the very next tick regardless
    /// of intent and reads like a caller bug.
    pub fn set(
        &mut self,
        handler: TimerHandler,
        timeout_ticks: u32,
        repeating: bool,
    ) -> Result<TimerId> {
        if timeout_ticks == 0 {
            return Err(Error::InvalidArgument("zero timer timeout"));
        }

        // Re-arm an existing timer for the same handler.
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(s) = slot {
                if s.handler == handler {
                    s.counter = timeout_ticks;
                    s.interval = timeout_ticks;
                    s.repeating = repeating;
                    trace!("timer {} re-armed: {:?} {}ms", i + 1, handler, timeout_ticks);
                    return Ok(TimerId(i as u8 + 1));
                }
            }
        }

        let free = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::TimerPoolFull)?;
        self.slots[free] = Some(TimerSlot {
            handler,
            counter: timeout_ticks,
            interval: timeout_ticks,
            repeating,
        });
        trace!("timer {} armed: {:?} {}ms", free + 1, handler, timeout_ticks);
        Ok(TimerId(free as u8 + 1))
    }

    /// Arm a timer, escalating pool exhaustion as an Overflow fault on the
    /// bus. Returns the invalid handle on any failure, so callers can treat
    /// "this periodic behavior did not start" uniformly.
    pub fn set_or_fault<H: Copy + Eq>(
        &mut self,
        bus: &mut EventBus<H>,
        handler: TimerHandler,
        timeout_ticks: u32,
        repeating: bool,
    ) -> TimerId {
        match self.set(handler, timeout_ticks, repeating) {
            Ok(id) => id,
            Err(Error::TimerPoolFull) => {
                bus.fault(FaultCode::Overflow);
                TimerId::INVALID
            }
            Err(e) => {
                warn!("timer arm rejected: {e}");
                TimerId::INVALID
            }
        }
    }

    /// Cancel a timer. Safe to call with a dead handle: the pool is left
    /// untouched and the caller is told the handle named no live timer.
    pub fn cancel(&mut self, id: TimerId) -> Result<()> {
        match self.slot_mut(id) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(Error::InvalidHandle),
        }
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.slot(id).is_some()
    }

    pub fn is_repeating(&self, id: TimerId) -> bool {
        self.slot(id).is_some_and(|s| s.repeating)
    }

    /// Remaining ticks, or `None` for a dead handle.
    pub fn remaining(&self, id: TimerId) -> Option<u32> {
        self.slot(id).map(|s| s.counter)
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Decrement every live timer by one tick and collect the ones that hit
    /// zero. The caller dispatches each expiry's handler, then calls
    /// [`Self::settle`] with the id.
    pub fn advance(&mut self) -> Vec<Expiry, MAX_TIMERS> {
        let mut expired = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(s) = slot {
                if s.counter > 0 {
                    s.counter -= 1;
                }
                if s.counter == 0 {
                    // Capacity equals the pool size; push cannot fail.
                    let _ = expired.push(Expiry {
                        id: TimerId(i as u8 + 1),
                        handler: s.handler,
                    });
                }
            }
        }
        expired
    }

    /// Resolve an expired slot after its handler ran.
    ///
    /// A non-zero counter means the handler re-armed during dispatch and the
    /// new arm stands untouched. Otherwise a repeating timer reloads its
    /// interval and a one-shot frees. Dead handles report `Freed` — the
    /// handler may have cancelled its own timer.
    pub fn settle(&mut self, id: TimerId) -> ExpiryAction {
        let Some(idx) = self.index(id) else {
            return ExpiryAction::Freed;
        };
        let Some(slot) = self.slots[idx].as_mut() else {
            return ExpiryAction::Freed;
        };
        if slot.counter != 0 {
            return ExpiryAction::Rearmed;
        }
        if slot.repeating {
            slot.counter = slot.interval;
            ExpiryAction::Reloaded
        } else {
            self.slots[idx] = None;
            ExpiryAction::Freed
        }
    }

    fn index(&self, id: TimerId) -> Option<usize> {
        if !id.is_valid() || id.0 as usize > MAX_TIMERS {
            return None;
        }
        Some(id.0 as usize - 1)
    }

    fn slot(&self, id: TimerId) -> Option<&TimerSlot> {
        self.index(id).and_then(|i| self.slots[i].as_ref())
    }

    fn slot_mut(&mut self, id: TimerId) -> Option<&mut Option<TimerSlot>> {
        self.index(id).map(|i| &mut self.slots[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(pool: &mut TimerPool, ticks: u32) -> std::vec::Vec<Expiry> {
        let mut fired = std::vec::Vec::new();
        for _ in 0..ticks {
            for e in pool.advance() {
                fired.push(e);
                pool.settle(e.id);
            }
        }
        fired
    }

    #[test]
    fn one_shot_fires_once_then_frees() {
        let mut pool = TimerPool::new();
        let id = pool.set(TimerHandler::IdleStage, 3, false).unwrap();
        assert!(pool.is_active(id));
        let fired = drain(&mut pool, 10);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].handler, TimerHandler::IdleStage);
        assert!(!pool.is_active(id));
    }

    #[test]
    fn repeating_timer_reloads() {
        let mut pool = TimerPool::new();
        let id = pool.set(TimerHandler::VescPoll, 4, true).unwrap();
        let fired = drain(&mut pool, 12);
        assert_eq!(fired.len(), 3);
        assert!(pool.is_active(id));
        assert!(pool.is_repeating(id));
    }

    #[test]
    fn rearming_same_handler_reuses_slot() {
        let mut pool = TimerPool::new();
        let a = pool.set(TimerHandler::IdleStage, 100, false).unwrap();
        let b = pool.set(TimerHandler::IdleStage, 5, false).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.remaining(a), Some(5));
    }

    #[test]
    fn distinct_handlers_get_distinct_slots() {
        let mut pool = TimerPool::new();
        let a = pool.set(TimerHandler::Observer(1), 10, false).unwrap();
        let b = pool.set(TimerHandler::Observer(2), 10, false).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut pool = TimerPool::new();
        assert!(pool.set(TimerHandler::IdleStage, 0, false).is_err());
    }

    #[test]
    fn pool_exhaustion_reported() {
        let mut pool = TimerPool::new();
        for i in 0..MAX_TIMERS as u8 {
            pool.set(TimerHandler::Observer(i), 10, false).unwrap();
        }
        assert_eq!(
            pool.set(TimerHandler::Observer(200), 10, false),
            Err(Error::TimerPoolFull)
        );
        // Re-arming an existing handler still works on a full pool.
        assert!(pool.set(TimerHandler::Observer(0), 20, false).is_ok());
    }

    #[test]
    fn cancel_reports_dead_handles() {
        let mut pool = TimerPool::new();
        let id = pool.set(TimerHandler::IdleStage, 10, false).unwrap();
        assert_eq!(pool.cancel(id), Ok(()));
        assert_eq!(pool.cancel(id), Err(Error::InvalidHandle));
        assert_eq!(pool.cancel(TimerId::INVALID), Err(Error::InvalidHandle));
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn exhausted_pool_raises_overflow_fault() {
        use crate::bus::EventBus;
        use crate::events::{EventKind, EventPayload};

        let mut pool = TimerPool::new();
        let mut bus: EventBus<u8> = EventBus::new();
        for i in 0..MAX_TIMERS as u8 {
            pool.set(TimerHandler::Observer(i), 10, false).unwrap();
        }
        let id = pool.set_or_fault(&mut bus, TimerHandler::Observer(200), 10, false);
        assert_eq!(id, TimerId::INVALID);
        let ev = bus.pop().expect("exhaustion must enqueue a fault event");
        assert_eq!(ev.kind, EventKind::EmergencyFault);
        assert_eq!(ev.payload, EventPayload::Fault(FaultCode::Overflow));
        // A bad argument is the caller's bug, not an emergency.
        let id = pool.set_or_fault(&mut bus, TimerHandler::IdleStage, 0, false);
        assert_eq!(id, TimerId::INVALID);
        assert!(bus.pop().is_none());
    }

    #[test]
    fn rearm_during_dispatch_is_not_consumed() {
        let mut pool = TimerPool::new();
        let id = pool.set(TimerHandler::IdleStage, 1, false).unwrap();
        let expired = pool.advance();
        assert_eq!(expired.len(), 1);
        // Handler re-arms its own timer mid-dispatch.
        let id2 = pool.set(TimerHandler::IdleStage, 7, false).unwrap();
        assert_eq!(id, id2);
        assert_eq!(pool.settle(id), ExpiryAction::Rearmed);
        assert_eq!(pool.remaining(id), Some(7));
        // The fresh arm then runs its full course.
        let fired = drain(&mut pool, 7);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn cancel_during_dispatch_settles_freed() {
        let mut pool = TimerPool::new();
        let id = pool.set(TimerHandler::VescPoll, 1, true).unwrap();
        let expired = pool.advance();
        assert_eq!(expired.len(), 1);
        pool.cancel(id).unwrap();
        assert_eq!(pool.settle(id), ExpiryAction::Freed);
        assert!(!pool.is_active(id));
    }

    #[test]
    fn remaining_counts_down() {
        let mut pool = TimerPool::new();
        let id = pool.set(TimerHandler::IdleStage, 5, false).unwrap();
        assert_eq!(pool.remaining(id), Some(5));
        for e in pool.advance() {
            pool.settle(e.id);
        }
        assert_eq!(pool.remaining(id), Some(4));
    }
}
