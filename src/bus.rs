//! Event bus: bounded queue plus subscriber registry.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ Tick ISR    │────▶│              │     │    Main loop     │
//! │ UART ISR    │────▶│  EventQueue  │────▶│ pop → dispatch   │
//! │ Wakeup ISR  │────▶│ (ring, N−1)  │     │ to subscribers   │
//! │ Subscribers │────▶│              │     │ in order         │
//! └─────────────┘     └──────────────┘     └──────────────────┘
//! ```
//!
//! ## Concurrency contract
//!
//! Exactly one consumer (the main loop) and many producers: ISRs, plus
//! subscriber handlers running synchronously on the consumer's own stack.
//! The only mutual exclusion required is between producer index advances,
//! so [`EventQueue::push`] brackets its read-modify-write in a
//! `critical_section` (interrupt masking on target, a global lock under
//! the host `std` provider). Handlers may push; they must **not** drain —
//! single consumer is a documented constraint, not a lock, which keeps the
//! hot path lock-free.
//!
//! ## Full/empty disambiguation
//!
//! The ring sacrifices one slot: `head == tail` is empty and
//! `next(tail) == head` is full, so at most `CAP − 1` events are ever
//! held and no occupancy flag is needed.

use heapless::Vec;
use log::error;

use crate::error::{Error, FaultCode, Result};
use crate::events::{Event, EventKind, EventPayload};

/// Queue capacity. One slot is reserved, so `CAP - 1` events fit.
pub const EVENT_QUEUE_CAP: usize = 8;

/// Overflow pool size shared by all event kinds, beyond the one built-in
/// head slot each kind owns.
pub const MAX_SUBSCRIPTIONS: usize = 32;

/// Longest possible subscriber chain for a single kind.
pub const MAX_CHAIN: usize = MAX_SUBSCRIPTIONS + 1;

// ───────────────────────────────────────────────────────────────
// Event queue
// ───────────────────────────────────────────────────────────────

/// Fixed-capacity circular event buffer.
#[derive(Debug)]
pub struct EventQueue {
    slots: [Event; EVENT_QUEUE_CAP],
    /// Consumer index — advanced only by `pop`.
    head: usize,
    /// Producer index — advanced only inside the push critical section.
    tail: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            slots: [Event::NULL; EVENT_QUEUE_CAP],
            head: 0,
            tail: 0,
        }
    }

    /// Enqueue one event. Callable from ISR context.
    ///
    /// The slot reservation and copy happen under a critical section; a
    /// full queue returns [`Error::QueueFull`] and leaves the contents
    /// untouched.
    pub fn push(&mut self, event: Event) -> Result<()> {
        critical_section::with(|_| {
            let next_tail = (self.tail + 1) % EVENT_QUEUE_CAP;
            if next_tail == self.head {
                return Err(Error::QueueFull);
            }
            self.slots[self.tail] = event;
            self.tail = next_tail;
            Ok(())
        })
    }

    /// Dequeue the oldest event. Single consumer only.
    pub fn pop(&mut self) -> Option<Event> {
        if self.head == self.tail {
            return None;
        }
        let event = self.slots[self.head];
        self.head = (self.head + 1) % EVENT_QUEUE_CAP;
        Some(event)
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        (self.tail + EVENT_QUEUE_CAP - self.head) % EVENT_QUEUE_CAP
    }

    /// Usable capacity (one ring slot is sacrificed).
    pub fn capacity(&self) -> usize {
        EVENT_QUEUE_CAP - 1
    }
}

// ───────────────────────────────────────────────────────────────
// Subscriber registry
// ───────────────────────────────────────────────────────────────

/// One registry slot: a handler token plus an intrusive link to the next
/// subscriber for the same kind (0 terminates — slot 0 belongs to the
/// reserved `Null` kind and is never a chain target).
#[derive(Debug, Clone, Copy)]
struct SubscriberSlot<H> {
    handler: Option<H>,
    next: usize,
}

/// Mapping from event kind to an *ordered* list of handler tokens.
///
/// The first [`EventKind::COUNT`] slots are the head slot for each kind;
/// the rest form a shared overflow pool. Registration beyond the pool is a
/// static configuration error: it is reported to the caller *and* escalated
/// as a fault by the owning [`EventBus`].
///
/// Handlers are tagged identities (`Copy + Eq`) rather than function
/// pointers, so dispatch and dedup never depend on code addresses.
#[derive(Debug)]
pub struct SubscriberRegistry<H> {
    slots: [SubscriberSlot<H>; EventKind::COUNT + MAX_SUBSCRIPTIONS],
    next_free: usize,
}

impl<H: Copy + Eq> SubscriberRegistry<H> {
    pub fn new() -> Self {
        Self {
            slots: [SubscriberSlot {
                handler: None,
                next: 0,
            }; EventKind::COUNT + MAX_SUBSCRIPTIONS],
            next_free: EventKind::COUNT,
        }
    }

    /// Append `handler` to the subscriber chain for `kind`.
    pub fn subscribe(&mut self, kind: EventKind, handler: H) -> Result<()> {
        if kind == EventKind::Null {
            return Err(Error::InvalidArgument("cannot subscribe to Null"));
        }

        let head = kind as usize;
        if self.slots[head].handler.is_none() {
            self.slots[head].handler = Some(handler);
            self.slots[head].next = 0;
            return Ok(());
        }

        if self.next_free >= self.slots.len() {
            return Err(Error::SubscriberTableFull);
        }

        // Walk to the end of the chain, then link the new slot in.
        let mut idx = head;
        while self.slots[idx].next != 0 {
            idx = self.slots[idx].next;
        }
        let slot = self.next_free;
        self.next_free += 1;
        self.slots[slot].handler = Some(handler);
        self.slots[slot].next = 0;
        self.slots[idx].next = slot;
        Ok(())
    }

    /// Snapshot the subscriber chain for `kind`, in subscription order.
    ///
    /// A snapshot (rather than borrowing iteration) lets the dispatcher
    /// hand each handler mutable access to the bus while walking the list.
    pub fn subscribers_of(&self, kind: EventKind) -> Vec<H, MAX_CHAIN> {
        let mut out = Vec::new();
        if kind == EventKind::Null {
            return out;
        }
        let mut idx = kind as usize;
        loop {
            match self.slots[idx].handler {
                Some(h) => {
                    // Capacity equals the table size; push cannot fail.
                    let _ = out.push(h);
                }
                None => break,
            }
            if self.slots[idx].next == 0 {
                break;
            }
            idx = self.slots[idx].next;
        }
        out
    }
}

// ───────────────────────────────────────────────────────────────
// Event bus
// ───────────────────────────────────────────────────────────────

/// Bounded queue plus registry, owned as one explicit object.
///
/// Generic over the handler token `H` so the queue/registry machinery can
/// be exercised in isolation; the firmware instantiates it with its
/// dispatcher's handler enum.
#[derive(Debug)]
pub struct EventBus<H> {
    queue: EventQueue,
    registry: SubscriberRegistry<H>,
    /// Consumer wake hook — on target this nudges the sleeping core after
    /// an ISR push; on the host it is typically absent.
    wake: Option<fn()>,
}

impl<H: Copy + Eq> EventBus<H> {
    pub fn new() -> Self {
        Self {
            queue: EventQueue::new(),
            registry: SubscriberRegistry::new(),
            wake: None,
        }
    }

    /// Install the consumer wake hook (`send_event` on target).
    pub fn set_wake_hook(&mut self, wake: fn()) {
        self.wake = Some(wake);
    }

    /// Enqueue an event. Rejects the reserved `Null` kind.
    pub fn push(&mut self, kind: EventKind, payload: EventPayload) -> Result<()> {
        if kind == EventKind::Null {
            return Err(Error::InvalidArgument("cannot push Null"));
        }
        self.queue.push(Event::new(kind, payload))?;
        if let Some(wake) = self.wake {
            wake();
        }
        Ok(())
    }

    /// Report an unrecoverable local condition.
    ///
    /// The push result is deliberately ignored: if the queue is full while
    /// reporting an emergency there is nothing better left to do.
    pub fn fault(&mut self, code: FaultCode) {
        error!("emergency fault: {code}");
        let _ = self.push(EventKind::EmergencyFault, EventPayload::Fault(code));
    }

    /// Register `handler` for `kind`; delivery order follows registration
    /// order. Exhausting the overflow pool returns the error *and* raises
    /// an Overflow fault — a missed subscription is a silent correctness
    /// bug, so the system degrades loudly.
    pub fn subscribe(&mut self, kind: EventKind, handler: H) -> Result<()> {
        match self.registry.subscribe(kind, handler) {
            Ok(()) => Ok(()),
            Err(e @ Error::SubscriberTableFull) => {
                self.fault(FaultCode::Overflow);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Consumer side: dequeue the oldest event.
    ///
    /// Must only be called by the single consumer (the main loop); the
    /// event is logically destroyed the instant it is dequeued.
    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop()
    }

    /// Subscription-ordered snapshot of the handlers for `kind`.
    pub fn subscribers_of(&self, kind: EventKind) -> Vec<H, MAX_CHAIN> {
        self.registry.subscribers_of(kind)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_fifo_order() {
        let mut q = EventQueue::new();
        for i in 0..5u32 {
            q.push(Event::new(EventKind::SysTick, EventPayload::SysTick(i)))
                .unwrap();
        }
        for i in 0..5u32 {
            let ev = q.pop().unwrap();
            assert_eq!(ev.payload, EventPayload::SysTick(i));
        }
        assert!(q.pop().is_none());
    }

    #[test]
    fn queue_holds_capacity_minus_one() {
        let mut q = EventQueue::new();
        for _ in 0..q.capacity() {
            q.push(Event::new(EventKind::SysTick, EventPayload::None))
                .unwrap();
        }
        assert_eq!(
            q.push(Event::new(EventKind::SysTick, EventPayload::None)),
            Err(Error::QueueFull)
        );
    }

    #[test]
    fn failed_push_leaves_contents_intact() {
        let mut q = EventQueue::new();
        for i in 0..q.capacity() as u32 {
            q.push(Event::new(EventKind::SysTick, EventPayload::SysTick(i)))
                .unwrap();
        }
        let depth = q.len();
        let _ = q.push(Event::new(EventKind::ButtonUp, EventPayload::None));
        assert_eq!(q.len(), depth);
        // Still drains the original events in order.
        for i in 0..depth as u32 {
            assert_eq!(q.pop().unwrap().payload, EventPayload::SysTick(i));
        }
    }

    #[test]
    fn queue_wraps_cleanly() {
        let mut q = EventQueue::new();
        for round in 0..4u32 {
            for i in 0..3u32 {
                q.push(Event::new(
                    EventKind::SysTick,
                    EventPayload::SysTick(round * 10 + i),
                ))
                .unwrap();
            }
            for i in 0..3u32 {
                assert_eq!(
                    q.pop().unwrap().payload,
                    EventPayload::SysTick(round * 10 + i)
                );
            }
        }
        assert!(q.is_empty());
    }

    #[test]
    fn registry_preserves_subscription_order() {
        let mut reg: SubscriberRegistry<u8> = SubscriberRegistry::new();
        for h in [3u8, 1, 4, 1, 5] {
            reg.subscribe(EventKind::ButtonUp, h).unwrap();
        }
        let subs = reg.subscribers_of(EventKind::ButtonUp);
        assert_eq!(subs.as_slice(), &[3, 1, 4, 1, 5]);
    }

    #[test]
    fn registry_chains_are_independent() {
        let mut reg: SubscriberRegistry<u8> = SubscriberRegistry::new();
        reg.subscribe(EventKind::ButtonUp, 1).unwrap();
        reg.subscribe(EventKind::ButtonDown, 2).unwrap();
        reg.subscribe(EventKind::ButtonUp, 3).unwrap();
        assert_eq!(reg.subscribers_of(EventKind::ButtonUp).as_slice(), &[1, 3]);
        assert_eq!(reg.subscribers_of(EventKind::ButtonDown).as_slice(), &[2]);
        assert!(reg.subscribers_of(EventKind::ButtonHold).is_empty());
    }

    #[test]
    fn registry_overflow_reported() {
        let mut reg: SubscriberRegistry<u8> = SubscriberRegistry::new();
        // Head slot + the whole overflow pool on one kind.
        for i in 0..=(MAX_SUBSCRIPTIONS as u8) {
            reg.subscribe(EventKind::SysTick, i).unwrap();
        }
        assert_eq!(
            reg.subscribe(EventKind::SysTick, 99),
            Err(Error::SubscriberTableFull)
        );
    }

    #[test]
    fn bus_overflow_raises_fault_event() {
        let mut bus: EventBus<u8> = EventBus::new();
        for i in 0..=(MAX_SUBSCRIPTIONS as u8) {
            bus.subscribe(EventKind::SysTick, i).unwrap();
        }
        assert!(bus.subscribe(EventKind::SysTick, 99).is_err());
        let ev = bus.pop().expect("overflow must enqueue a fault event");
        assert_eq!(ev.kind, EventKind::EmergencyFault);
        assert_eq!(ev.payload, EventPayload::Fault(FaultCode::Overflow));
    }

    #[test]
    fn bus_rejects_null_kind() {
        let mut bus: EventBus<u8> = EventBus::new();
        assert!(bus.push(EventKind::Null, EventPayload::None).is_err());
        assert!(bus.subscribe(EventKind::Null, 1).is_err());
    }

    #[test]
    fn wake_hook_fires_on_push() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static WOKEN: AtomicUsize = AtomicUsize::new(0);
        fn wake() {
            WOKEN.fetch_add(1, Ordering::Relaxed);
        }

        let mut bus: EventBus<u8> = EventBus::new();
        bus.set_wake_hook(wake);
        bus.push(EventKind::SysTick, EventPayload::SysTick(1)).unwrap();
        assert_eq!(WOKEN.load(Ordering::Relaxed), 1);
    }
}
