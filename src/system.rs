//! System assembly: owns every core component and runs the event pump.
//!
//! The main loop has one job: drain the bus and hand each event to its
//! subscribers, in order, to completion. Handlers are identified by
//! [`HandlerId`] tags; the dispatcher matches the tag and routes into the
//! owning component with the bus and timer pool reborrowed alongside, so
//! handlers can publish and (re)arm freely while an event is in flight.

use log::{info, trace, warn};

use crate::board_mode::{BoardMode, BoardModeMachine, BoardSubmode};
use crate::bus::EventBus;
use crate::config::SystemConfig;
use crate::error::{FaultCode, Result};
use crate::events::{Event, EventKind, EventPayload};
use crate::ports::{EventObserver, VescTransport};
use crate::timers::{TimerHandler, TimerPool};
use crate::vesc::VescSerial;

/// Subscriber identity tags. Equality on the tag is the registry's only
/// notion of "which handler"; no code addresses are compared anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerId {
    /// The timer pool's tick handler.
    Timers,
    /// The board-mode state machine.
    BoardMode,
    /// The serial decoder.
    VescSerial,
    /// The external collaborator hook.
    Observer,
}

/// Events the external observer hears about, in addition to whatever it
/// publishes itself.
const OBSERVER_EVENTS: &[EventKind] = &[
    EventKind::BoardModeChanged,
    EventKind::FootpadChanged,
    EventKind::BatteryLevelChanged,
    EventKind::ButtonClick,
    EventKind::ButtonHold,
    EventKind::CommandContextChanged,
    EventKind::CommandToggleLights,
    EventKind::CommandToggleBeeper,
    EventKind::CommandSettingsChanged,
    EventKind::CommandAck,
    EventKind::CommandAck2,
    EventKind::CommandNack,
];

/// The assembled core.
pub struct System<T, O> {
    bus: EventBus<HandlerId>,
    timers: TimerPool,
    board: BoardModeMachine,
    vesc: VescSerial<T>,
    observer: O,
    tick_count: u32,
}

impl<T: VescTransport, O: EventObserver> System<T, O> {
    pub fn new(config: &SystemConfig, transport: T, observer: O) -> Result<Self> {
        let mut system = Self {
            bus: EventBus::new(),
            timers: TimerPool::new(),
            board: BoardModeMachine::new(config)?,
            vesc: VescSerial::new(transport, config),
            observer,
            tick_count: 0,
        };
        system.wire_subscriptions(config)?;
        info!("core initialised");
        Ok(system)
    }

    fn wire_subscriptions(&mut self, config: &SystemConfig) -> Result<()> {
        let bus = &mut self.bus;
        bus.subscribe(EventKind::SysTick, HandlerId::Timers)?;

        for kind in [
            EventKind::CommandBoot,
            EventKind::CommandShutdown,
            EventKind::CommandModeConfig,
            EventKind::ButtonUp,
            EventKind::VescAlive,
            EventKind::RpmChanged,
            EventKind::DutyCycleChanged,
            EventKind::FootpadChanged,
            EventKind::EmergencyFault,
        ] {
            bus.subscribe(kind, HandlerId::BoardMode)?;
        }
        if config.roll_sensing_enabled {
            bus.subscribe(EventKind::ImuRollChanged, HandlerId::BoardMode)?;
        }

        bus.subscribe(EventKind::SerialDataRx, HandlerId::VescSerial)?;
        bus.subscribe(EventKind::BoardModeChanged, HandlerId::VescSerial)?;

        for &kind in OBSERVER_EVENTS {
            bus.subscribe(kind, HandlerId::Observer)?;
        }
        Ok(())
    }

    /// Kick the power-on sequence.
    pub fn boot(&mut self) -> Result<()> {
        self.bus.push(EventKind::CommandBoot, EventPayload::None)
    }

    /// Millisecond tick entry point (ISR shim on target). A full queue
    /// drops the tick; the next one carries an advanced count, so timer
    /// drift under overload is bounded by the drop count.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
        if self
            .bus
            .push(EventKind::SysTick, EventPayload::SysTick(self.tick_count))
            .is_err()
        {
            trace!("tick dropped: queue full");
        }
    }

    /// Receive-path entry point: buffer bytes, then signal line-idle.
    pub fn serial_rx(&mut self, bytes: &[u8]) {
        self.vesc.rx_bytes(bytes);
        if self
            .bus
            .push(EventKind::SerialDataRx, EventPayload::None)
            .is_err()
        {
            warn!("serial-rx signal dropped: queue full");
        }
    }

    /// Publish an event on behalf of a collaborator.
    pub fn push(&mut self, kind: EventKind, payload: EventPayload) -> Result<()> {
        self.bus.push(kind, payload)
    }

    /// Install the consumer wake hook used by the target main loop.
    pub fn set_wake_hook(&mut self, wake: fn()) {
        self.bus.set_wake_hook(wake);
    }

    /// Process one queued event. Returns false when the queue was empty.
    pub fn run_once(&mut self) -> bool {
        let Some(event) = self.bus.pop() else {
            return false;
        };
        self.deliver(event);
        true
    }

    /// Drain everything currently queued, including events enqueued by the
    /// handlers along the way.
    pub fn run_pending(&mut self) {
        while self.run_once() {}
    }

    fn deliver(&mut self, event: Event) {
        for handler in self.bus.subscribers_of(event.kind) {
            match handler {
                HandlerId::Timers => self.run_timers(&event),
                HandlerId::BoardMode => {
                    self.board.handle_event(&event, &mut self.bus, &mut self.timers);
                }
                HandlerId::VescSerial => {
                    self.vesc.handle_event(&event, &mut self.bus, &mut self.timers);
                }
                HandlerId::Observer => {
                    self.observer.on_event(&event, &mut self.bus, &mut self.timers);
                }
            }
        }
    }

    /// Tick handler: advance the pool, dispatch each expiry, then settle it
    /// so a handler's own re-arm survives untouched.
    fn run_timers(&mut self, event: &Event) {
        if event.kind != EventKind::SysTick {
            self.bus.fault(FaultCode::InvalidEvent);
            return;
        }
        for expiry in self.timers.advance() {
            match expiry.handler {
                TimerHandler::IdleStage => {
                    self.board.idle_timer_expired(&mut self.bus, &mut self.timers);
                }
                TimerHandler::VescPoll => self.vesc.poll_timer_expired(&mut self.bus),
                TimerHandler::Observer(tag) => {
                    self.observer.on_timer(tag, &mut self.bus, &mut self.timers);
                }
            }
            self.timers.settle(expiry.id);
        }
    }

    pub fn board_mode(&self) -> BoardMode {
        self.board.mode()
    }

    pub fn board_submode(&self) -> BoardSubmode {
        self.board.submode()
    }

    pub fn vesc(&self) -> &VescSerial<T> {
        &self.vesc
    }

    /// Direct access to the byte transport, for the driver's receive path.
    pub fn vesc_transport_mut(&mut self) -> &mut T {
        self.vesc.transport_mut()
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn pending_events(&self) -> usize {
        self.bus.len()
    }

    pub fn active_timers(&self) -> usize {
        self.timers.active_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NullObserver;

    #[derive(Debug, Default)]
    struct SinkTransport;

    impl VescTransport for SinkTransport {
        fn send(&mut self, _: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    fn system() -> System<SinkTransport, NullObserver> {
        System::new(&SystemConfig::default(), SinkTransport, NullObserver).unwrap()
    }

    #[test]
    fn boot_enters_booting_and_starts_polling() {
        let mut sys = system();
        sys.boot().unwrap();
        sys.run_pending();
        assert_eq!(sys.board_mode(), BoardMode::Booting);
        // The mode change armed the telemetry poll timer.
        assert_eq!(sys.active_timers(), 1);
    }

    #[test]
    fn ticks_drive_the_poll_timer() {
        let mut sys = system();
        sys.boot().unwrap();
        sys.run_pending();
        let interval = SystemConfig::default().vesc_poll_interval_ms;
        for _ in 0..interval {
            sys.tick();
            sys.run_pending();
        }
        // One poll went out and is now outstanding; nothing decoded yet.
        assert!(!sys.vesc().is_alive());
    }

    #[test]
    fn queue_overload_drops_ticks_quietly() {
        let mut sys = system();
        for _ in 0..20 {
            sys.tick();
        }
        sys.run_pending();
        assert_eq!(sys.pending_events(), 0);
    }

    #[test]
    fn collaborator_events_reach_the_observer() {
        #[derive(Default)]
        struct Counting {
            seen: usize,
        }
        impl EventObserver for Counting {
            fn on_event(
                &mut self,
                event: &Event,
                _: &mut EventBus<HandlerId>,
                _: &mut TimerPool,
            ) {
                if event.kind == EventKind::CommandToggleLights {
                    self.seen += 1;
                }
            }
        }

        let mut sys =
            System::new(&SystemConfig::default(), SinkTransport, Counting::default()).unwrap();
        sys.push(EventKind::CommandToggleLights, EventPayload::Enable(true))
            .unwrap();
        sys.run_pending();
        assert_eq!(sys.observer().seen, 1);
    }
}
