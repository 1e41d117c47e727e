//! Board-mode state machine.
//!
//! Top-level ride/idle/fault state, driven entirely by bus events and the
//! idle-stage timer. A Mealy machine: `(mode, submode) × event` yields a new
//! pair, a board-mode-changed event (only when the pair actually changed),
//! and timer side effects. Exactly one function mutates the pair.
//!
//! Riding submodes are chosen through four independent hysteresis latches so
//! a board hovering at a threshold never flickers:
//!
//! | latch        | set                  | reset          | submode when set |
//! |--------------|----------------------|----------------|------------------|
//! | duty danger  | danger threshold     | set − 5.0      | DANGER           |
//! | duty warning | warning threshold    | set − 5.0      | WARNING          |
//! | rpm slow     | slow rpm threshold   | set − 10%      | NORMAL           |
//! | rpm stopped  | stopped rpm threshold| set − 10%      | SLOW             |
//!
//! Priority is strict: DANGER > WARNING > NORMAL > SLOW > STOPPED.

use log::{info, warn};

use crate::bus::EventBus;
use crate::config::SystemConfig;
use crate::error::FaultCode;
use crate::events::{BoardModeChange, Event, EventKind, EventPayload, FootpadsState};
use crate::hysteresis::{Hysteresis, LatchState};
use crate::timers::{TimerHandler, TimerId, TimerPool};

/// Top-level board mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardMode {
    Off,
    Booting,
    Idle,
    Riding,
    Charging,
    Fault,
}

/// Mode-specific submode. `Undefined` is the only valid submode for modes
/// that have no refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardSubmode {
    Undefined,

    // IDLE stages, in escalation order.
    IdleActive,
    IdleDefault,
    IdleDozing,
    IdleShuttingDown,
    /// Settings are being adjusted; the idle chain is suspended.
    IdleConfig,

    // RIDING submodes, in ascending priority.
    RidingStopped,
    RidingSlow,
    RidingNormal,
    RidingWarning,
    RidingDanger,
}

fn valid_pair(mode: BoardMode, submode: BoardSubmode) -> bool {
    use BoardSubmode::*;
    match mode {
        BoardMode::Off | BoardMode::Booting | BoardMode::Charging | BoardMode::Fault => {
            submode == Undefined
        }
        BoardMode::Idle => matches!(
            submode,
            IdleActive | IdleDefault | IdleDozing | IdleShuttingDown | IdleConfig
        ),
        BoardMode::Riding => matches!(
            submode,
            RidingStopped | RidingSlow | RidingNormal | RidingWarning | RidingDanger
        ),
    }
}

/// The board-mode state machine. Owns the riding hysteresis latches, the
/// idle-stage timer handle, and cached copies of the inputs it decides on.
#[derive(Debug)]
pub struct BoardModeMachine {
    config: SystemConfig,

    mode: BoardMode,
    submode: BoardSubmode,

    idle_timer: TimerId,

    // Latest inputs, cached from their change events.
    footpads: FootpadsState,
    rpm: i32,
    duty: f32,
    /// Roll reading says the board is lying on its side; riding submode
    /// recomputation is frozen while true.
    on_side: bool,

    duty_danger: Hysteresis,
    duty_warning: Hysteresis,
    rpm_slow: Hysteresis,
    rpm_stopped: Hysteresis,
}

impl BoardModeMachine {
    pub fn new(config: &SystemConfig) -> crate::error::Result<Self> {
        Ok(Self {
            duty_danger: Hysteresis::new(
                config.duty_danger_threshold,
                config.duty_danger_threshold - 5.0,
            )?,
            duty_warning: Hysteresis::new(
                config.duty_warning_threshold,
                config.duty_warning_threshold - 5.0,
            )?,
            rpm_slow: Hysteresis::new(
                config.slow_rpm_threshold,
                config.slow_rpm_threshold * 0.9,
            )?,
            rpm_stopped: Hysteresis::new(
                config.stopped_rpm_threshold,
                config.stopped_rpm_threshold * 0.9,
            )?,
            config: config.clone(),
            mode: BoardMode::Off,
            submode: BoardSubmode::Undefined,
            idle_timer: TimerId::INVALID,
            footpads: FootpadsState::NONE,
            rpm: 0,
            duty: 0.0,
            on_side: false,
        })
    }

    pub fn mode(&self) -> BoardMode {
        self.mode
    }

    pub fn submode(&self) -> BoardSubmode {
        self.submode
    }

    /// The one mutation point. Validates the pairing, updates the idle
    /// timer, and publishes the change carrying old and new.
    pub fn set<H: Copy + Eq>(
        &mut self,
        mode: BoardMode,
        submode: BoardSubmode,
        bus: &mut EventBus<H>,
        timers: &mut TimerPool,
    ) {
        if !valid_pair(mode, submode) {
            warn!("invalid mode pairing {mode:?}/{submode:?}");
            bus.fault(FaultCode::InvalidState);
            return;
        }
        if mode == self.mode && submode == self.submode {
            return;
        }

        let change = BoardModeChange {
            mode,
            submode,
            previous_mode: self.mode,
            previous_submode: self.submode,
        };
        info!(
            "board mode {:?}/{:?} -> {mode:?}/{submode:?}",
            self.mode, self.submode
        );
        self.mode = mode;
        self.submode = submode;

        self.update_idle_timer(bus, timers);

        if bus
            .push(EventKind::BoardModeChanged, EventPayload::BoardMode(change))
            .is_err()
        {
            warn!("board-mode change dropped: queue full");
        }
    }

    /// Arm the idle-stage timer for the stage just entered, or cancel it
    /// when the new state has no auto-timeout.
    fn update_idle_timer<H: Copy + Eq>(&mut self, bus: &mut EventBus<H>, timers: &mut TimerPool) {
        let timeout = match (self.mode, self.submode) {
            (BoardMode::Idle, BoardSubmode::IdleActive) => Some(self.config.idle_active_timeout_ms),
            (BoardMode::Idle, BoardSubmode::IdleDefault) => {
                Some(self.config.idle_default_timeout_ms)
            }
            (BoardMode::Idle, BoardSubmode::IdleDozing) => Some(self.config.idle_dozing_timeout_ms),
            (BoardMode::Idle, BoardSubmode::IdleShuttingDown) => {
                Some(self.config.idle_shutdown_timeout_ms)
            }
            _ => None,
        };
        match timeout {
            Some(ms) => {
                self.idle_timer = timers.set_or_fault(bus, TimerHandler::IdleStage, ms, false);
            }
            None => {
                let _ = timers.cancel(self.idle_timer);
                self.idle_timer = TimerId::INVALID;
            }
        }
    }

    /// Idle-stage timer expiry: walk one step down the idle chain.
    pub fn idle_timer_expired<H: Copy + Eq>(
        &mut self,
        bus: &mut EventBus<H>,
        timers: &mut TimerPool,
    ) {
        if self.mode != BoardMode::Idle {
            return;
        }
        let next = match self.submode {
            BoardSubmode::IdleActive => BoardSubmode::IdleDefault,
            BoardSubmode::IdleDefault => BoardSubmode::IdleDozing,
            BoardSubmode::IdleDozing => BoardSubmode::IdleShuttingDown,
            BoardSubmode::IdleShuttingDown => {
                self.set(BoardMode::Off, BoardSubmode::Undefined, bus, timers);
                return;
            }
            _ => return,
        };
        self.set(BoardMode::Idle, next, bus, timers);
    }

    /// Bus event entry point.
    pub fn handle_event<H: Copy + Eq>(
        &mut self,
        event: &Event,
        bus: &mut EventBus<H>,
        timers: &mut TimerPool,
    ) {
        match event.kind {
            EventKind::CommandBoot => {
                if self.mode == BoardMode::Off {
                    self.set(BoardMode::Booting, BoardSubmode::Undefined, bus, timers);
                }
            }
            EventKind::VescAlive => {
                if self.mode == BoardMode::Booting {
                    self.set(BoardMode::Idle, BoardSubmode::IdleActive, bus, timers);
                }
            }
            EventKind::ButtonUp => {
                // User cancelled a pending shutdown.
                if self.mode == BoardMode::Idle && self.submode == BoardSubmode::IdleShuttingDown {
                    self.set(BoardMode::Idle, BoardSubmode::IdleActive, bus, timers);
                }
            }
            // Shutdown is honoured from any mode, including RIDING: powering
            // off must stay reachable even with a stuck sensor.
            EventKind::CommandShutdown => {
                self.set(BoardMode::Idle, BoardSubmode::IdleShuttingDown, bus, timers);
            }
            EventKind::CommandModeConfig => match (self.mode, self.submode) {
                (BoardMode::Idle, BoardSubmode::IdleConfig) => {
                    self.set(BoardMode::Idle, BoardSubmode::IdleActive, bus, timers);
                }
                (BoardMode::Idle, _) => {
                    self.set(BoardMode::Idle, BoardSubmode::IdleConfig, bus, timers);
                }
                _ => {
                    if bus.push(EventKind::CommandNack, EventPayload::None).is_err() {
                        warn!("nack dropped: queue full");
                    }
                }
            },
            EventKind::RpmChanged => {
                if let EventPayload::Rpm(rpm) = event.payload {
                    self.rpm = rpm;
                    self.reevaluate(bus, timers);
                }
            }
            EventKind::DutyCycleChanged => {
                if let EventPayload::DutyCycle(duty) = event.payload {
                    self.duty = duty;
                    self.reevaluate(bus, timers);
                }
            }
            EventKind::FootpadChanged => {
                if let EventPayload::Footpads(pads) = event.payload {
                    self.footpads = pads;
                    self.reevaluate(bus, timers);
                }
            }
            EventKind::ImuRollChanged => {
                if let EventPayload::ImuRoll(deg) = event.payload {
                    self.roll_changed(deg, bus, timers);
                }
            }
            EventKind::EmergencyFault => {
                self.set(BoardMode::Fault, BoardSubmode::Undefined, bus, timers);
            }
            _ => {}
        }
    }

    fn roll_changed<H: Copy + Eq>(
        &mut self,
        roll_deg: f32,
        bus: &mut EventBus<H>,
        timers: &mut TimerPool,
    ) {
        if !self.config.roll_sensing_enabled {
            return;
        }
        self.on_side = roll_deg.abs() > self.config.roll_doze_threshold_deg;
        if self.mode != BoardMode::Idle {
            return;
        }
        // A board on its side dozes early; standing it up wakes it.
        match self.submode {
            BoardSubmode::IdleActive | BoardSubmode::IdleDefault if self.on_side => {
                self.set(BoardMode::Idle, BoardSubmode::IdleDozing, bus, timers);
            }
            BoardSubmode::IdleDozing if !self.on_side => {
                self.set(BoardMode::Idle, BoardSubmode::IdleActive, bus, timers);
            }
            _ => {}
        }
    }

    /// Recompute the ride/idle decision from the cached inputs.
    fn reevaluate<H: Copy + Eq>(&mut self, bus: &mut EventBus<H>, timers: &mut TimerPool) {
        // Roll says the telemetry is unreliable; freeze riding state.
        if self.on_side {
            return;
        }
        match self.mode {
            BoardMode::Idle => {
                if self.submode == BoardSubmode::IdleConfig {
                    return;
                }
                if self.rpm != 0 || !self.footpads.is_none() {
                    let submode = self.riding_submode();
                    self.set(BoardMode::Riding, submode, bus, timers);
                }
            }
            BoardMode::Riding => {
                // Demotion requires the wheel fully stopped; the latches
                // only pick among riding submodes.
                if self.rpm == 0 && self.footpads.is_none() {
                    self.set(BoardMode::Idle, BoardSubmode::IdleActive, bus, timers);
                } else {
                    let submode = self.riding_submode();
                    self.set(BoardMode::Riding, submode, bus, timers);
                }
            }
            _ => {}
        }
    }

    /// Feed every latch, then pick by strict priority.
    fn riding_submode(&mut self) -> BoardSubmode {
        let danger = self.duty_danger.apply(self.duty);
        let warning = self.duty_warning.apply(self.duty);
        let abs_rpm = (self.rpm as f32).abs();
        let moving_fast = self.rpm_slow.apply(abs_rpm);
        let moving_at_all = self.rpm_stopped.apply(abs_rpm);

        if danger == LatchState::Set {
            BoardSubmode::RidingDanger
        } else if warning == LatchState::Set {
            BoardSubmode::RidingWarning
        } else if moving_fast == LatchState::Set {
            BoardSubmode::RidingNormal
        } else if moving_at_all == LatchState::Set {
            BoardSubmode::RidingSlow
        } else {
            BoardSubmode::RidingStopped
        }
    }
}
