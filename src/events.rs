//! Event vocabulary.
//!
//! Events are produced by:
//! - ISR shims (1 ms tick, UART line-idle, wakeup pin)
//! - Software timers (via the tick event)
//! - The serial decoder (telemetry-changed, liveness)
//! - The board-mode state machine and external collaborators
//!
//! Events are consumed by the main loop, which drains the bus and invokes
//! subscriber handlers one event at a time, to completion. An [`Event`] is a
//! plain value: a kind tag plus a fixed-size payload that matches it. It is
//! copied into and out of the queue and carries no ownership.

use crate::board_mode::{BoardMode, BoardSubmode};
use crate::error::FaultCode;

// ───────────────────────────────────────────────────────────────
// Event kinds
// ───────────────────────────────────────────────────────────────

/// The closed set of event kinds.
///
/// `Null` is reserved: the bus rejects it on push and subscribe, and a
/// zeroed queue slot decodes to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    Null = 0,

    /// 1 ms system tick, payload carries the running tick count.
    SysTick,

    // Button transitions (gesture recognition is a collaborator; the core
    // only routes these).
    ButtonWakeup,
    ButtonDown,
    ButtonUp,
    ButtonClick,
    ButtonHold,

    /// Footpad occupancy changed.
    FootpadChanged,

    /// The (mode, submode) pair changed; payload carries old and new.
    BoardModeChanged,

    /// The UART reported line-idle with bytes pending in the RX ring.
    SerialDataRx,

    // Telemetry-changed events, published only when the retained value
    // actually changed.
    DutyCycleChanged,
    RpmChanged,
    BatteryLevelChanged,
    /// First valid frame ever received from the motor controller.
    VescAlive,

    // IMU events (published by the IMU collaborator when fitted).
    ImuPitchChanged,
    ImuRollChanged,

    // Command events from the gesture/settings collaborators.
    CommandContextChanged,
    CommandToggleLights,
    CommandToggleBeeper,
    CommandBoot,
    CommandShutdown,
    CommandAck,
    CommandAck2,
    CommandNack,
    CommandSettingsChanged,
    CommandModeConfig,

    /// Unrecoverable local condition reported by any component.
    EmergencyFault,
}

impl EventKind {
    /// Total number of kinds, `Null` included — sizes the subscriber table.
    pub const COUNT: usize = 27;
}

// ───────────────────────────────────────────────────────────────
// Payloads
// ───────────────────────────────────────────────────────────────

/// Footpad occupancy bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FootpadsState(pub u8);

impl FootpadsState {
    pub const NONE: Self = Self(0x00);
    pub const LEFT: Self = Self(0x01);
    pub const RIGHT: Self = Self(0x02);
    pub const BOTH: Self = Self(0x03);

    /// True when neither pad is pressed.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Old and new (mode, submode) pair carried by `BoardModeChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardModeChange {
    pub mode: BoardMode,
    pub submode: BoardSubmode,
    pub previous_mode: BoardMode,
    pub previous_submode: BoardSubmode,
}

/// Settings contexts a command collaborator can put the board into
/// (which knob the next gesture adjusts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CommandContext {
    HeadlightBrightness = 0,
    StatusBarBrightness,
    PersonalColor,
    BootAnimation,
    IdleAnimation,
    DozingAnimation,
    RidingAnimation,
    ShutdownAnimation,
    #[default]
    Default,
}

/// Fixed-size payload variant matching the event kind.
#[derive(Debug, Clone, Copy, PartialEq)]
#[derive(Default)]
pub enum EventPayload {
    #[default]
    None,
    SysTick(u32),
    BoardMode(BoardModeChange),
    Footpads(FootpadsState),
    Fault(FaultCode),
    /// Timestamp (ms) of a button edge.
    ButtonTime(u32),
    ClickCount(u8),
    DutyCycle(f32),
    Rpm(i32),
    BatteryLevel(f32),
    ImuPitch(f32),
    ImuRoll(f32),
    Context(CommandContext),
    Enable(bool),
}

/// One queued event: kind tag plus matching payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub payload: EventPayload,
}

impl Event {
    /// The value a fresh queue slot holds; never delivered.
    pub const NULL: Self = Self {
        kind: EventKind::Null,
        payload: EventPayload::None,
    };

    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self { kind, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_count_matches_enum() {
        // Last discriminant + 1. Update COUNT when adding kinds.
        assert_eq!(EventKind::EmergencyFault as usize + 1, EventKind::COUNT);
    }

    #[test]
    fn footpads_bitmask_helpers() {
        assert!(FootpadsState::NONE.is_none());
        assert!(!FootpadsState::LEFT.is_none());
        assert_eq!(FootpadsState(0x01 | 0x02), FootpadsState::BOTH);
    }
}
