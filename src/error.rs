//! Unified error types for the boardlcm firmware.
//!
//! Follows embedded best practice: a single `Error` enum that every subsystem
//! can convert into, keeping the top-level control loop's error handling uniform.
//! All variants are `Copy` so they can be cheaply passed through the event bus
//! and state machine without allocation.
//!
//! Errors and faults are deliberately separate. An [`Error`] is returned to
//! the *caller* of an operation (queue full, invalid handle). A [`FaultCode`]
//! travels through the event bus as an emergency-fault event and is consumed
//! by the board-mode state machine, which latches the system into FAULT mode.
//! Resource exhaustion produces both: the caller gets the error code, and the
//! rest of the system hears about it loudly.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The event queue has no free slot; the event was not enqueued.
    QueueFull,
    /// The subscriber table's overflow pool is exhausted.
    SubscriberTableFull,
    /// The software timer pool has no free slot.
    TimerPoolFull,
    /// A timer handle is the reserved invalid id or names no live timer.
    InvalidHandle,
    /// An argument failed validation (reserved event kind, zero timeout, ...).
    InvalidArgument(&'static str),
    /// Subsystem initialisation failed.
    Init(&'static str),
    /// Configuration is invalid (e.g. hysteresis thresholds inverted).
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "event queue full"),
            Self::SubscriberTableFull => write!(f, "subscriber table full"),
            Self::TimerPoolFull => write!(f, "timer pool full"),
            Self::InvalidHandle => write!(f, "invalid timer handle"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Emergency fault codes
// ---------------------------------------------------------------------------

/// Fault codes carried inside emergency-fault events.
///
/// These indicate unrecoverable local conditions: static configuration
/// mismatches (pool overflow), logic errors (invalid state pairing), or a
/// misbehaving motor controller. They are *reported*, never thrown — the
/// reporting component keeps running and the board-mode machine decides what
/// the system does about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FaultCode {
    #[default]
    Undefined = 0,
    /// A fixed pool (subscribers, timers) was exhausted.
    Overflow,
    /// An invalid (mode, submode) pairing or similar impossible state.
    InvalidState,
    /// A handler received an event kind it asserts it never subscribes to.
    InvalidEvent,
    /// A protocol frame declared a length that cannot be valid.
    InvalidLength,
    /// A decoded value fell outside its plausible range, or a field mask
    /// did not match the one requested.
    OutOfBounds,
    /// The motor controller reported a fault code of its own.
    Vesc,
    /// The motor controller stopped answering polls.
    VescCommTimeout,
    /// Subsystem initialisation failed at runtime.
    InitFail,
    /// The main event pump reported an error it could not attribute.
    Unexpected,
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Overflow => write!(f, "pool overflow"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::InvalidEvent => write!(f, "invalid event"),
            Self::InvalidLength => write!(f, "invalid frame length"),
            Self::OutOfBounds => write!(f, "value out of bounds"),
            Self::Vesc => write!(f, "VESC fault"),
            Self::VescCommTimeout => write!(f, "VESC communication timeout"),
            Self::InitFail => write!(f, "init failure"),
            Self::Unexpected => write!(f, "unexpected error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
