//! Boardlcm firmware library.
//!
//! Core of the light-and-status control module for VESC-based electric
//! skateboards: event bus, software timers, board-mode state machine, and
//! the motor-controller telemetry decoder. Everything here is pure logic,
//! exposed for integration testing and external inspection; ESP-IDF
//! specifics live in `drivers` and the binary, behind the `espidf`
//! feature.

#![deny(unused_must_use)]

pub mod board_mode;
pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod hysteresis;
pub mod lights;
pub mod ports;
pub mod system;
pub mod timers;
pub mod vesc;

#[cfg(feature = "espidf")]
pub mod drivers;

pub use board_mode::{BoardMode, BoardModeMachine, BoardSubmode};
pub use config::SystemConfig;
pub use error::{Error, FaultCode, Result};
pub use events::{Event, EventKind, EventPayload, FootpadsState};
pub use system::{HandlerId, System};
