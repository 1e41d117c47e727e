//! Port traits: the seams between the core and its collaborators.
//!
//! The core never talks to hardware or to the rendering layer directly. It
//! sends bytes through a [`VescTransport`], hands every delivered event to
//! an [`EventObserver`] (the animation/gesture/settings side of the
//! firmware), and drives output hardware through simple imperative setters.
//! Target builds implement these over esp-idf peripherals; tests implement
//! them with mocks.

use serde::{Deserialize, Serialize};

use crate::bus::EventBus;
use crate::error::Result;
use crate::events::Event;
use crate::system::HandlerId;
use crate::timers::TimerPool;

/// Byte transport to the motor controller.
pub trait VescTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

/// External collaborator hook. Receives every event after the core handlers
/// ran, plus expiries of any observer-tagged timers it armed.
///
/// Observers publish back through the bus (acks, settings-changed, command
/// events) and may arm timers; they must not drain the bus.
pub trait EventObserver {
    fn on_event(&mut self, event: &Event, bus: &mut EventBus<HandlerId>, timers: &mut TimerPool);

    /// An `Observer(tag)` timer expired.
    fn on_timer(&mut self, tag: u8, bus: &mut EventBus<HandlerId>, timers: &mut TimerPool) {
        let _ = (tag, bus, timers);
    }
}

/// A no-op observer for cores that run headless.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl EventObserver for NullObserver {
    fn on_event(&mut self, _: &Event, _: &mut EventBus<HandlerId>, _: &mut TimerPool) {}
}

// ───────────────────────────────────────────────────────────────
// Settings
// ───────────────────────────────────────────────────────────────

/// Animation choice per board state, as stored in settings. Opaque to the
/// core; the rendering layer interprets it.
pub type AnimationId = u8;

/// The persisted settings record. The core only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub headlight_brightness: u16,
    pub status_bar_brightness: u16,
    pub lights_enabled: bool,
    pub beeper_enabled: bool,
    /// Rider's personal color, packed RGB.
    pub personal_color: u32,
    pub boot_animation: AnimationId,
    pub idle_animation: AnimationId,
    pub dozing_animation: AnimationId,
    pub riding_animation: AnimationId,
    pub shutdown_animation: AnimationId,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            headlight_brightness: 512,
            status_bar_brightness: 256,
            lights_enabled: true,
            beeper_enabled: true,
            personal_color: 0x00ff_2800,
            boot_animation: 0,
            idle_animation: 0,
            dozing_animation: 0,
            riding_animation: 0,
            shutdown_animation: 0,
        }
    }
}

/// Settings persistence. `get` must be cheap; `save` must not block the
/// event loop for long.
pub trait SettingsStore {
    fn get(&self) -> Settings;
    fn save(&mut self, settings: &Settings) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Output hardware
// ───────────────────────────────────────────────────────────────

/// Headlight/taillight driver.
pub trait Headlight {
    fn enable(&mut self, on: bool);
    fn set_brightness(&mut self, level: u16);
}

/// Status LED bar driver.
pub trait StatusLed {
    fn set_brightness(&mut self, level: u16);
}

/// Beeper driver.
pub trait Buzzer {
    fn enable(&mut self, on: bool);
}
