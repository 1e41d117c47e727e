//! Output rendering: board state onto the headlight, status bar and beeper.
//!
//! Generic over the output port traits so the same observer drives LEDC
//! peripherals on target and recording mocks on the host. The full
//! animation engine plugs in behind the same ports; this covers the
//! always-on behaviors.

use crate::board_mode::BoardMode;
use crate::bus::EventBus;
use crate::events::{Event, EventKind, EventPayload};
use crate::ports::{Buzzer, EventObserver, Headlight, Settings, StatusLed};
use crate::system::HandlerId;
use crate::timers::TimerPool;

/// Renders board-mode changes and light/beeper toggles onto the outputs.
pub struct LightsObserver<H, S, B> {
    headlight: H,
    status: S,
    buzzer: B,
    settings: Settings,
}

impl<H: Headlight, S: StatusLed, B: Buzzer> LightsObserver<H, S, B> {
    pub fn new(headlight: H, status: S, buzzer: B, settings: Settings) -> Self {
        Self {
            headlight,
            status,
            buzzer,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Drive both light outputs from the current settings. Brightness is
    /// programmed before the enable so the lamp never flashes at a stale
    /// duty cycle.
    fn apply_lights(&mut self, lit: bool) {
        let on = lit && self.settings.lights_enabled;
        self.headlight.set_brightness(if on {
            self.settings.headlight_brightness
        } else {
            0
        });
        self.headlight.enable(on);
        self.status.set_brightness(if lit {
            self.settings.status_bar_brightness
        } else {
            0
        });
    }
}

impl<H: Headlight, S: StatusLed, B: Buzzer> EventObserver for LightsObserver<H, S, B> {
    fn on_event(&mut self, event: &Event, _bus: &mut EventBus<HandlerId>, _timers: &mut TimerPool) {
        match (event.kind, event.payload) {
            (EventKind::BoardModeChanged, EventPayload::BoardMode(change)) => {
                let lit = !matches!(change.mode, BoardMode::Off | BoardMode::Charging);
                self.apply_lights(lit);
                if change.mode == BoardMode::Fault && self.settings.beeper_enabled {
                    self.buzzer.enable(true);
                }
            }
            (EventKind::CommandToggleLights, _) => {
                self.settings.lights_enabled = !self.settings.lights_enabled;
                self.apply_lights(true);
            }
            (EventKind::CommandToggleBeeper, _) => {
                self.settings.beeper_enabled = !self.settings.beeper_enabled;
                if !self.settings.beeper_enabled {
                    self.buzzer.enable(false);
                }
            }
            _ => {}
        }
    }
}
