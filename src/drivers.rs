//! ESP-IDF hardware adapters.
//!
//! Thin imperative shims implementing the port traits over esp-idf
//! peripherals. No business logic lives here; each adapter translates one
//! port call into one peripheral call.

use anyhow::Context;
use log::{info, warn};

use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_hal::ledc::LedcDriver;
use esp_idf_hal::uart::UartDriver;
use esp_idf_svc::nvs::{EspNvs, NvsDefault};

use crate::error::{Error, Result};
use crate::ports::{Buzzer, Headlight, Settings, SettingsStore, StatusLed, VescTransport};

const SETTINGS_KEY: &str = "settings";
const SETTINGS_BLOB_MAX: usize = 512;

// ───────────────────────────────────────────────────────────────
// UART transport
// ───────────────────────────────────────────────────────────────

/// VESC byte transport over a UART peripheral.
pub struct VescUart {
    uart: UartDriver<'static>,
}

impl VescUart {
    pub fn new(uart: UartDriver<'static>) -> Self {
        Self { uart }
    }

    /// Non-blocking read of whatever the FIFO holds right now.
    pub fn read_pending(&mut self, buf: &mut [u8]) -> usize {
        match self.uart.read(buf, 0) {
            Ok(n) => n,
            Err(e) => {
                warn!("uart read failed: {e}");
                0
            }
        }
    }
}

impl VescTransport for VescUart {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.uart
            .write(bytes)
            .map_err(|_| Error::Init("uart write"))?;
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Settings persistence
// ───────────────────────────────────────────────────────────────

/// Settings record stored as a JSON blob in NVS.
pub struct NvsSettings {
    nvs: EspNvs<NvsDefault>,
    cached: Settings,
}

impl NvsSettings {
    pub fn new(mut nvs: EspNvs<NvsDefault>) -> anyhow::Result<Self> {
        let mut buf = [0u8; SETTINGS_BLOB_MAX];
        let cached = match nvs.get_raw(SETTINGS_KEY, &mut buf) {
            Ok(Some(blob)) => serde_json::from_slice(blob).unwrap_or_else(|e| {
                warn!("stored settings unreadable ({e}), using defaults");
                Settings::default()
            }),
            Ok(None) => {
                info!("no stored settings, using defaults");
                Settings::default()
            }
            Err(e) => {
                warn!("nvs read failed ({e}), using defaults");
                Settings::default()
            }
        };
        Ok(Self { nvs, cached })
    }
}

impl SettingsStore for NvsSettings {
    fn get(&self) -> Settings {
        self.cached.clone()
    }

    fn save(&mut self, settings: &Settings) -> Result<()> {
        let blob = serde_json::to_vec(settings).map_err(|_| Error::Config("settings encode"))?;
        self.nvs
            .set_raw(SETTINGS_KEY, &blob)
            .map_err(|_| Error::Init("nvs write"))?;
        self.cached = settings.clone();
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Output hardware
// ───────────────────────────────────────────────────────────────

/// Headlight on an LEDC PWM channel.
pub struct LedcHeadlight {
    pwm: LedcDriver<'static>,
    level: u16,
}

impl LedcHeadlight {
    pub fn new(pwm: LedcDriver<'static>) -> Self {
        Self { pwm, level: 0 }
    }

    fn apply(&mut self, level: u16) {
        let max = self.pwm.get_max_duty();
        let duty = u32::from(level) * max / u32::from(u16::MAX);
        if let Err(e) = self.pwm.set_duty(duty) {
            warn!("headlight duty set failed: {e}");
        }
    }
}

impl Headlight for LedcHeadlight {
    fn enable(&mut self, on: bool) {
        let level = if on { self.level } else { 0 };
        self.apply(level);
    }

    fn set_brightness(&mut self, level: u16) {
        self.level = level;
        self.apply(level);
    }
}

/// Status LED bar on an LEDC PWM channel.
pub struct PwmStatusLed {
    pwm: LedcDriver<'static>,
}

impl PwmStatusLed {
    pub fn new(pwm: LedcDriver<'static>) -> Self {
        Self { pwm }
    }
}

impl StatusLed for PwmStatusLed {
    fn set_brightness(&mut self, level: u16) {
        let max = self.pwm.get_max_duty();
        let duty = u32::from(level) * max / u32::from(u16::MAX);
        if let Err(e) = self.pwm.set_duty(duty) {
            warn!("status led duty set failed: {e}");
        }
    }
}

/// Beeper on a plain GPIO.
pub struct GpioBuzzer {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl GpioBuzzer {
    pub fn new(pin: PinDriver<'static, AnyOutputPin, Output>) -> Self {
        Self { pin }
    }
}

impl Buzzer for GpioBuzzer {
    fn enable(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(e) = result {
            warn!("buzzer pin set failed: {e}");
        }
    }
}

/// Initialise the default NVS partition and open the firmware namespace.
pub fn open_settings_nvs() -> anyhow::Result<EspNvs<NvsDefault>> {
    let partition =
        esp_idf_svc::nvs::EspDefaultNvsPartition::take().context("take NVS partition")?;
    EspNvs::new(partition, "boardlcm", true).context("open NVS namespace")
}
