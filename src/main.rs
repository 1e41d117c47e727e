//! Boardlcm firmware — main entry point.
//!
//! Event-driven single-consumer architecture:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Adapters (outer ring)                   │
//! │                                                          │
//! │  VescUart      NvsSettings    LedcHeadlight  GpioBuzzer  │
//! │  (transport)   (SettingsStore)  (Headlight)  (Buzzer)    │
//! │                                                          │
//! │  ───────────────  Port Trait Boundary  ───────────────   │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │         System (pure logic)                        │  │
//! │  │  EventBus · TimerPool · BoardMode · VescSerial     │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │                                                          │
//! │  1 ms tick thread · UART reader thread · main pump       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The core is shared behind one mutex; the tick and UART threads only
//! push events (short lock hold), the main thread drains.

#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};

use esp_idf_hal::gpio::PinDriver;
use esp_idf_hal::ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver};
use esp_idf_hal::units::Hertz;

use boardlcm::drivers::{
    open_settings_nvs, GpioBuzzer, LedcHeadlight, NvsSettings, PwmStatusLed, VescUart,
};
use boardlcm::lights::LightsObserver;
use boardlcm::ports::{Settings, SettingsStore};
use boardlcm::SystemConfig;

const VESC_UART_BAUD: u32 = 115_200;

type CoreSystem =
    boardlcm::System<VescUart, LightsObserver<LedcHeadlight, PwmStatusLed, GpioBuzzer>>;

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("boardlcm v{}", env!("CARGO_PKG_VERSION"));

    let peripherals = Peripherals::take().context("take peripherals")?;

    // ── VESC UART ─────────────────────────────────────────────
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio16,
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(VESC_UART_BAUD)),
    )
    .context("init VESC uart")?;

    // ── Output hardware ───────────────────────────────────────
    let ledc_timer = LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::default().frequency(Hertz(1000)),
    )
    .context("init ledc timer")?;
    let headlight = LedcHeadlight::new(
        LedcDriver::new(
            peripherals.ledc.channel0,
            &ledc_timer,
            peripherals.pins.gpio4,
        )
        .context("init headlight pwm")?,
    );
    let status = PwmStatusLed::new(
        LedcDriver::new(
            peripherals.ledc.channel1,
            &ledc_timer,
            peripherals.pins.gpio5,
        )
        .context("init status pwm")?,
    );
    let buzzer = GpioBuzzer::new(
        PinDriver::output(esp_idf_hal::gpio::AnyOutputPin::from(
            peripherals.pins.gpio18,
        ))
        .context("init buzzer pin")?,
    );

    // ── Settings ──────────────────────────────────────────────
    let settings = match open_settings_nvs().and_then(NvsSettings::new) {
        Ok(store) => store.get(),
        Err(e) => {
            warn!("settings unavailable ({e}), using defaults");
            Settings::default()
        }
    };

    let observer = LightsObserver::new(headlight, status, buzzer, settings);

    // ── Core ──────────────────────────────────────────────────
    let config = SystemConfig::default();
    let system: Arc<Mutex<CoreSystem>> = Arc::new(Mutex::new(
        boardlcm::System::new(&config, VescUart::new(uart), observer)
            .map_err(|e| anyhow::anyhow!("core init: {e}"))?,
    ));

    // 1 ms tick thread. A dedicated hardware timer would be tighter; the
    // timer resolution the core needs is coarse enough for a thread.
    {
        let system = Arc::clone(&system);
        thread::Builder::new()
            .name("tick".into())
            .stack_size(2048)
            .spawn(move || loop {
                thread::sleep(Duration::from_millis(1));
                if let Ok(mut sys) = system.lock() {
                    sys.tick();
                }
            })
            .context("spawn tick thread")?;
    }

    // UART reader thread: drain the FIFO, hand bytes to the decoder.
    {
        let system = Arc::clone(&system);
        thread::Builder::new()
            .name("vesc-rx".into())
            .stack_size(4096)
            .spawn(move || {
                let mut buf = [0u8; 64];
                loop {
                    thread::sleep(Duration::from_millis(5));
                    let Ok(mut sys) = system.lock() else { continue };
                    let n = sys.vesc_transport_mut().read_pending(&mut buf);
                    if n > 0 {
                        sys.serial_rx(&buf[..n]);
                    }
                }
            })
            .context("spawn uart thread")?;
    }

    system
        .lock()
        .map_err(|_| anyhow::anyhow!("core mutex poisoned"))?
        .boot()
        .map_err(|e| anyhow::anyhow!("boot: {e}"))?;

    // ── Main pump ─────────────────────────────────────────────
    //
    // Keeps pumping under fault conditions: a mid-ride reset could cut
    // power to safety-relevant outputs, so errors are logged, not fatal.
    loop {
        match system.lock() {
            Ok(mut sys) => sys.run_pending(),
            Err(_) => {
                error!("core mutex poisoned, events no longer processed");
                break;
            }
        }
        thread::sleep(Duration::from_millis(1));
    }

    Ok(())
}
