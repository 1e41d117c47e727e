//! Motor-controller telemetry link.
//!
//! Consumes the interrupt-fed byte ring when the UART reports line-idle,
//! extracts and validates frames, decodes the selective-values telemetry
//! response, and publishes a change event per field that actually moved.
//! Owns a repeating poll timer, armed only while the board is in a mode
//! that needs live telemetry.
//!
//! Everything arriving on the wire is untrusted: declared lengths, the
//! echoed field mask, and every decoded value are checked before any
//! retained state mutates. A frame failing any check mutates nothing.

pub mod crc;
pub mod frame;
pub mod ring;

use log::{debug, info, trace, warn};

use crate::board_mode::BoardMode;
use crate::bus::EventBus;
use crate::config::SystemConfig;
use crate::error::FaultCode;
use crate::events::{Event, EventKind, EventPayload};
use crate::ports::VescTransport;
use crate::timers::{TimerHandler, TimerId, TimerPool};

use self::frame::{
    extract_frame, read_i16_be, read_u32_be, FrameError, Payload, CMD_GET_VALUES_SELECTIVE,
    POLL_FRAME, TELEMETRY_MASK, TELEMETRY_RESPONSE_LEN,
};
use self::ring::ByteRing;

/// Unanswered polls tolerated before declaring the link dead.
pub const MAX_OUTSTANDING_POLLS: u8 = 5;

/// Largest |ERPM| a sane controller reports on this hardware.
const RPM_PLAUSIBLE_BOUND: i32 = 25_000;

/// Last known good telemetry values. Change events are published against
/// these, so repeated identical frames stay silent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Telemetry {
    pub duty_cycle: f32,
    pub rpm: i32,
    pub battery_level: f32,
    pub fault_code: u8,
}

/// The serial decoder and poll driver, generic over the byte transport.
#[derive(Debug)]
pub struct VescSerial<T> {
    transport: T,
    rx: ByteRing,
    telemetry: Telemetry,
    alive: bool,
    outstanding: u8,
    poll_timer: TimerId,
    poll_interval_ms: u32,
}

impl<T: VescTransport> VescSerial<T> {
    pub fn new(transport: T, config: &SystemConfig) -> Self {
        Self {
            transport,
            rx: ByteRing::new(),
            telemetry: Telemetry::default(),
            alive: false,
            outstanding: 0,
            poll_timer: TimerId::INVALID,
            poll_interval_ms: config.vesc_poll_interval_ms,
        }
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Feed received bytes into the ring. The driver layer calls this from
    /// its receive path; bytes that do not fit are dropped and the frame
    /// they belonged to will fail its CRC.
    pub fn rx_bytes(&mut self, bytes: &[u8]) {
        if self.rx.push_slice(bytes).is_err() {
            warn!("serial rx ring overflow, dropping {} bytes", bytes.len());
        }
    }

    /// Bus event entry point.
    pub fn handle_event<H: Copy + Eq>(
        &mut self,
        event: &Event,
        bus: &mut EventBus<H>,
        timers: &mut TimerPool,
    ) {
        match event.kind {
            EventKind::SerialDataRx => self.process_rx(bus),
            EventKind::BoardModeChanged => {
                if let EventPayload::BoardMode(change) = event.payload {
                    self.mode_changed(change.mode, bus, timers);
                }
            }
            _ => {}
        }
    }

    /// Poll-timer expiry: give up on the link if too many polls went
    /// unanswered, then send the next request.
    pub fn poll_timer_expired<H: Copy + Eq>(&mut self, bus: &mut EventBus<H>) {
        if self.outstanding >= MAX_OUTSTANDING_POLLS {
            warn!("VESC stopped answering ({} polls outstanding)", self.outstanding);
            self.alive = false;
            self.outstanding = 0;
            bus.fault(FaultCode::VescCommTimeout);
        }
        if let Err(e) = self.transport.send(&POLL_FRAME) {
            warn!("poll send failed: {e}");
            return;
        }
        self.outstanding += 1;
        trace!("telemetry poll sent ({} outstanding)", self.outstanding);
    }

    /// Arm or cancel the poll timer to track the board mode. Telemetry is
    /// only needed while the board could be ridden.
    fn mode_changed<H: Copy + Eq>(
        &mut self,
        mode: BoardMode,
        bus: &mut EventBus<H>,
        timers: &mut TimerPool,
    ) {
        let wants_polling = matches!(
            mode,
            BoardMode::Booting | BoardMode::Idle | BoardMode::Riding
        );
        if wants_polling {
            if !timers.is_active(self.poll_timer) {
                self.poll_timer =
                    timers.set_or_fault(bus, TimerHandler::VescPoll, self.poll_interval_ms, true);
            }
        } else {
            let _ = timers.cancel(self.poll_timer);
            self.poll_timer = TimerId::INVALID;
            self.alive = false;
            self.outstanding = 0;
        }
    }

    /// Drain every complete frame currently buffered.
    fn process_rx<H: Copy + Eq>(&mut self, bus: &mut EventBus<H>) {
        loop {
            match extract_frame(&mut self.rx) {
                Ok(Some(payload)) => self.decode(&payload, bus),
                Ok(None) => return,
                Err(FrameError::OversizeLength) => {
                    // A length the protocol cannot produce means we are not
                    // talking to the firmware we think we are.
                    bus.fault(FaultCode::InvalidLength);
                    return;
                }
            }
        }
    }

    fn decode<H: Copy + Eq>(&mut self, payload: &Payload, bus: &mut EventBus<H>) {
        // Any CRC-valid frame proves the controller is answering, whatever
        // command it carries and whether its body survives validation.
        self.outstanding = 0;
        if !self.alive {
            self.alive = true;
            info!("VESC alive");
            let _ = bus.push(EventKind::VescAlive, EventPayload::None);
        }

        match payload.first() {
            Some(&CMD_GET_VALUES_SELECTIVE) => self.decode_telemetry(payload, bus),
            Some(cmd) => debug!("ignoring unexpected command 0x{cmd:02x}"),
            None => {}
        }
    }

    /// Decode a selective-values response. Validates everything before
    /// mutating anything.
    fn decode_telemetry<H: Copy + Eq>(&mut self, payload: &Payload, bus: &mut EventBus<H>) {
        if payload.len() != TELEMETRY_RESPONSE_LEN {
            warn!("telemetry response has length {}", payload.len());
            bus.fault(FaultCode::InvalidLength);
            return;
        }
        let mask = read_u32_be(&payload[1..5]);
        if mask != TELEMETRY_MASK {
            warn!("telemetry mask 0x{mask:08x} does not match request");
            bus.fault(FaultCode::OutOfBounds);
            return;
        }

        let duty_cycle = read_i16_be(&payload[5..7]) as f32 / 10.0;
        let rpm = frame::read_i32_be(&payload[7..11]);
        let battery_level = read_i16_be(&payload[13..15]) as f32 / 10.0;
        let fault_code = payload[15];

        if !(-100.0..=100.0).contains(&duty_cycle)
            || rpm.abs() > RPM_PLAUSIBLE_BOUND
            || !(0.0..=100.0).contains(&battery_level)
        {
            warn!("telemetry out of range: duty={duty_cycle} rpm={rpm} batt={battery_level}");
            bus.fault(FaultCode::OutOfBounds);
            return;
        }

        if duty_cycle != self.telemetry.duty_cycle {
            self.telemetry.duty_cycle = duty_cycle;
            let _ = bus.push(
                EventKind::DutyCycleChanged,
                EventPayload::DutyCycle(duty_cycle),
            );
        }
        if rpm != self.telemetry.rpm {
            self.telemetry.rpm = rpm;
            let _ = bus.push(EventKind::RpmChanged, EventPayload::Rpm(rpm));
        }
        if battery_level != self.telemetry.battery_level {
            self.telemetry.battery_level = battery_level;
            let _ = bus.push(
                EventKind::BatteryLevelChanged,
                EventPayload::BatteryLevel(battery_level),
            );
        }
        if fault_code != self.telemetry.fault_code {
            self.telemetry.fault_code = fault_code;
            if fault_code != 0 {
                warn!("VESC reports fault {fault_code}");
                bus.fault(FaultCode::Vesc);
            }
        }
    }
}
