//! System configuration parameters.
//!
//! All tunable parameters for the light control module. Defaults match the
//! values the board ships with; a settings front-end may override individual
//! fields before the core is constructed.

use serde::{Deserialize, Serialize};

/// Core system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Idle stage timeouts ---
    /// Time in IDLE/ACTIVE before dropping to the default idle stage (ms).
    pub idle_active_timeout_ms: u32,
    /// Time in IDLE/DEFAULT before dozing (ms).
    pub idle_default_timeout_ms: u32,
    /// Time in IDLE/DOZING before starting shutdown (ms).
    pub idle_dozing_timeout_ms: u32,
    /// Window in IDLE/SHUTTING_DOWN during which shutdown can be aborted (ms).
    pub idle_shutdown_timeout_ms: u32,

    // --- Ride thresholds ---
    /// |ERPM| above which the board counts as moving at all.
    pub stopped_rpm_threshold: f32,
    /// |ERPM| above which the board counts as riding at normal speed
    /// (roughly 3-4 MPH on a stock wheel).
    pub slow_rpm_threshold: f32,
    /// Duty cycle (%) that enters the WARNING riding submode.
    pub duty_warning_threshold: f32,
    /// Duty cycle (%) that enters the DANGER riding submode.
    pub duty_danger_threshold: f32,

    // --- Roll sensing ---
    /// Whether IMU roll events participate in board-mode decisions.
    pub roll_sensing_enabled: bool,
    /// |roll| in degrees beyond which the board counts as lying on its side.
    pub roll_doze_threshold_deg: f32,

    // --- Motor controller link ---
    /// Telemetry poll interval (ms).
    pub vesc_poll_interval_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Idle chain: 4 s active, 2 min default, 8 min dozing,
            // 1 s to abort shutdown.
            idle_active_timeout_ms: 4 * 1000,
            idle_default_timeout_ms: 2 * 60 * 1000,
            idle_dozing_timeout_ms: 8 * 60 * 1000,
            idle_shutdown_timeout_ms: 1000,

            stopped_rpm_threshold: 20.0,
            slow_rpm_threshold: 2000.0,
            duty_warning_threshold: 80.0,
            duty_danger_threshold: 90.0,

            roll_sensing_enabled: true,
            roll_doze_threshold_deg: 45.0,

            vesc_poll_interval_ms: 250,
        }
    }
}
