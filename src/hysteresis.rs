//! Two-threshold hysteresis latch.
//!
//! Used wherever a noisy analogue quantity drives a binary decision: riding
//! submode selection compares duty cycle and RPM against thresholds, and a
//! plain comparison would flicker between states when the value hovers at
//! the boundary. The latch only sets once the value reaches
//! `set_threshold` and only resets once it falls below `reset_threshold`,
//! with `set_threshold >= reset_threshold` enforced at construction.

use crate::error::{Error, Result};

/// Reported latch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    /// Value has not reached the set threshold since the last reset.
    Reset,
    /// Value reached the set threshold and has not yet dropped below the
    /// reset threshold.
    Set,
}

/// A two-threshold latch over `f32` samples.
#[derive(Debug, Clone, Copy)]
pub struct Hysteresis {
    state: LatchState,
    set_threshold: f32,
    reset_threshold: f32,
}

impl Hysteresis {
    /// Construct a latch in the `Reset` state.
    ///
    /// Fails if the thresholds are inverted, which would make the latch
    /// oscillate — exactly what it exists to prevent.
    pub fn new(set_threshold: f32, reset_threshold: f32) -> Result<Self> {
        if set_threshold < reset_threshold {
            return Err(Error::Config("hysteresis thresholds inverted"));
        }
        Ok(Self {
            state: LatchState::Reset,
            set_threshold,
            reset_threshold,
        })
    }

    /// Feed one sample; returns the (possibly updated) state.
    pub fn apply(&mut self, value: f32) -> LatchState {
        match self.state {
            LatchState::Reset if value >= self.set_threshold => {
                self.state = LatchState::Set;
            }
            LatchState::Set if value < self.reset_threshold => {
                self.state = LatchState::Reset;
            }
            _ => {}
        }
        self.state
    }

    /// Current state without feeding a sample.
    pub fn state(&self) -> LatchState {
        self.state
    }
}
