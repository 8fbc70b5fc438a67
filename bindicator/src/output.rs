/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Physical output triple.
//!
//! An LED on the device is three PWM pins (R, G, B) driven as one unit.
//! Patterns and channels only ever talk in 0–100 intensity values; the
//! conversion to a duty cycle (including the per-pin inversion used by
//! common-anode wiring) happens here and nowhere else.
//!
//! ```text
//! Frame.level (Rgb 0..=100) ──► RgbOutput::apply ──► [Pwm; 3]::set_duty
//!                                  │
//!                                  └─ inverted pin → 100 − value
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tracing::trace;

use crate::channel::error::OutputError;

/// Largest accepted intensity / duty value.
pub const MAX_LEVEL: u8 = 100;

// ── Rgb ───────────────────────────────────────────────────────────────────────

/// Three 0–100 intensity values, one per colour pin.
///
/// Deserialises from a YAML sequence `[r, g, b]` so `bin_colours` entries
/// map straight onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(100, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 100, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 100);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale every component by `percent` / 100, used by the pulse effect.
    pub fn scaled(self, percent: u8) -> Self {
        let p = u16::from(percent.min(MAX_LEVEL));
        let scale = |v: u8| ((u16::from(v) * p) / u16::from(MAX_LEVEL)) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }

    /// Returns `true` if any component exceeds [`MAX_LEVEL`].
    pub fn out_of_range(self) -> bool {
        self.r > MAX_LEVEL || self.g > MAX_LEVEL || self.b > MAX_LEVEL
    }

    fn components(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

// ── Pwm ───────────────────────────────────────────────────────────────────────

/// One PWM-capable pin of the output driver.
///
/// The real driver lives outside this crate; anything that can
/// accept a 0–100 duty cycle qualifies.
pub trait Pwm: Send + Sync {
    fn set_duty(&self, duty: u8) -> Result<(), OutputError>;
}

/// Host stand-in for a PWM pin: logs every change and remembers the last duty.
#[derive(Debug)]
pub struct MockPwm {
    pin: u8,
    duty: AtomicU8,
}

impl MockPwm {
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            duty: AtomicU8::new(0),
        }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// The most recently written duty cycle.
    pub fn duty(&self) -> u8 {
        self.duty.load(Ordering::SeqCst)
    }
}

impl Pwm for MockPwm {
    fn set_duty(&self, duty: u8) -> Result<(), OutputError> {
        let prev = self.duty.swap(duty, Ordering::SeqCst);
        if prev != duty {
            trace!(pin = self.pin, duty, "duty cycle changed");
        }
        Ok(())
    }
}

// ── RgbOutput ─────────────────────────────────────────────────────────────────

/// Three PWM pins plus their inversion flags.
pub struct RgbOutput {
    pins: [Arc<dyn Pwm>; 3],
    inverted: [bool; 3],
}

impl std::fmt::Debug for RgbOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgbOutput")
            .field("inverted", &self.inverted)
            .finish_non_exhaustive()
    }
}

impl RgbOutput {
    pub fn new(pins: [Arc<dyn Pwm>; 3], inverted: [bool; 3]) -> Self {
        Self { pins, inverted }
    }

    /// Build an output backed by three [`MockPwm`] pins, returning the pins
    /// so the caller can observe what was written.
    pub fn mock(pin_numbers: [u8; 3], inverted: [bool; 3]) -> (Self, [Arc<MockPwm>; 3]) {
        let mocks = pin_numbers.map(|pin| Arc::new(MockPwm::new(pin)));
        let pins: [Arc<dyn Pwm>; 3] = [
            mocks[0].clone(),
            mocks[1].clone(),
            mocks[2].clone(),
        ];
        (Self::new(pins, inverted), mocks)
    }

    /// Write an intensity triple to the pins.
    ///
    /// Values above [`MAX_LEVEL`] are clamped; inverted pins receive
    /// `100 − value`.  Stops at the first pin that fails.
    pub fn apply(&self, level: Rgb) -> Result<(), OutputError> {
        for ((pin, inverted), value) in self
            .pins
            .iter()
            .zip(self.inverted)
            .zip(level.components())
        {
            let value = value.min(MAX_LEVEL);
            let duty = if inverted { MAX_LEVEL - value } else { value };
            pin.set_duty(duty)?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
