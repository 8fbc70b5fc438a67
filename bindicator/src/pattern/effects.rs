/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Built-in effects used by the device.
//!
//! | Effect | Frames | Finishes |
//! |---|---|---|
//! | `Solid` | level, 100 ms | never |
//! | `Pulse` | 0→100→0 % of the colour in 5 % steps, 20 ms each | never |
//! | `Blink` | on / off, `period` each, `cycles` times | after the last off |
//! | `Countdown` | reveal 2 s, then one 300 ms off/on flash per day, then off | yes |
//! | `Heartbeat` | dim green 100 ms, then off | yes |
//! | `Flicker` | level / off, 50 ms each | never |

use std::time::Duration;

use super::{Frame, Pattern};
use crate::channel::error::PatternFault;
use crate::output::Rgb;

const SOLID_REFRESH: Duration = Duration::from_millis(100);
const PULSE_STEP: Duration = Duration::from_millis(20);
const PULSE_INCREMENT: u8 = 5;
const REVEAL_HOLD: Duration = Duration::from_secs(2);
const COUNTDOWN_FLASH: Duration = Duration::from_millis(300);
const HEARTBEAT_HOLD: Duration = Duration::from_millis(100);
const HEARTBEAT_LEVEL: Rgb = Rgb::new(0, 4, 0);
const FLICKER_HOLD: Duration = Duration::from_millis(50);

/// Where a [`Effect::Countdown`] is in its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownPhase {
    Reveal,
    Dark,
    Lit,
    Finish,
}

/// Tagged variant over every pattern kind the device knows.
///
/// Each variant carries its own progression state; constructing a new value
/// always starts from the first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Solid {
        level: Rgb,
    },
    Pulse {
        colour: Rgb,
        brightness: u8,
        rising: bool,
    },
    Blink {
        level: Rgb,
        period: Duration,
        cycles_left: u32,
        next_on: bool,
    },
    Countdown {
        level: Rgb,
        flashes_left: u32,
        phase: CountdownPhase,
    },
    Heartbeat {
        beat_shown: bool,
    },
    Flicker {
        level: Rgb,
        lit: bool,
    },
}

impl Effect {
    pub fn solid(level: Rgb) -> Self {
        Effect::Solid { level }
    }

    pub fn off() -> Self {
        Effect::Solid { level: Rgb::OFF }
    }

    pub fn pulse(colour: Rgb) -> Self {
        Effect::Pulse {
            colour,
            brightness: 0,
            rising: true,
        }
    }

    pub fn blink(level: Rgb, period: Duration, cycles: u32) -> Self {
        Effect::Blink {
            level,
            period,
            cycles_left: cycles,
            next_on: true,
        }
    }

    /// Three slow green blinks.
    pub fn success() -> Self {
        Self::blink(Rgb::new(0, 30, 0), Duration::from_millis(500), 3)
    }

    /// Three slow red blinks.
    pub fn error() -> Self {
        Self::blink(Rgb::new(30, 0, 0), Duration::from_millis(500), 3)
    }

    /// Four quick full-blue flashes.
    pub fn alert() -> Self {
        Self::blink(Rgb::BLUE, Duration::from_millis(100), 4)
    }

    /// Show `level`, then flash it once per day until collection.
    pub fn countdown(level: Rgb, days: u32) -> Self {
        Effect::Countdown {
            level,
            flashes_left: days,
            phase: CountdownPhase::Reveal,
        }
    }

    pub fn heartbeat() -> Self {
        Effect::Heartbeat { beat_shown: false }
    }

    pub fn flicker(level: Rgb) -> Self {
        Effect::Flicker { level, lit: false }
    }

    /// Dim blue flicker shown while the bin dates are being refreshed.
    pub fn web_activity() -> Self {
        Self::flicker(Rgb::new(0, 0, 10))
    }
}

impl Pattern for Effect {
    fn kind(&self) -> &'static str {
        match self {
            Effect::Solid { .. } => "solid",
            Effect::Pulse { .. } => "pulse",
            Effect::Blink { .. } => "blink",
            Effect::Countdown { .. } => "countdown",
            Effect::Heartbeat { .. } => "heartbeat",
            Effect::Flicker { .. } => "flicker",
        }
    }

    fn advance(&mut self) -> Result<Frame, PatternFault> {
        let frame = match self {
            Effect::Solid { level } => Frame::next(*level, SOLID_REFRESH),

            Effect::Pulse {
                colour,
                brightness,
                rising,
            } => {
                let frame = Frame::next(colour.scaled(*brightness), PULSE_STEP);
                if *rising {
                    *brightness = brightness.saturating_add(PULSE_INCREMENT).min(100);
                    if *brightness >= 100 {
                        *rising = false;
                    }
                } else {
                    *brightness = brightness.saturating_sub(PULSE_INCREMENT);
                    if *brightness == 0 {
                        *rising = true;
                    }
                }
                frame
            }

            Effect::Blink {
                level,
                period,
                cycles_left,
                next_on,
            } => {
                if *cycles_left == 0 {
                    Frame::last(Rgb::OFF, Duration::ZERO)
                } else if *next_on {
                    *next_on = false;
                    Frame::next(*level, *period)
                } else {
                    *next_on = true;
                    *cycles_left -= 1;
                    if *cycles_left == 0 {
                        Frame::last(Rgb::OFF, *period)
                    } else {
                        Frame::next(Rgb::OFF, *period)
                    }
                }
            }

            Effect::Countdown {
                level,
                flashes_left,
                phase,
            } => match *phase {
                CountdownPhase::Reveal => {
                    *phase = if *flashes_left > 0 {
                        CountdownPhase::Dark
                    } else {
                        CountdownPhase::Finish
                    };
                    Frame::next(*level, REVEAL_HOLD)
                }
                CountdownPhase::Dark => {
                    *phase = CountdownPhase::Lit;
                    Frame::next(Rgb::OFF, COUNTDOWN_FLASH)
                }
                CountdownPhase::Lit => {
                    *flashes_left = flashes_left.saturating_sub(1);
                    *phase = if *flashes_left > 0 {
                        CountdownPhase::Dark
                    } else {
                        CountdownPhase::Finish
                    };
                    Frame::next(*level, COUNTDOWN_FLASH)
                }
                CountdownPhase::Finish => Frame::last(Rgb::OFF, Duration::ZERO),
            },

            Effect::Heartbeat { beat_shown } => {
                if *beat_shown {
                    Frame::last(Rgb::OFF, Duration::ZERO)
                } else {
                    *beat_shown = true;
                    Frame::next(HEARTBEAT_LEVEL, HEARTBEAT_HOLD)
                }
            }

            Effect::Flicker { level, lit } => {
                *lit = !*lit;
                let shown = if *lit { *level } else { Rgb::OFF };
                Frame::next(shown, FLICKER_HOLD)
            }
        };
        Ok(frame)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
