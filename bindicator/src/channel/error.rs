/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the pattern channels.
//!
//! [`OutputError`] is raised by the PWM driver when a duty-cycle write fails
//! and names the pin.  [`PatternFault`] covers one failed pattern step,
//! whether the pattern itself broke or its frame could not be written out.
//!
//! Neither escapes the channel loop: a fault is logged and handled
//! according to the channel's [`FaultPolicy`](super::FaultPolicy).

use thiserror::Error;

// ── Output driver ─────────────────────────────────────────────────────────────

/// A duty-cycle write that the output driver could not perform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    /// The driver reported a failure for `pin` (bus error, pin released, …).
    #[error("PWM pin {pin} rejected duty write: {message}")]
    Driver { pin: u8, message: String },
}

// ── Pattern step faults ───────────────────────────────────────────────────────

/// Why a single pattern step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternFault {
    /// The pattern produced a frame with a component above 100.
    #[error("frame level ({r}, {g}, {b}) is outside 0..=100")]
    LevelOutOfRange { r: u8, g: u8, b: u8 },

    /// The frame could not be written to the output triple.
    #[error("output failed: {0}")]
    Output(#[from] OutputError),

    /// Pattern-specific failure.
    #[error("{0}")]
    Step(String),
}
