/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Resumable LED patterns.
//!
//! A pattern is an explicit state object that is advanced one step at a
//! time by a [`PatternChannel`](crate::channel::PatternChannel).  Each step
//! yields exactly one [`Frame`]: the intensity triple to show, how long to
//! hold it, and whether the pattern has more steps to give.
//!
//! ```text
//! channel loop ──advance()──► Pattern ──Frame{level, hold, progress}──► channel
//!      │                                                                  │
//!      └─────────────── apply(level); sleep(hold); Done → remove ◄────────┘
//! ```
//!
//! Patterns never touch the output or the channel themselves.  Identity and
//! priority belong to the channel's registry entry, not to the pattern.

pub mod effects;

pub use effects::Effect;

use std::time::Duration;

use crate::channel::error::PatternFault;
use crate::output::Rgb;

/// Whether a pattern wants to be resumed again after the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    /// This was the final frame; the channel removes the pattern.
    Done,
}

/// The single observable output action produced by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub level: Rgb,
    /// Bounded pacing delay after the level is applied.
    ///
    /// The whole channel waits out this hold before evaluating again.
    pub hold: Duration,
    pub progress: Progress,
}

impl Frame {
    pub fn next(level: Rgb, hold: Duration) -> Self {
        Self {
            level,
            hold,
            progress: Progress::Continue,
        }
    }

    pub fn last(level: Rgb, hold: Duration) -> Self {
        Self {
            level,
            hold,
            progress: Progress::Done,
        }
    }
}

/// A resumable effect driven by a channel.
///
/// `advance` is called with the channel's registry lock held, so it must be
/// quick and must not block or call back into the channel.  Pacing is
/// expressed through [`Frame::hold`] instead.
pub trait Pattern: Send {
    fn advance(&mut self) -> Result<Frame, PatternFault>;

    /// Short name for log lines.
    fn kind(&self) -> &'static str {
        "custom"
    }
}

impl<P: Pattern + ?Sized> Pattern for Box<P> {
    fn advance(&mut self) -> Result<Frame, PatternFault> {
        (**self).advance()
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}
