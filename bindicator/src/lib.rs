/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Bindicator – bin-collection reminder for a one-button, two-LED device
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── output.rs       – Rgb levels, Pwm pins, RgbOutput triple
//! ├── pattern/        – Pattern trait + stock LED effects
//! ├── channel/        – priority-preemptive pattern scheduler per LED
//! ├── deferred/       – time-ordered one-shot job queue
//! ├── gesture/        – single / double / long-hold button classification
//! ├── clock.rs        – local-hour deadlines on the tokio clock
//! ├── config/         – YAML device configuration
//! ├── provider.rs     – bin-date sources
//! └── jobs/           – heartbeat, refresh, display window, gestures
//! ```

pub mod channel;
pub mod clock;
pub mod config;
pub mod deferred;
pub mod gesture;
pub mod jobs;
pub mod output;
pub mod pattern;
pub mod provider;
