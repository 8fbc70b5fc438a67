/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wall-clock helpers.
//!
//! The deferred queue runs on the monotonic tokio clock; jobs that must run
//! at a local hour of the day convert that hour into a delay here.

use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime};
use tokio::time::Instant;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Delay from `now` until the next `hour:00:00` strictly after `now`.
///
/// Hours above 23 are treated as 23.
pub fn until_next_hour(now: NaiveDateTime, hour: u32) -> Duration {
    let Some(today) = now.date().and_hms_opt(hour.min(23), 0, 0) else {
        return DAY;
    };
    let target = if today <= now {
        today + chrono::Duration::days(1)
    } else {
        today
    };
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Monotonic deadline for the next local `hour:00:00`.
pub fn next_hour_deadline(hour: u32) -> Instant {
    Instant::now() + until_next_hour(Local::now().naive_local(), hour)
}

/// Current local hour of day (0–23).
pub fn local_hour() -> u32 {
    use chrono::Timelike;
    Local::now().hour()
}

/// Whole days from `today` until `date` (negative if `date` has passed).
pub fn days_between(today: NaiveDate, date: NaiveDate) -> i64 {
    (date - today).num_days()
}
