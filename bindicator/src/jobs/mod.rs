/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Device behaviour built on the three primitives.
//!
//! [`Device`] owns handles to the status and bin [`PatternChannel`]s, the
//! [`TaskScheduler`] and the [`BinDateProvider`], and passes itself to every
//! job it schedules.  There is no global state.
//!
//! ```text
//! TaskScheduler ──► heartbeat ─────────────► status: "heartbeat"
//!               ──► refresh ──► provider ──► status: "web_activity" / "success" / "error"
//!               │                 └────────► render ──► bins: "bin"
//!               ──► display on/off ────────► render
//! Debouncer ──► SinglePress ──► bins: "next_bin" countdown + manual wake
//!           ──► DoubleTap  ──► toggle visibility ──► render
//!           ──► LongHold   ──► status: "alert" + refresh now
//! ```
//!
//! # Channel layout
//!
//! | Channel | id | priority | effect |
//! |---|---|---|---|
//! | status | `heartbeat` | 1 | [`Effect::heartbeat`], every `heartbeat_interval` |
//! | status | `web_activity` | 5 | flicker while fetching |
//! | status | `success` | 6 | three green blinks after a good refresh |
//! | status | `alert` | 7 | four blue flashes on long-hold |
//! | status | `error` | 8 | three red blinks after a failed refresh |
//! | bins | `off` | 0 | dark baseline, always present |
//! | bins | `bin` | 1 | soonest bin colour, or red pulse when there is no data |
//! | bins | `next_bin` | 10 | countdown flashes on single-press |
//!
//! Both channels use the `Replace` push discipline; layering relies on
//! priorities and on finite effects removing themselves.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::PatternChannel;
use crate::clock;
use crate::config::Config;
use crate::deferred::TaskScheduler;
use crate::gesture::{Gesture, GestureHandler};
use crate::output::Rgb;
use crate::pattern::Effect;
use crate::provider::{soonest, BinDateProvider, BinDates};

// ── Pattern ids and priorities ────────────────────────────────────────────────

pub const HEARTBEAT: (&str, i32) = ("heartbeat", 1);
pub const WEB_ACTIVITY: (&str, i32) = ("web_activity", 5);
pub const SUCCESS: (&str, i32) = ("success", 6);
pub const ALERT: (&str, i32) = ("alert", 7);
pub const ERROR: (&str, i32) = ("error", 8);

pub const BIN_OFF: (&str, i32) = ("off", 0);
pub const BIN: (&str, i32) = ("bin", 1);
pub const NEXT_BIN: (&str, i32) = ("next_bin", 10);

/// Delay before the first heartbeat after start-up.
const FIRST_HEARTBEAT: Duration = Duration::from_secs(1);
/// Delay before the first refresh after start-up.
const FIRST_REFRESH: Duration = Duration::from_secs(2);

// ── Shared state ──────────────────────────────────────────────────────────────

/// Mutable state shared by the jobs.  Guarded by one mutex that no job
/// holds across an `.await` or a channel call.
#[derive(Debug, Clone, Default)]
pub struct BinState {
    /// Latest dates from the provider; empty until a refresh succeeds.
    pub dates: BinDates,
    /// Inside the configured display hours.
    pub display_window: bool,
    /// User toggle (double-tap).
    pub user_visible: bool,
    /// A single press lights the indicator until this instant.
    pub wake_until: Option<Instant>,
    /// Bumped when a refresh chain is superseded by a manual refresh.
    pub refresh_generation: u64,
}

impl BinState {
    fn visible(&self, now: Instant) -> bool {
        (self.display_window && self.user_visible) || self.wake_until.is_some_and(|t| now < t)
    }
}

struct Inner {
    config: Config,
    status: PatternChannel,
    bins: PatternChannel,
    scheduler: TaskScheduler,
    provider: Arc<dyn BinDateProvider>,
    state: Mutex<BinState>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
}

// ── Device ────────────────────────────────────────────────────────────────────

/// The notification device: configuration, both LEDs, the job queue and the
/// date source.  Cheap to clone; jobs capture a clone.
#[derive(Clone)]
pub struct Device {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("status", &self.inner.status)
            .field("bins", &self.inner.bins)
            .field("scheduler", &self.inner.scheduler)
            .finish_non_exhaustive()
    }
}

impl Device {
    pub fn new(
        config: Config,
        status: PatternChannel,
        bins: PatternChannel,
        scheduler: TaskScheduler,
        provider: Arc<dyn BinDateProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                status,
                bins,
                scheduler,
                provider,
                state: Mutex::new(BinState {
                    user_visible: true,
                    ..BinState::default()
                }),
                scheduler_task: Mutex::new(None),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, BinState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn status(&self) -> &PatternChannel {
        &self.inner.status
    }

    pub fn bins(&self) -> &PatternChannel {
        &self.inner.bins
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.inner.scheduler
    }

    /// Copy of the shared job state.
    pub fn snapshot(&self) -> BinState {
        self.state().clone()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Start both channels and the job queue, using the current local hour
    /// to decide whether the display window is open.
    pub fn start(&self) {
        self.start_at_hour(clock::local_hour());
    }

    /// As [`start`](Self::start), with an explicit current hour.
    pub fn start_at_hour(&self, hour: u32) {
        let cfg = &self.inner.config;
        let window = cfg.in_display_window(hour);
        self.state().display_window = window;
        info!(hour, display_window = window, "device starting");

        self.inner.bins.push(BIN_OFF.0, BIN_OFF.1, Effect::off());
        self.inner.status.spawn();
        self.inner.bins.spawn();

        self.schedule_heartbeat(FIRST_HEARTBEAT);
        let generation = self.state().refresh_generation;
        self.schedule_refresh(Instant::now() + FIRST_REFRESH, generation);
        self.schedule_display_on();
        self.schedule_display_off();
        self.render();

        let handle = self.inner.scheduler.spawn();
        *self
            .inner
            .scheduler_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Stop the job queue and both channels, leaving both LEDs dark.
    pub async fn shutdown(&self) {
        self.inner.scheduler.stop();
        let handle = self
            .inner
            .scheduler_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "deferred scheduler ended abnormally");
            }
        }

        for channel in [&self.inner.status, &self.inner.bins] {
            channel.stop().await;
            channel.clear();
            if let Err(err) = channel.blank() {
                warn!(channel = channel.name(), error = %err, "could not blank output");
            }
        }
        info!("device stopped");
    }

    // ── Heartbeat ─────────────────────────────────────────────────────────────

    fn schedule_heartbeat(&self, delay: Duration) {
        let device = self.clone();
        self.inner
            .scheduler
            .schedule_in(delay, "heartbeat", move || device.heartbeat());
    }

    async fn heartbeat(self) {
        self.inner
            .status
            .push(HEARTBEAT.0, HEARTBEAT.1, Effect::heartbeat());
        self.schedule_heartbeat(self.inner.config.heartbeat_interval);
    }

    // ── Refresh ───────────────────────────────────────────────────────────────

    /// Queue a refresh belonging to the chain `generation`.
    fn schedule_refresh(&self, due: Instant, generation: u64) {
        let device = self.clone();
        self.inner
            .scheduler
            .schedule(due, "refresh", move || device.refresh(generation));
    }

    /// Supersede any pending refresh and fetch as soon as possible.
    pub fn refresh_now(&self) {
        let generation = {
            let mut st = self.state();
            st.refresh_generation += 1;
            st.refresh_generation
        };
        info!(generation, "manual refresh requested");
        self.schedule_refresh(Instant::now(), generation);
    }

    async fn refresh(self, generation: u64) {
        if self.state().refresh_generation != generation {
            debug!(generation, "refresh superseded, skipping");
            return;
        }

        let status = &self.inner.status;
        status.push(WEB_ACTIVITY.0, WEB_ACTIVITY.1, Effect::web_activity());
        info!("refreshing bin dates");

        let provider = Arc::clone(&self.inner.provider);
        let dates = match tokio::task::spawn_blocking(move || provider.fetch()).await {
            Ok(dates) => dates,
            Err(err) => {
                warn!(error = %err, "bin date provider crashed");
                BinDates::new()
            }
        };
        status.remove(WEB_ACTIVITY.0);

        let cfg = &self.inner.config;
        let next_due = if dates.is_empty() {
            warn!(
                retry_min = cfg.short_timeout.as_secs() / 60,
                "no bin dates available, retrying later"
            );
            status.push(ERROR.0, ERROR.1, Effect::error());
            Instant::now() + cfg.short_timeout
        } else {
            info!(bins = dates.len(), next_hour = cfg.poll_web, "bin dates refreshed");
            status.remove(ERROR.0);
            status.push(SUCCESS.0, SUCCESS.1, Effect::success());
            clock::next_hour_deadline(cfg.poll_web)
        };

        let current = {
            let mut st = self.state();
            if !dates.is_empty() {
                st.dates = dates;
            }
            st.refresh_generation == generation
        };
        self.render();
        // A manual refresh started while this fetch was in flight owns the
        // chain from now on.
        if current {
            self.schedule_refresh(next_due, generation);
        } else {
            debug!(generation, "refresh chain superseded during fetch");
        }
    }

    // ── Display window ────────────────────────────────────────────────────────

    fn schedule_display_on(&self) {
        let device = self.clone();
        self.inner.scheduler.schedule(
            clock::next_hour_deadline(self.inner.config.display_on),
            "display_on",
            move || async move {
                device.set_display_window(true);
                device.schedule_display_on();
            },
        );
    }

    fn schedule_display_off(&self) {
        let device = self.clone();
        self.inner.scheduler.schedule(
            clock::next_hour_deadline(self.inner.config.display_off),
            "display_off",
            move || async move {
                device.set_display_window(false);
                device.schedule_display_off();
            },
        );
    }

    pub fn set_display_window(&self, open: bool) {
        self.state().display_window = open;
        info!(open, "display window changed");
        self.render();
    }

    // ── Bin indicator ─────────────────────────────────────────────────────────

    /// Bring the `bin` pattern in line with the current state.
    pub fn render(&self) {
        let (visible, next) = {
            let st = self.state();
            let next = soonest(&st.dates).map(|(label, days)| (label.to_string(), days));
            (st.visible(Instant::now()), next)
        };

        let bins = &self.inner.bins;
        if !visible {
            if bins.remove(BIN.0) {
                debug!("bin indicator hidden");
            }
            return;
        }
        match next {
            Some((label, days)) => {
                debug!(label = %label, days, "bin indicator showing");
                bins.push(BIN.0, BIN.1, Effect::solid(self.inner.config.colour_for(&label)));
            }
            None => {
                bins.push(BIN.0, BIN.1, Effect::pulse(Rgb::RED));
            }
        }
    }

    // ── Gestures ──────────────────────────────────────────────────────────────

    /// Wrap this device as a gesture callback.
    pub fn gesture_handler(&self) -> GestureHandler {
        let device = self.clone();
        Arc::new(move |gesture| device.handle_gesture(gesture))
    }

    pub fn handle_gesture(&self, gesture: Gesture) {
        info!(?gesture, "button gesture");
        match gesture {
            Gesture::SinglePress => self.show_next_bin(),
            Gesture::DoubleTap => self.toggle_visible(),
            Gesture::LongHold => {
                self.inner.status.push(ALERT.0, ALERT.1, Effect::alert());
                self.refresh_now();
            }
        }
    }

    fn show_next_bin(&self) {
        let long_timeout = self.inner.config.long_timeout;
        let wake_until = Instant::now() + long_timeout;
        let next = {
            let mut st = self.state();
            st.wake_until = Some(wake_until);
            soonest(&st.dates).map(|(label, days)| (label.to_string(), days))
        };

        let effect = match next {
            Some((label, days)) => {
                let days = u32::try_from(days).unwrap_or(0);
                Effect::countdown(self.inner.config.colour_for(&label), days)
            }
            None => Effect::error(),
        };
        self.inner.bins.push(NEXT_BIN.0, NEXT_BIN.1, effect);
        self.render();

        let device = self.clone();
        self.inner
            .scheduler
            .schedule(wake_until, "wake_expired", move || async move { device.render() });
    }

    fn toggle_visible(&self) {
        let visible = {
            let mut st = self.state();
            st.user_visible = !st.user_visible;
            st.user_visible
        };
        info!(visible, "bin indicator toggled");
        self.render();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn visibility_needs_window_and_toggle_or_an_active_wake() {
        let now = Instant::now();
        let mut st = BinState {
            display_window: true,
            user_visible: true,
            ..BinState::default()
        };
        assert!(st.visible(now));

        st.user_visible = false;
        assert!(!st.visible(now));

        st.wake_until = Some(now + Duration::from_secs(60));
        assert!(st.visible(now));
        assert!(!st.visible(now + Duration::from_secs(60)));

        st.display_window = false;
        st.user_visible = true;
        st.wake_until = None;
        assert!(!st.visible(now));
    }
}
