/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Single-button gesture classification.
//!
//! [`Debouncer`] turns raw, already hardware-debounced edges from one button
//! into [`Gesture`]s using two racing timers per press:
//!
//! ```text
//!            press T                     T + double_tap          T + long_hold
//! rising ──────┬───────────────────────────────┬──────────────────────┬────────
//!              ├─ second press before here ─► DoubleTap (single timer cancelled)
//!              │                               ├─ released ─► SinglePress
//!              │                               └─ still held ─► Held ─┬─ released ─► SinglePress
//!              │                                                      └─ still held ─► LongHold
//! ```
//!
//! # Races
//!
//! Every timer captures the press timestamp it was armed for.  When it fires
//! it compares that timestamp against current state under the lock and does
//! nothing if the press cycle has moved on, so a stale timer can never emit a
//! gesture.  Aborting the timer task is only a tidy-up.
//!
//! # Policy
//!
//! Each fresh press resolves to exactly one of `SinglePress` or `LongHold`,
//! unless a second press turns it into a `DoubleTap`.  Reaching the long-hold
//! path always cancels the pending single-press.  A fresh press that lands
//! while the previous press's single timer is still pending (at exactly the
//! window boundary, say) emits that single-press immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

// ── Public types ──────────────────────────────────────────────────────────────

/// A classified button interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    SinglePress,
    DoubleTap,
    LongHold,
}

/// A raw edge from the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Button became asserted (pressed).
    Rising,
    /// Button was released.
    Falling,
}

/// Where the debouncer currently is for this button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GesturePhase {
    #[default]
    Idle,
    /// A first press happened; waiting to see if a second one follows.
    AwaitingFollowUp,
    /// The double-tap window passed with the button still down.
    Held,
}

/// Classification windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GestureTiming {
    /// A second press sooner than this after the first is a double-tap.
    #[serde(rename = "double_tap_ms", with = "millis")]
    pub double_tap: Duration,
    /// Holding at least this long is a long-hold.
    #[serde(rename = "long_hold_ms", with = "millis")]
    pub long_hold: Duration,
}

impl Default for GestureTiming {
    fn default() -> Self {
        Self {
            double_tap: Duration::from_millis(300),
            long_hold: Duration::from_millis(500),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Reads whether the button is physically asserted right now.
pub trait ButtonLevel: Send + Sync {
    fn is_asserted(&self) -> bool;
}

impl ButtonLevel for AtomicBool {
    fn is_asserted(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

/// Callback receiving classified gestures.  Invoked without any debouncer
/// lock held, from the caller of [`Debouncer::press`] (double-tap) or from a
/// timer task (single-press, long-hold).
pub type GestureHandler = Arc<dyn Fn(Gesture) + Send + Sync>;

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Single,
    Hold,
}

struct Pending {
    /// Press timestamp this timer was armed for.
    armed_at: Instant,
    handle: JoinHandle<()>,
}

impl Pending {
    fn cancel(self) {
        self.handle.abort();
    }
}

#[derive(Default)]
struct State {
    last_press: Option<Instant>,
    /// `None` while released.
    press_start: Option<Instant>,
    pending_single: Option<Pending>,
    pending_hold: Option<Pending>,
    phase: GesturePhase,
}

impl State {
    fn take_if_armed_at(slot: &mut Option<Pending>, armed_at: Instant) -> bool {
        if slot.as_ref().is_some_and(|p| p.armed_at == armed_at) {
            *slot = None;
            true
        } else {
            false
        }
    }
}

struct Shared {
    name: String,
    timing: GestureTiming,
    level: Arc<dyn ButtonLevel>,
    handler: GestureHandler,
    runtime: Handle,
    state: Mutex<State>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, gesture: Gesture) {
        debug!(button = %self.name, ?gesture, "gesture classified");
        (self.handler)(gesture);
    }

    fn fire(&self, kind: TimerKind, armed_at: Instant) {
        let gesture = {
            let mut st = self.state();
            match kind {
                TimerKind::Single => {
                    if !State::take_if_armed_at(&mut st.pending_single, armed_at) {
                        return;
                    }
                    if st.press_start == Some(armed_at) && self.level.is_asserted() {
                        st.phase = GesturePhase::Held;
                        None
                    } else {
                        st.phase = GesturePhase::Idle;
                        Some(Gesture::SinglePress)
                    }
                }
                TimerKind::Hold => {
                    if !State::take_if_armed_at(&mut st.pending_hold, armed_at) {
                        return;
                    }
                    if st.press_start == Some(armed_at) && self.level.is_asserted() {
                        if let Some(single) = st.pending_single.take() {
                            single.cancel();
                        }
                        st.phase = GesturePhase::Idle;
                        Some(Gesture::LongHold)
                    } else {
                        None
                    }
                }
            }
        };
        if let Some(gesture) = gesture {
            self.emit(gesture);
        }
    }
}

// ── Debouncer ─────────────────────────────────────────────────────────────────

/// Gesture classifier for one physical button.
///
/// Cheap to clone.  Edge methods may be called from any thread; timers run
/// on the runtime passed to [`new`](Self::new).
#[derive(Clone)]
pub struct Debouncer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("name", &self.shared.name)
            .field("timing", &self.shared.timing)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Debouncer {
    pub fn new(
        name: impl Into<String>,
        runtime: Handle,
        timing: GestureTiming,
        level: Arc<dyn ButtonLevel>,
        handler: GestureHandler,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                timing,
                level,
                handler,
                runtime,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.shared.state().phase
    }

    pub fn timing(&self) -> GestureTiming {
        self.shared.timing
    }

    /// Feed one raw edge observed at `at`.
    pub fn edge(&self, edge: Edge, at: Instant) {
        match edge {
            Edge::Rising => self.press(at),
            Edge::Falling => self.release(at),
        }
    }

    /// Rising edge at `at`.
    pub fn press(&self, at: Instant) {
        let timing = self.shared.timing;
        let (earlier_single, double_tap) = {
            let mut st = self.shared.state();
            let is_double = st
                .last_press
                .is_some_and(|last| at.saturating_duration_since(last) < timing.double_tap);
            st.last_press = Some(at);

            if is_double {
                if let Some(single) = st.pending_single.take() {
                    single.cancel();
                }
                if let Some(hold) = st.pending_hold.take() {
                    hold.cancel();
                }
                st.phase = GesturePhase::Idle;
                (false, true)
            } else {
                // Only a double-tap may swallow the earlier press's single;
                // one whose timer has not run yet is emitted now.
                let earlier_single = match st.pending_single.take() {
                    Some(single) => {
                        single.cancel();
                        true
                    }
                    None => false,
                };
                if let Some(stale) = st.pending_hold.take() {
                    stale.cancel();
                }
                st.press_start = Some(at);
                st.pending_hold = Some(self.arm(TimerKind::Hold, at, at + timing.long_hold));
                st.pending_single = Some(self.arm(TimerKind::Single, at, at + timing.double_tap));
                st.phase = GesturePhase::AwaitingFollowUp;
                (earlier_single, false)
            }
        };

        if earlier_single {
            self.shared.emit(Gesture::SinglePress);
        }
        if double_tap {
            self.shared.emit(Gesture::DoubleTap);
        }
    }

    /// Falling edge at `at`.
    pub fn release(&self, _at: Instant) {
        let deferred_single = {
            let mut st = self.shared.state();
            st.press_start = None;
            if let Some(hold) = st.pending_hold.take() {
                hold.cancel();
            }
            if st.phase == GesturePhase::Held {
                st.phase = GesturePhase::Idle;
                true
            } else {
                false
            }
        };

        if deferred_single {
            self.shared.emit(Gesture::SinglePress);
        }
    }

    fn arm(&self, kind: TimerKind, armed_at: Instant, fire_at: Instant) -> Pending {
        let shared = Arc::clone(&self.shared);
        let handle = self.shared.runtime.spawn(async move {
            tokio::time::sleep_until(fire_at).await;
            shared.fire(kind, armed_at);
        });
        Pending { armed_at, handle }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
