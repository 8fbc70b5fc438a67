/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! End-to-end device behaviour on virtual time.
//!
//! Hour-of-day jobs (display window, daily refresh) are configured to fall
//! at least eleven hours away from the wall-clock time the test runs at, so
//! only the timers under test fire.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;

use bindicator::channel::{ChannelOptions, PatternChannel};
use bindicator::clock::local_hour;
use bindicator::config::Config;
use bindicator::deferred::TaskScheduler;
use bindicator::gesture::Gesture;
use bindicator::jobs::{Device, ALERT, BIN, ERROR, NEXT_BIN};
use bindicator::output::{MockPwm, RgbOutput};
use bindicator::provider::{BinDateProvider, BinDates};

/// Holds each fetch until the test lets it through.
struct Gate {
    started: tokio::sync::mpsc::UnboundedSender<()>,
    proceed: Mutex<mpsc::Receiver<()>>,
}

/// Returns nothing for the first `fail_first` fetches, then `dates`.
struct Flaky {
    dates: BinDates,
    fail_first: u32,
    calls: AtomicU32,
    gate: Option<Gate>,
}

impl BinDateProvider for Flaky {
    fn fetch(&self) -> BinDates {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.started.send(());
            let _ = gate.proceed.lock().unwrap().recv();
        }
        if call < self.fail_first {
            BinDates::new()
        } else {
            self.dates.clone()
        }
    }
}

struct Rig {
    device: Device,
    provider: Arc<Flaky>,
    status_pins: [Arc<MockPwm>; 3],
    bin_pins: [Arc<MockPwm>; 3],
}

impl Rig {
    fn new(fail_first: u32) -> Self {
        Self::build(fail_first, None)
    }

    fn build(fail_first: u32, gate: Option<Gate>) -> Self {
        let far = (local_hour() + 12) % 24;
        let config = Config {
            display_on: far,
            display_off: (far + 1) % 24,
            poll_web: far,
            status_inverted: [false; 3],
            ..Config::default()
        };

        let (status_out, status_pins) = RgbOutput::mock([21, 18, 11], [false; 3]);
        let (bin_out, bin_pins) = RgbOutput::mock([10, 9, 17], [false; 3]);
        let provider = Arc::new(Flaky {
            dates: BinDates::from([("general".to_string(), 4), ("recycling".to_string(), 1)]),
            fail_first,
            calls: AtomicU32::new(0),
            gate,
        });
        let device = Device::new(
            config,
            PatternChannel::new("status", status_out, ChannelOptions::default()),
            PatternChannel::new("bins", bin_out, ChannelOptions::default()),
            TaskScheduler::default(),
            provider.clone(),
        );
        Self {
            device,
            provider,
            status_pins,
            bin_pins,
        }
    }

    /// Start with the display window open.
    fn start_in_window(&self) {
        self.device.start_at_hour(self.device.config().display_on);
    }

    /// Start with the display window closed.
    fn start_outside_window(&self) {
        self.device.start_at_hour(self.device.config().display_off);
    }

    fn fetches(&self) -> u32 {
        self.provider.calls.load(Ordering::SeqCst)
    }

    fn bin_duty(&self) -> [u8; 3] {
        self.bin_pins.each_ref().map(|p| p.duty())
    }

    fn status_duty(&self) -> [u8; 3] {
        self.status_pins.each_ref().map(|p| p.duty())
    }
}

// ── Refresh ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_refresh_lights_the_soonest_bin() {
    let rig = Rig::new(0);
    rig.start_in_window();

    sleep(Duration::from_secs(3)).await;
    assert_eq!(rig.fetches(), 1);
    assert_eq!(rig.device.snapshot().dates.len(), 2);
    // recycling is due first
    assert_eq!(rig.bin_duty(), [100, 60, 0]);

    rig.device.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_shows_error_and_retries_after_short_timeout() {
    let rig = Rig::new(1);
    rig.start_in_window();

    sleep(Duration::from_secs(3)).await;
    assert_eq!(rig.fetches(), 1);
    assert!(rig.device.snapshot().dates.is_empty());
    assert!(rig.device.status().contains(ERROR.0));
    // no data: the bin LED pulses red instead of showing a colour
    assert!(rig.device.bins().contains(BIN.0));
    let [_, g, b] = rig.bin_duty();
    assert_eq!((g, b), (0, 0));

    let short = rig.device.config().short_timeout;
    sleep(short).await;
    assert_eq!(rig.fetches(), 2);
    assert_eq!(rig.device.snapshot().dates.len(), 2);
    assert!(!rig.device.status().contains(ERROR.0));

    rig.device.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn long_hold_during_a_fetch_leaves_a_single_refresh_chain() {
    let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
    let (proceed_tx, proceed_rx) = mpsc::channel();
    let rig = Rig::build(
        0,
        Some(Gate {
            started: started_tx,
            proceed: Mutex::new(proceed_rx),
        }),
    );
    rig.start_in_window();

    // The first refresh is dispatched at +2 s and parks inside the provider.
    started_rx.recv().await.unwrap();
    rig.device.handle_gesture(Gesture::LongHold);

    // Let both the in-flight fetch and the manual one through.
    proceed_tx.send(()).unwrap();
    proceed_tx.send(()).unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(rig.fetches(), 2);

    // heartbeat, display_on, display_off and exactly one refresh
    assert_eq!(rig.device.scheduler().len(), 4);

    rig.device.shutdown().await;
}

// ── Heartbeat ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn heartbeat_repeats_on_the_status_led() {
    let rig = Rig::new(0);
    rig.start_outside_window();
    let interval = rig.device.config().heartbeat_interval;

    // First beat at +1 s, then every interval; each beat is one 100 ms frame.
    for _ in 0..3 {
        sleep(Duration::from_millis(1_050)).await;
        assert!(rig.device.status().contains("heartbeat"));
        sleep(interval - Duration::from_millis(1_050)).await;
    }

    rig.device.shutdown().await;
}

// ── Display window ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn closed_window_keeps_the_bin_led_dark() {
    let rig = Rig::new(0);
    rig.start_outside_window();

    sleep(Duration::from_secs(3)).await;
    assert_eq!(rig.device.snapshot().dates.len(), 2);
    assert!(!rig.device.bins().contains(BIN.0));
    assert_eq!(rig.bin_duty(), [0, 0, 0]);

    rig.device.set_display_window(true);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(rig.bin_duty(), [100, 60, 0]);

    rig.device.set_display_window(false);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(rig.bin_duty(), [0, 0, 0]);

    rig.device.shutdown().await;
}

// ── Gestures ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn double_tap_toggles_the_indicator() {
    let rig = Rig::new(0);
    rig.start_in_window();
    sleep(Duration::from_secs(3)).await;

    rig.device.handle_gesture(Gesture::DoubleTap);
    sleep(Duration::from_millis(200)).await;
    assert!(!rig.device.snapshot().user_visible);
    assert_eq!(rig.bin_duty(), [0, 0, 0]);

    rig.device.handle_gesture(Gesture::DoubleTap);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(rig.bin_duty(), [100, 60, 0]);

    rig.device.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn single_press_shows_countdown_and_wakes_until_long_timeout() {
    let rig = Rig::new(0);
    rig.start_outside_window();
    sleep(Duration::from_secs(3)).await;

    rig.device.handle_gesture(Gesture::SinglePress);
    assert_eq!(rig.device.bins().active().as_deref(), Some(NEXT_BIN.0));
    assert!(rig.device.bins().contains(BIN.0));

    // reveal 2 s + one 600 ms flash for "1 day", then the woken indicator
    sleep(Duration::from_secs(3)).await;
    assert!(!rig.device.bins().contains(NEXT_BIN.0));
    assert_eq!(rig.bin_duty(), [100, 60, 0]);

    let long = rig.device.config().long_timeout;
    sleep(long).await;
    assert!(!rig.device.bins().contains(BIN.0));
    assert_eq!(rig.bin_duty(), [0, 0, 0]);

    rig.device.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn long_hold_alerts_and_refreshes_immediately() {
    let rig = Rig::new(0);
    rig.start_in_window();
    sleep(Duration::from_secs(3)).await;
    assert_eq!(rig.fetches(), 1);
    let generation = rig.device.snapshot().refresh_generation;

    rig.device.handle_gesture(Gesture::LongHold);
    assert!(rig.device.status().contains(ALERT.0));
    assert_eq!(rig.device.snapshot().refresh_generation, generation + 1);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(rig.fetches(), 2);

    rig.device.shutdown().await;
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn shutdown_blanks_both_leds_and_stops_jobs() {
    let rig = Rig::new(0);
    rig.start_in_window();
    sleep(Duration::from_secs(3)).await;

    rig.device.shutdown().await;
    assert_eq!(rig.bin_duty(), [0, 0, 0]);
    assert_eq!(rig.status_duty(), [0, 0, 0]);
    assert!(rig.device.bins().is_empty());

    // the queue keeps its jobs but nothing dispatches them any more
    assert!(!rig.device.scheduler().is_empty());
    sleep(Duration::from_secs(60)).await;
    assert_eq!(rig.fetches(), 1);
}
