/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Priority-preemptive pattern scheduler for one LED.
//!
//! A [`PatternChannel`] owns one [`RgbOutput`] and a registry of named,
//! prioritised [`Pattern`]s.  Its worker loop repeatedly picks the live
//! pattern with the highest priority and resumes it by exactly one step:
//!
//! ```text
//! loop {
//!     lock registry ─► pick max (priority, insertion seq) ─► advance() ─► Done? remove
//!     unlock ─► output.apply(frame.level) ─► sleep(frame.hold)
//!     (empty registry ─► sleep(poll_interval))
//! }
//! ```
//!
//! # Behaviour
//!
//! | Topic | Rule |
//! |---|---|
//! | Selection | O(n) scan; ties go to the most recently inserted pattern |
//! | Removal | O(1) by id; cooperative, takes effect at the next evaluation |
//! | Replace | `push` with an existing id discards the old state ([`PushDiscipline::Replace`]) |
//! | Preempt | optional per channel: lower-priority pushes are refused ([`PushDiscipline::Preempt`]) |
//! | Faults | logged; evicted or retained per [`FaultPolicy`] |
//! | Pacing | `Frame::hold` blocks this channel only; other channels run independently |
//!
//! The registry lock is never held across an `.await` or an output write.

pub mod error;

pub use error::{OutputError, PatternFault};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::output::{Rgb, RgbOutput};
use crate::pattern::{Frame, Pattern, Progress};

/// Idle wait used when no pattern is registered.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ── Channel policies ──────────────────────────────────────────────────────────

/// How `push` treats an incoming pattern.  Fixed per channel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushDiscipline {
    /// Install or replace unconditionally; priority only matters for selection.
    #[default]
    Replace,
    /// Refuse a push whose priority is below the current top priority.
    Preempt,
}

/// What happens to a pattern whose step faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Remove the pattern on its first fault.
    #[default]
    Evict,
    /// Keep the pattern registered; it is re-evaluated on the next tick.
    Retain,
}

/// Construction-time settings for a [`PatternChannel`].
#[derive(Debug, Clone, Copy)]
pub struct ChannelOptions {
    pub poll_interval: Duration,
    pub discipline: PushDiscipline,
    pub fault_policy: FaultPolicy,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            discipline: PushDiscipline::Replace,
            fault_policy: FaultPolicy::Evict,
        }
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Result of [`PatternChannel::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Installed,
    /// A pattern with the same id existed and was replaced.
    Replaced,
    /// Refused under [`PushDiscipline::Preempt`].
    Rejected { top_priority: i32 },
}

impl PushOutcome {
    pub fn accepted(self) -> bool {
        !matches!(self, PushOutcome::Rejected { .. })
    }
}

/// What one evaluation of the channel did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Nothing registered; the channel waited one poll interval.
    Idle,
    /// The top pattern `id` produced one frame.
    Stepped { id: String, progress: Progress },
    /// The top pattern `id` faulted.
    Faulted { id: String, evicted: bool },
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct Entry {
    priority: i32,
    /// Insertion order; breaks priority ties and detects replacement.
    seq: u64,
    pattern: Box<dyn Pattern>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl Registry {
    fn top_id(&self) -> Option<&String> {
        self.entries
            .iter()
            .max_by_key(|(_, e)| (e.priority, e.seq))
            .map(|(id, _)| id)
    }

    fn top_priority(&self) -> Option<i32> {
        self.top_id()
            .and_then(|id| self.entries.get(id))
            .map(|e| e.priority)
    }

    /// Remove `id` only if it is still the entry inserted as `seq`.
    fn remove_if_current(&mut self, id: &str, seq: u64) -> bool {
        if self.entries.get(id).is_some_and(|e| e.seq == seq) {
            self.entries.remove(id);
            true
        } else {
            false
        }
    }
}

/// Outcome of the locked part of a tick.
enum Step {
    Idle,
    Frame { id: String, seq: u64, frame: Frame },
    Fault { id: String, fault: PatternFault, evicted: bool },
}

// ── PatternChannel ────────────────────────────────────────────────────────────

struct Inner {
    name: String,
    output: RgbOutput,
    options: ChannelOptions,
    registry: Mutex<Registry>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// One LED and the patterns competing for it.
///
/// Cheap to clone; all clones share the same registry and worker.
#[derive(Clone)]
pub struct PatternChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PatternChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternChannel")
            .field("name", &self.inner.name)
            .field("options", &self.inner.options)
            .field("patterns", &self.len())
            .finish()
    }
}

impl PatternChannel {
    /// Create a stopped channel.  Call [`spawn`](Self::spawn) to start the
    /// worker, or drive it by hand with [`tick`](Self::tick).
    pub fn new(name: impl Into<String>, output: RgbOutput, options: ChannelOptions) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                output,
                options,
                registry: Mutex::new(Registry::default()),
                shutdown,
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Pattern control ───────────────────────────────────────────────────────

    /// Install `pattern` under `id` with `priority`.
    ///
    /// Under [`PushDiscipline::Replace`] this always succeeds and discards
    /// any in-progress pattern with the same id.  Under
    /// [`PushDiscipline::Preempt`] it is refused when `priority` is below
    /// the current top priority.
    pub fn push<P>(&self, id: impl Into<String>, priority: i32, pattern: P) -> PushOutcome
    where
        P: Pattern + 'static,
    {
        let id = id.into();
        let kind = pattern.kind();
        let mut reg = self.registry();

        if self.inner.options.discipline == PushDiscipline::Preempt {
            if let Some(top_priority) = reg.top_priority() {
                if priority < top_priority {
                    info!(
                        channel = %self.inner.name,
                        id = %id,
                        kind,
                        priority,
                        top_priority,
                        "push refused: below current top priority"
                    );
                    return PushOutcome::Rejected { top_priority };
                }
            }
        }

        let seq = reg.next_seq;
        reg.next_seq += 1;
        let previous = reg.entries.insert(
            id.clone(),
            Entry {
                priority,
                seq,
                pattern: Box::new(pattern),
            },
        );

        debug!(channel = %self.inner.name, id = %id, kind, priority, "pattern pushed");
        match previous {
            Some(_) => PushOutcome::Replaced,
            None => PushOutcome::Installed,
        }
    }

    /// Remove the pattern `id`.  Returns `false` (and does nothing) if absent.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.registry().entries.remove(id).is_some();
        if removed {
            debug!(channel = %self.inner.name, id = %id, "pattern removed");
        }
        removed
    }

    /// Remove every pattern.
    pub fn clear(&self) {
        let mut reg = self.registry();
        let count = reg.entries.len();
        reg.entries.clear();
        debug!(channel = %self.inner.name, count, "patterns cleared");
    }

    pub fn len(&self) -> usize {
        self.registry().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry().entries.contains_key(id)
    }

    /// Id of the pattern that the next tick would resume.
    pub fn active(&self) -> Option<String> {
        self.registry().top_id().cloned()
    }

    /// Write "off" straight to the output, bypassing the registry.
    ///
    /// Meant for a stopped channel; a running worker overwrites it on the
    /// next frame.
    pub fn blank(&self) -> Result<(), OutputError> {
        self.inner.output.apply(Rgb::OFF)
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// Run one evaluation: resume the top pattern by one step, write its
    /// frame and wait out the frame's hold (or the poll interval when idle).
    ///
    /// Cancel-safe: the only suspension point is the final sleep.
    pub async fn tick(&self) -> Tick {
        match self.step_locked() {
            Step::Idle => {
                tokio::time::sleep(self.inner.options.poll_interval).await;
                Tick::Idle
            }

            Step::Fault { id, fault, evicted } => {
                self.log_fault(&id, &fault, evicted);
                // Keep a retained faulting pattern from spinning the loop.
                tokio::time::sleep(self.inner.options.poll_interval).await;
                Tick::Faulted { id, evicted }
            }

            Step::Frame { id, seq, frame } => {
                if let Err(err) = self.inner.output.apply(frame.level) {
                    let fault = PatternFault::from(err);
                    let evicted = self.inner.options.fault_policy == FaultPolicy::Evict
                        && self.registry().remove_if_current(&id, seq);
                    self.log_fault(&id, &fault, evicted);
                    tokio::time::sleep(self.inner.options.poll_interval).await;
                    return Tick::Faulted { id, evicted };
                }

                if frame.hold.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(frame.hold).await;
                }
                Tick::Stepped {
                    id,
                    progress: frame.progress,
                }
            }
        }
    }

    /// The part of a tick that runs under the registry lock.
    fn step_locked(&self) -> Step {
        let mut reg = self.registry();
        let Some(id) = reg.top_id().cloned() else {
            return Step::Idle;
        };
        let Some(entry) = reg.entries.get_mut(&id) else {
            return Step::Idle;
        };
        let seq = entry.seq;

        let result = entry.pattern.advance().and_then(|frame| {
            if frame.level.out_of_range() {
                Err(PatternFault::LevelOutOfRange {
                    r: frame.level.r,
                    g: frame.level.g,
                    b: frame.level.b,
                })
            } else {
                Ok(frame)
            }
        });

        match result {
            Ok(frame) => {
                if frame.progress == Progress::Done {
                    reg.entries.remove(&id);
                    debug!(channel = %self.inner.name, id = %id, "pattern finished");
                }
                Step::Frame { id, seq, frame }
            }
            Err(fault) => {
                let evicted = self.inner.options.fault_policy == FaultPolicy::Evict;
                if evicted {
                    reg.entries.remove(&id);
                }
                Step::Fault { id, fault, evicted }
            }
        }
    }

    fn log_fault(&self, id: &str, fault: &PatternFault, evicted: bool) {
        warn!(
            channel = %self.inner.name,
            id = %id,
            evicted,
            error = %fault,
            "pattern step faulted"
        );
    }

    // ── Worker lifecycle ──────────────────────────────────────────────────────

    /// Start the worker loop on the current tokio runtime.
    ///
    /// Does nothing if the worker is already running.
    pub fn spawn(&self) {
        let mut worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        self.inner.shutdown.send_replace(false);
        let channel = self.clone();
        *worker = Some(tokio::spawn(async move { channel.run().await }));
        info!(channel = %self.inner.name, "pattern channel started");
    }

    /// Loop until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        let mut shutdown = self.inner.shutdown.subscribe();
        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                break;
            }
            tokio::select! {
                _ = self.tick() => {}
                _ = shutdown.changed() => {}
            }
        }
        debug!(channel = %self.inner.name, "pattern channel loop exited");
    }

    /// Signal the worker to stop and wait for it to exit.
    ///
    /// An in-progress hold is cut short; the pattern itself is left in the
    /// registry.
    pub async fn stop(&self) {
        self.inner.shutdown.send_replace(true);
        let handle = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(channel = %self.inner.name, error = %err, "pattern channel worker ended abnormally");
            }
        }
        info!(channel = %self.inner.name, "pattern channel stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
