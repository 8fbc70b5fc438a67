/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Global time-ordered deferred job dispatcher.
//!
//! [`TaskScheduler`] keeps a min-heap of one-shot jobs keyed by
//! `(due, insertion seq)`.  Its loop polls the heap, pops every job that is
//! due and spawns each onto its own tokio task, then sleeps for the poll
//! interval:
//!
//! ```text
//! schedule(due, name, job) ──► heap ──(due ≤ now)──► tokio::spawn(job())   fire-and-forget
//!                               ▲                        │
//!                               └──── job may call schedule() again (recurrence)
//! ```
//!
//! # Guarantees
//!
//! | Topic | Rule |
//! |---|---|
//! | Order | non-decreasing `due`; equal `due` in insertion order |
//! | Accuracy | bounded by the poll interval (default 500 ms) |
//! | Isolation | a job's panic or error stays inside its own task |
//! | Exclusion | none between jobs; each job guards what it shares |
//! | Re-entrancy | jobs are spawned after the queue lock is released |
//!
//! Not a timer wheel: this is a coarse poll-then-sleep loop by intent of
//! its callers, which only need minute-level accuracy.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default sleep between queue checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Future produced by a job when it is dispatched.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

type Job = Box<dyn FnOnce() -> JobFuture + Send + 'static>;

// ── Queue entry ───────────────────────────────────────────────────────────────

struct Queued {
    due: Instant,
    seq: u64,
    name: String,
    job: Job,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    /// Reversed so the max-heap yields the earliest `(due, seq)` first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

// ── TaskScheduler ─────────────────────────────────────────────────────────────

struct Inner {
    queue: Mutex<Queue>,
    poll_interval: Duration,
    shutdown: watch::Sender<bool>,
}

/// Shared handle to the deferred job queue.
///
/// Cheap to clone; jobs receive a clone so they can reschedule themselves.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("queued", &self.len())
            .field("poll_interval", &self.inner.poll_interval)
            .finish()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl TaskScheduler {
    pub fn new(poll_interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(Queue::default()),
                poll_interval,
                shutdown,
            }),
        }
    }

    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Scheduling ────────────────────────────────────────────────────────────

    /// Queue `job` to be started at (or shortly after) `due`.
    ///
    /// `name` is only used in log lines.  Safe to call from inside a running
    /// job.
    pub fn schedule<F, Fut>(&self, due: Instant, name: impl Into<String>, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let job: Job = Box::new(move || Box::pin(job()) as JobFuture);

        let mut queue = self.queue();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        debug!(
            job = %name,
            in_ms = due.saturating_duration_since(Instant::now()).as_millis() as u64,
            queued = queue.heap.len() + 1,
            "job scheduled"
        );
        queue.heap.push(Queued { due, seq, name, job });
    }

    /// Queue `job` to start `delay` from now.
    pub fn schedule_in<F, Fut>(&self, delay: Duration, name: impl Into<String>, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule(Instant::now() + delay, name, job);
    }

    /// Drop every queued job.  Jobs already dispatched keep running.
    ///
    /// Returns the number of jobs discarded.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue();
        let count = queue.heap.len();
        queue.heap.clear();
        info!(discarded = count, "deferred queue cleared");
        count
    }

    pub fn len(&self) -> usize {
        self.queue().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Due time of the earliest queued job.
    pub fn next_due(&self) -> Option<Instant> {
        self.queue().heap.peek().map(|q| q.due)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Pop the earliest job if it is due at `now`.
    fn pop_due(&self, now: Instant) -> Option<Queued> {
        let mut queue = self.queue();
        if queue.heap.peek().is_some_and(|q| q.due <= now) {
            queue.heap.pop()
        } else {
            None
        }
    }

    /// Start every job that is due at `now`, earliest first.
    ///
    /// Each job runs on its own task; its handle is dropped, so the
    /// scheduler never waits on, retries, or observes it.  Returns the
    /// number of jobs started.
    pub fn dispatch_due(&self, now: Instant) -> usize {
        let mut started = 0;
        while let Some(entry) = self.pop_due(now) {
            debug!(
                job = %entry.name,
                late_ms = now.saturating_duration_since(entry.due).as_millis() as u64,
                "dispatching job"
            );
            drop(tokio::spawn((entry.job)()));
            started += 1;
        }
        started
    }

    // ── Loop lifecycle ────────────────────────────────────────────────────────

    /// Poll the queue until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        let mut shutdown = self.inner.shutdown.subscribe();
        info!(
            poll_ms = self.inner.poll_interval.as_millis() as u64,
            queued = self.len(),
            "deferred scheduler running"
        );
        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                break;
            }
            if self.dispatch_due(Instant::now()) > 0 {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.inner.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!(queued = self.len(), "deferred scheduler stopped");
    }

    /// Run the loop on its own task.
    pub fn spawn(&self) -> JoinHandle<()> {
        self.inner.shutdown.send_replace(false);
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run().await })
    }

    /// Halt the loop.  Dispatched jobs are unaffected and queued jobs stay
    /// queued.
    pub fn stop(&self) {
        self.inner.shutdown.send_replace(true);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    type Record = Arc<Mutex<Vec<&'static str>>>;

    fn recorder() -> Record {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn record(rec: &Record, tag: &'static str) -> impl FnOnce() -> std::future::Ready<()> {
        let rec = rec.clone();
        move || {
            rec.lock().unwrap().push(tag);
            std::future::ready(())
        }
    }

    fn recorded(rec: &Record) -> Vec<&'static str> {
        rec.lock().unwrap().clone()
    }

    // ── Ordering ──────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn jobs_dispatch_in_due_order() {
        let sched = TaskScheduler::default();
        let rec = recorder();
        let t = Instant::now();
        sched.schedule(t + Duration::from_secs(1), "one", record(&rec, "t+1"));
        sched.schedule(t + Duration::from_secs(5), "five", record(&rec, "t+5"));
        sched.schedule(t + Duration::from_secs(2), "two", record(&rec, "t+2"));

        let handle = sched.spawn();
        tokio::time::sleep(Duration::from_secs(6)).await;
        sched.stop();
        handle.await.unwrap();

        assert_eq!(recorded(&rec), vec!["t+1", "t+2", "t+5"]);
        assert!(sched.is_empty());
    }

    #[test]
    fn equal_due_times_pop_in_insertion_order() {
        let sched = TaskScheduler::default();
        let due = Instant::now();
        for name in ["a", "b", "c", "d"] {
            sched.schedule(due, name, || async {});
        }
        let later = due + Duration::from_secs(1);
        let order: Vec<String> = std::iter::from_fn(|| sched.pop_due(later))
            .map(|q| q.name)
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn jobs_not_yet_due_stay_queued() {
        let sched = TaskScheduler::default();
        let now = Instant::now();
        sched.schedule(now + Duration::from_secs(30), "later", || async {});
        assert!(sched.pop_due(now).is_none());
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.next_due(), Some(now + Duration::from_secs(30)));
    }

    // ── Recurrence ────────────────────────────────────────────────────────────

    fn every_ten_seconds(sched: TaskScheduler, count: Arc<AtomicU32>) {
        let again = sched.clone();
        sched.schedule_in(Duration::from_secs(10), "tick", move || async move {
            count.fetch_add(1, AtomicOrdering::SeqCst);
            every_ten_seconds(again, count);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn self_rescheduling_job_recurs_at_its_interval() {
        let sched = TaskScheduler::default();
        let count = Arc::new(AtomicU32::new(0));
        every_ten_seconds(sched.clone(), count.clone());

        let handle = sched.spawn();
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(count.load(AtomicOrdering::SeqCst), 3);
        assert_eq!(sched.len(), 1, "next occurrence is queued");

        sched.stop();
        handle.await.unwrap();
    }

    // ── Isolation ─────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn panicking_job_does_not_affect_scheduler_or_siblings() {
        let sched = TaskScheduler::default();
        let rec = recorder();
        sched.schedule_in(Duration::from_secs(1), "boom", || async {
            panic!("job failed");
        });
        sched.schedule_in(Duration::from_secs(2), "fine", record(&rec, "fine"));

        let handle = sched.spawn();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(recorded(&rec), vec!["fine"]);

        sched.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn long_running_job_does_not_block_dispatch() {
        let sched = TaskScheduler::default();
        let rec = recorder();
        let slow = rec.clone();
        sched.schedule_in(Duration::from_secs(1), "slow", move || async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            slow.lock().unwrap().push("slow");
        });
        sched.schedule_in(Duration::from_secs(2), "quick", record(&rec, "quick"));

        let handle = sched.spawn();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(recorded(&rec), vec!["quick"]);

        sched.stop();
        handle.await.unwrap();
    }

    // ── stop / clear ──────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn stop_halts_loop_but_not_in_flight_jobs() {
        let sched = TaskScheduler::default();
        let rec = recorder();
        let in_flight = rec.clone();
        sched.schedule_in(Duration::from_secs(1), "in-flight", move || async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            in_flight.lock().unwrap().push("in-flight");
        });
        sched.schedule_in(Duration::from_secs(10), "never", record(&rec, "never"));

        let handle = sched.spawn();
        tokio::time::sleep(Duration::from_secs(2)).await;
        sched.stop();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(recorded(&rec), vec!["in-flight"]);
        assert_eq!(sched.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_discards_queued_jobs() {
        let sched = TaskScheduler::default();
        let rec = recorder();
        for tag in ["a", "b", "c"] {
            sched.schedule_in(Duration::from_secs(1), tag, record(&rec, tag));
        }
        assert_eq!(sched.clear(), 3);
        assert!(sched.is_empty());

        let handle = sched.spawn();
        tokio::time::sleep(Duration::from_secs(2)).await;
        sched.stop();
        handle.await.unwrap();
        assert!(recorded(&rec).is_empty());
    }
}
