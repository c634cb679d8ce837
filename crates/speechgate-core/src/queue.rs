//! Bounded admission with per-engine FIFO execution lanes.
//!
//! `max_queue_size` caps queued plus executing requests across the whole
//! service; admission past the cap is refused immediately. Each engine type gets a
//! lane with a fixed number of execution slots, and a lane hands its slots out in
//! admission order. Lanes are independent of each other.

use crate::engine::CancelSignal;
use log::{debug, warn};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{oneshot, watch};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Admission queue is full ({outstanding}/{capacity})")]
    Full { outstanding: usize, capacity: usize },

    #[error("Timed out after {timeout:?}")]
    Timeout {
        timeout: Duration,
        /// Whether the work had started executing before the deadline.
        started: bool,
    },

    #[error("Execution lane '{0}' dropped the request")]
    LaneClosed(String),
}

/// Point-in-time queue occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Admitted requests that have not finished, waiting or executing.
    pub outstanding: usize,
    pub executing: usize,
    pub capacity: usize,
    pub workers_per_engine: usize,
}

struct Waiter {
    ticket: u64,
    grant: oneshot::Sender<()>,
}

struct LaneState {
    running: usize,
    waiting: VecDeque<Waiter>,
}

struct Lane {
    name: String,
    limit: usize,
    state: Mutex<LaneState>,
}

impl Lane {
    fn new(name: &str, limit: usize) -> Self {
        Self {
            name: name.to_string(),
            limit,
            state: Mutex::new(LaneState {
                running: 0,
                waiting: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a ticket and either start right away or join the back of the lane.
    fn enter(&self, tickets: &AtomicU64) -> (u64, Option<oneshot::Receiver<()>>) {
        let mut state = self.lock();
        let ticket = tickets.fetch_add(1, Ordering::Relaxed);
        if state.running < self.limit && state.waiting.is_empty() {
            state.running += 1;
            return (ticket, None);
        }
        let (grant, granted) = oneshot::channel();
        state.waiting.push_back(Waiter { ticket, grant });
        (ticket, Some(granted))
    }

    /// Give up a ticket: drop it from the line if it never started, otherwise free
    /// its execution slot and pass it to the oldest waiter.
    fn leave(&self, ticket: u64) {
        let mut state = self.lock();
        if let Some(position) = state.waiting.iter().position(|w| w.ticket == ticket) {
            state.waiting.remove(position);
            return;
        }
        state.running = state.running.saturating_sub(1);
        while state.running < self.limit {
            let Some(next) = state.waiting.pop_front() else {
                break;
            };
            if next.grant.send(()).is_ok() {
                state.running += 1;
            }
        }
    }
}

struct Shared {
    capacity: usize,
    workers_per_engine: usize,
    outstanding: AtomicUsize,
    executing: AtomicUsize,
    tickets: AtomicU64,
    lanes: Mutex<HashMap<String, Arc<Lane>>>,
}

impl Shared {
    fn lane(&self, name: &str) -> Arc<Lane> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        lanes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Lane::new(name, self.workers_per_engine)))
            .clone()
    }
}

/// An admitted request's reservation. Dropping it releases the reservation.
pub struct QueueSlot {
    ticket: u64,
    enqueued_at: Instant,
    lane: Arc<Lane>,
    granted: Option<oneshot::Receiver<()>>,
    shared: Arc<Shared>,
}

impl QueueSlot {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn lane(&self) -> &str {
        &self.lane.name
    }

    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    async fn wait_turn(&mut self) -> Result<(), QueueError> {
        if let Some(granted) = self.granted.as_mut() {
            granted
                .await
                .map_err(|_| QueueError::LaneClosed(self.lane.name.clone()))?;
            self.granted = None;
        }
        Ok(())
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.lane.leave(self.ticket);
        self.shared.outstanding.fetch_sub(1, Ordering::SeqCst);
        debug!(
            "Released ticket {} on lane '{}' after {:?}",
            self.ticket,
            self.lane.name,
            self.enqueued_at.elapsed()
        );
    }
}

struct Executing<'a>(&'a AtomicUsize);

impl<'a> Executing<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Executing<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct AdmissionQueue {
    shared: Arc<Shared>,
}

impl AdmissionQueue {
    pub fn new(capacity: usize, workers_per_engine: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                capacity: capacity.max(1),
                workers_per_engine: workers_per_engine.max(1),
                outstanding: AtomicUsize::new(0),
                executing: AtomicUsize::new(0),
                tickets: AtomicU64::new(0),
                lanes: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Reserve a place for a request on `lane`, or refuse at once if the queue is full.
    pub fn admit(&self, lane: &str) -> Result<QueueSlot, QueueError> {
        let capacity = self.shared.capacity;
        self.shared
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|outstanding| {
                warn!("Admission refused: {outstanding}/{capacity} requests outstanding");
                QueueError::Full {
                    outstanding,
                    capacity,
                }
            })?;

        let lane = self.shared.lane(lane);
        let (ticket, granted) = lane.enter(&self.shared.tickets);
        debug!(
            "Admitted ticket {ticket} on lane '{}' ({})",
            lane.name,
            if granted.is_some() { "waiting" } else { "running" }
        );
        Ok(QueueSlot {
            ticket,
            enqueued_at: Instant::now(),
            lane,
            granted,
            shared: self.shared.clone(),
        })
    }

    /// Wait for the slot's turn, then run `work`, all within `timeout`.
    ///
    /// On timeout the work is dropped, its cancellation signal fires and the slot
    /// is released. The slot is released exactly once on every path.
    pub async fn run<F, Fut, T>(
        &self,
        slot: QueueSlot,
        timeout: Duration,
        work: F,
    ) -> Result<T, QueueError>
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut slot = slot;
        let (cancel, cancel_rx) = watch::channel(false);
        let mut started = false;

        let outcome = tokio::time::timeout(timeout, async {
            slot.wait_turn().await?;
            started = true;
            let _executing = Executing::start(&self.shared.executing);
            Ok(work(CancelSignal::new(cancel_rx)).await)
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                cancel.send_replace(true);
                warn!(
                    "Ticket {} on lane '{}' timed out after {:?} ({})",
                    slot.ticket,
                    slot.lane.name,
                    timeout,
                    if started { "executing" } else { "waiting" }
                );
                Err(QueueError::Timeout { timeout, started })
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            outstanding: self.shared.outstanding.load(Ordering::SeqCst),
            executing: self.shared.executing.load(Ordering::SeqCst),
            capacity: self.shared.capacity,
            workers_per_engine: self.shared.workers_per_engine,
        }
    }
}
