//! The timer service.
//!
//! Timers live in a min-heap of deadlines plus an `id → entry` map, both
//! behind one mutex. A single dispatcher task, running on the task engine,
//! drains due deadlines and submits their callbacks as independent tasks:
//!
//! ```text
//! set_timeout / set_interval ──► [heap + map] ◄── clear (flag + remove)
//!                                     │
//!                         dispatcher (one engine task)
//!                          1. pop every deadline <= now
//!                          2. skip cleared entries (lazy deletion)
//!                          3. submit callback ──► engine (blocking task)
//!                          4. reinsert intervals at now + interval
//!                          5. heap empty? disarm and exit
//!                             else sleep min(next - now, max delay)
//! ```
//!
//! The lock is held only for heap and map operations, never while a
//! callback runs.
//!
//! ## Clearing
//!
//! [`EventLoop::clear`] is idempotent. A clear that returns before the
//! timer's deadline guarantees the timer never fires. A clear racing a fire
//! that the dispatcher has already submitted can let that one fire through:
//! at most one extra firing, never more.

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};
use walrus_task::{Task, TaskEngine, TaskPriority};

use crate::config::{EventLoopConfig, MIN_INTERVAL};
use crate::timer::{Callback, Deadline, TimerEntry, TimerId};

/// Heap and map, guarded together.
#[derive(Default)]
struct TimerState {
    heap: BinaryHeap<Deadline>,
    entries: HashMap<TimerId, TimerEntry>,
    /// Whether a dispatcher task is currently alive.
    armed: bool,
}

/// A callback ready to be submitted, detached from the state lock.
struct Fire {
    id: TimerId,
    run: Callback,
    cancelled: Arc<AtomicBool>,
}

impl TimerState {
    /// Moves a popped deadline into `due` if its entry is still live.
    fn collect(&mut self, id: TimerId, now: Instant, due: &mut Vec<Fire>) {
        let Some(entry) = self.entries.get_mut(&id) else {
            // Cleared since it was pushed.
            return;
        };

        if let Callback::Repeat(cb) = &entry.callback {
            due.push(Fire {
                id,
                run: Callback::Repeat(Arc::clone(cb)),
                cancelled: Arc::clone(&entry.cancelled),
            });
            entry.next_fire = now + entry.interval;
            self.heap.push(Deadline {
                at: entry.next_fire,
                id,
            });
            return;
        }

        if let Some(entry) = self.entries.remove(&id) {
            due.push(Fire {
                id,
                run: entry.callback,
                cancelled: entry.cancelled,
            });
        }
    }
}

struct Inner {
    config: EventLoopConfig,
    engine: OnceLock<TaskEngine>,
    running: AtomicBool,
    next_id: AtomicU64,
    state: Mutex<TimerState>,
    wake: Notify,
    fired: AtomicU64,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Timer-driven event loop: timeouts, intervals and immediates.
///
/// Cheap to clone; clones share the same timers.
#[derive(Clone)]
pub struct EventLoop {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(EventLoopConfig::default())
    }
}

impl EventLoop {
    /// Create an uninitialised, stopped event loop.
    #[must_use]
    pub fn new(config: EventLoopConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                engine: OnceLock::new(),
                running: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                state: Mutex::new(TimerState::default()),
                wake: Notify::new(),
                fired: AtomicU64::new(0),
            }),
        }
    }

    /// Attach the task engine. Only the first call has an effect.
    ///
    /// Returns `false` if an engine was already attached.
    pub fn init(&self, engine: TaskEngine) -> bool {
        let attached = self.inner.engine.set(engine).is_ok();
        if !attached {
            warn!("event loop already initialised; ignoring engine");
        }
        attached
    }

    /// Start accepting timers.
    ///
    /// Returns `false` if the loop has no engine yet.
    pub fn start(&self) -> bool {
        if self.inner.engine.get().is_none() {
            warn!("event loop started before init; timers stay disabled");
            return false;
        }
        if !self.inner.running.swap(true, Ordering::AcqRel) {
            info!(
                max_dispatch_delay_ms = self.inner.config.max_dispatch_delay.as_millis() as u64,
                "event loop started"
            );
        }
        true
    }

    /// Stop the loop and cancel every pending timer.
    ///
    /// Callbacks already handed to the engine still run. The loop can be
    /// started again afterwards.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let cancelled = {
            let mut state = self.inner.state();
            for entry in state.entries.values() {
                entry.cancelled.store(true, Ordering::Release);
            }
            let n = state.entries.len();
            state.entries.clear();
            state.heap.clear();
            n
        };
        self.inner.wake.notify_one();
        info!(
            cancelled,
            fired = self.inner.fired.load(Ordering::Relaxed),
            "event loop stopped"
        );
    }

    /// Returns `true` between [`EventLoop::start`] and [`EventLoop::stop`].
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Returns `true` while a dispatcher task is alive.
    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.inner.state().armed
    }

    /// Number of timers waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.state().entries.len()
    }

    /// Total number of timer callbacks submitted so far.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.inner.fired.load(Ordering::Relaxed)
    }

    /// Run `callback` once after `delay`.
    pub fn set_timeout<F>(&self, callback: F, delay: Duration) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(Callback::Once(Box::new(callback)), delay, Duration::ZERO)
    }

    /// Run `callback` every `interval` until cleared.
    ///
    /// Intervals shorter than 1 ms are raised to 1 ms.
    pub fn set_interval<F>(&self, callback: F, interval: Duration) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let interval = interval.max(MIN_INTERVAL);
        self.schedule(Callback::Repeat(Arc::new(callback)), interval, interval)
    }

    /// Run `callback` as soon as the engine picks it up.
    ///
    /// Bypasses the timer heap; the returned id cannot be cleared.
    pub fn set_immediate<F>(&self, callback: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(engine) = self.inner.engine.get() else {
            warn!("set_immediate before init; callback dropped");
            return TimerId::INVALID;
        };
        if !self.is_running() {
            debug!("set_immediate while stopped; callback dropped");
            return TimerId::INVALID;
        }
        let id = self.inner.next_id();
        self.inner.fired.fetch_add(1, Ordering::Relaxed);
        engine.submit(
            Task::blocking(format!("immediate:{}", id.id()), callback),
            self.inner.config.callback_priority,
        );
        id
    }

    /// Cancel a timeout or interval.
    ///
    /// Unknown, fired and already-cleared ids are ignored.
    pub fn clear(&self, id: TimerId) {
        if !id.is_valid() {
            return;
        }
        let mut state = self.inner.state();
        if let Some(entry) = state.entries.remove(&id) {
            entry.cancelled.store(true, Ordering::Release);
            trace!(timer = id.id(), "timer cleared");
        }
        // Stale heap keys would otherwise keep the dispatcher awake.
        if state.entries.is_empty() {
            state.heap.clear();
        }
    }

    fn schedule(&self, callback: Callback, delay: Duration, interval: Duration) -> TimerId {
        let Some(engine) = self.inner.engine.get() else {
            warn!("timer scheduled before init; ignoring");
            return TimerId::INVALID;
        };

        let id = self.inner.next_id();
        let at = Instant::now() + delay;

        let spawn_dispatcher = {
            let mut state = self.inner.state();
            if !self.is_running() {
                debug!("timer scheduled while stopped; ignoring");
                return TimerId::INVALID;
            }
            let earliest = state.heap.peek().is_none_or(|top| at < top.at);
            state.heap.push(Deadline { at, id });
            state.entries.insert(id, TimerEntry::new(callback, at, interval));

            if state.armed {
                if earliest {
                    self.inner.wake.notify_one();
                }
                false
            } else {
                state.armed = true;
                true
            }
        };

        trace!(
            timer = id.id(),
            delay_ms = delay.as_millis() as u64,
            repeat = !interval.is_zero(),
            "timer scheduled"
        );

        if spawn_dispatcher {
            engine.submit(
                Task::future("event-loop:dispatch", dispatch(Arc::clone(&self.inner))),
                TaskPriority::High,
            );
        }
        id
    }
}

/// The dispatcher. Exits (disarmed) as soon as the heap is empty; the next
/// scheduling call spawns a fresh one.
async fn dispatch(inner: Arc<Inner>) {
    let Some(engine) = inner.engine.get().cloned() else {
        inner.state().armed = false;
        return;
    };
    debug!("event loop dispatcher armed");

    loop {
        let now = Instant::now();
        let mut due = Vec::new();

        let sleep_for = {
            let mut state = inner.state();
            if !inner.running.load(Ordering::Acquire) {
                state.armed = false;
                return;
            }
            while state.heap.peek().is_some_and(|top| top.at <= now) {
                let Some(deadline) = state.heap.pop() else {
                    break;
                };
                state.collect(deadline.id, now, &mut due);
            }
            match state.heap.peek() {
                None => {
                    state.armed = false;
                    None
                }
                Some(top) => Some(
                    top.at
                        .saturating_duration_since(now)
                        .min(inner.config.max_dispatch_delay),
                ),
            }
        };

        for fire in due {
            submit_fire(&engine, &inner, fire);
        }

        let Some(delay) = sleep_for else {
            debug!("event loop dispatcher idle; disarmed");
            return;
        };

        if !delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = inner.wake.notified() => {}
            }
        }
    }
}

fn submit_fire(engine: &TaskEngine, inner: &Inner, fire: Fire) {
    let Fire { id, run, cancelled } = fire;
    inner.fired.fetch_add(1, Ordering::Relaxed);
    let body = move || {
        if cancelled.load(Ordering::Acquire) {
            trace!(timer = id.id(), "fire suppressed by clear");
            return;
        }
        match run {
            Callback::Once(f) => f(),
            Callback::Repeat(f) => f(),
        }
    };
    engine.submit(
        Task::blocking(format!("timer:{}", id.id()), body),
        inner.config.callback_priority,
    );
}
