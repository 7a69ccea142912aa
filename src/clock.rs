use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Time source injected into the controller so fade and auto-reset deadlines
/// are testable without wall-clock waits.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock advanced by hand, for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Mutex::new(Instant::now()) }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

/// Deadline-ordered queue of deferred actions (fade completions, highlight
/// auto-resets). Nothing fires until `due` is polled; the event loop owns
/// the cadence.
#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: Vec<(Instant, T)>,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn schedule(&mut self, at: Instant, action: T) {
        self.entries.push((at, action));
    }

    /// Removes and returns every action whose deadline has passed, in
    /// deadline order.
    pub fn due(&mut self, now: Instant) -> Vec<T> {
        self.entries.sort_by_key(|(at, _)| *at);
        let ready = self.entries.partition_point(|(at, _)| *at <= now);
        self.entries.drain(..ready).map(|(_, action)| action).collect()
    }

    /// Earliest pending deadline, if any. Lets an async driver sleep until
    /// the next action instead of polling.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(at, _)| *at).min()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
