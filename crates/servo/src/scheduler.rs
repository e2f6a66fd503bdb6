//! # Servo Scheduler
//!
//! Fixed-timestep loop that ticks every registered processor once per
//! quantum.
//!
//! ## Design
//!
//! ```text
//! loop {
//!     wait_for_next_tick()
//!     begin_tick()
//!     for t in tickables { t.tick() }     // registration order
//!     end_tick()                          // stats, late-tick accounting
//! }
//! ```
//!
//! Processors hold no timing logic; the scheduler is the only clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use servo_core::config::MAX_TICK_RATE;
use servo_core::{SchedulerConfig, Tickable};

use crate::error::AppResult;

/// Paces dispatch quanta and measures how long each one took.
pub struct TickLoop {
    tick_duration: Duration,
    last_tick: Instant,
    /// Wall time owed to ticks not yet run.
    accumulator: Duration,
    tick_count: u64,
    stats: TickStats,
}

/// Timing of the quanta run so far, in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Fastest quantum.
    pub min_tick_us: u64,
    /// Slowest quantum.
    pub max_tick_us: u64,
    /// Exponential moving average (1/16 weight per quantum).
    pub avg_tick_us: u64,
    /// Quanta that overran the period.
    pub late_ticks: u64,
    /// Quanta measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn fresh(tick_duration: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: duration_us(tick_duration),
            late_ticks: 0,
            total_ticks: 0,
        }
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl TickLoop {
    /// Creates a loop with `tick_rate` quanta per second, clamped to `1..=MAX_TICK_RATE`.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        let tick_duration =
            Duration::from_micros(1_000_000 / u64::from(tick_rate.clamp(1, MAX_TICK_RATE)));

        Self {
            tick_duration,
            last_tick: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
            stats: TickStats::fresh(tick_duration),
        }
    }

    /// Accrues elapsed time; true once a full period is owed.
    #[must_use]
    pub fn should_tick(&mut self) -> bool {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_tick);
        self.last_tick = now;

        self.accumulator >= self.tick_duration
    }

    /// Pays one period off the accumulator and returns the quantum's start.
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        self.accumulator = self.accumulator.saturating_sub(self.tick_duration);
        self.tick_count += 1;
        Instant::now()
    }

    /// Records the quantum that began at `start`.
    pub fn end_tick(&mut self, start: Instant) {
        let duration = start.elapsed();
        let duration_us = duration_us(duration);

        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(duration_us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(duration_us);
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + duration_us) / 16;

        if duration > self.tick_duration {
            self.stats.late_ticks += 1;
        }
    }

    /// Sleeps until the next tick is due.
    pub fn wait_for_next_tick(&self) {
        let elapsed = self.last_tick.elapsed() + self.accumulator;
        if elapsed < self.tick_duration {
            thread::sleep(self.tick_duration - elapsed);
        }
    }

    /// Quanta begun so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Timing so far.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Period between quanta.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}

/// Drives a set of [`Tickable`]s at a fixed rate.
pub struct ServoScheduler {
    tick_loop: TickLoop,
    tickables: Vec<Arc<dyn Tickable>>,
}

impl ServoScheduler {
    /// Creates a scheduler with no tickables.
    #[must_use]
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            tick_loop: TickLoop::new(config.tick_rate),
            tickables: Vec::new(),
        }
    }

    /// Adds a tickable; tickables run in the order they were added.
    pub fn add(&mut self, tickable: Arc<dyn Tickable>) -> &mut Self {
        tracing::debug!(tickable = tickable.name(), "scheduled");
        self.tickables.push(tickable);
        self
    }

    /// Number of registered tickables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickables.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickables.is_empty()
    }

    /// Ticks every tickable once, right now.
    pub fn step(&mut self) {
        let start = self.tick_loop.begin_tick();
        for tickable in &self.tickables {
            tickable.tick();
        }
        self.tick_loop.end_tick(start);
    }

    /// Runs `ticks` paced ticks on the calling thread.
    pub fn run_for(&mut self, ticks: u64) -> TickStats {
        let mut done = 0;
        while done < ticks {
            if self.tick_loop.should_tick() {
                self.step();
                done += 1;
            } else {
                self.tick_loop.wait_for_next_tick();
            }
        }
        *self.tick_loop.stats()
    }

    /// Runs paced ticks until `keep_going` returns false or `max_ticks` is reached.
    pub fn run_while(&mut self, max_ticks: u64, mut keep_going: impl FnMut() -> bool) -> TickStats {
        let mut done = 0;
        while done < max_ticks && keep_going() {
            if self.tick_loop.should_tick() {
                self.step();
                done += 1;
            } else {
                self.tick_loop.wait_for_next_tick();
            }
        }
        *self.tick_loop.stats()
    }

    /// Moves the scheduler onto a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(mut self) -> AppResult<SchedulerHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(Mutex::new(TickStats::default()));

        let thread = {
            let running = Arc::clone(&running);
            let stats = Arc::clone(&stats);
            thread::Builder::new()
                .name("servo-scheduler".into())
                .spawn(move || {
                    tracing::info!(
                        tickables = self.tickables.len(),
                        period_us = duration_us(self.tick_loop.tick_duration()),
                        "scheduler started"
                    );
                    while running.load(Ordering::Acquire) {
                        if self.tick_loop.should_tick() {
                            self.step();
                            *stats.lock() = *self.tick_loop.stats();
                        } else {
                            self.tick_loop.wait_for_next_tick();
                        }
                    }
                    tracing::info!(ticks = self.tick_loop.tick_count(), "scheduler stopped");
                    *self.tick_loop.stats()
                })?
        };

        Ok(SchedulerHandle {
            running,
            stats,
            thread: Some(thread),
        })
    }
}

/// Control handle for a scheduler running on its own thread.
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<TickStats>>,
    thread: Option<JoinHandle<TickStats>>,
}

impl SchedulerHandle {
    /// Asks the scheduler to stop after the current tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Checks if the scheduler thread is still looping.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Latest published statistics.
    #[must_use]
    pub fn stats(&self) -> TickStats {
        *self.stats.lock()
    }

    /// Stops the scheduler and waits for it, returning the final statistics.
    pub fn join(mut self) -> TickStats {
        self.stop();
        let last = self.stats();
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                tracing::error!("scheduler thread panicked");
                last
            }
            None => last,
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("scheduler thread panicked");
            }
        }
    }
}
