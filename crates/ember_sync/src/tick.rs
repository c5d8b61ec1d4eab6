//! # Fixed-Step Loop
//!
//! Fixed-timestep accumulator that drives [`GameSession::fixed_update`].
//!
//! ```text
//! frame time ──► accumulator ──► N × step (N ≤ max_catch_up)
//! ```
//!
//! When the loop falls further behind than `max_catch_up` steps, the excess
//! is discarded instead of replayed, and counted in [`TickStats`].
//!
//! [`GameSession::fixed_update`]: crate::session::GameSession::fixed_update

use std::time::{Duration, Instant};

/// Steps run back to back before excess time is discarded.
pub const DEFAULT_MAX_CATCH_UP: u32 = 5;

/// Fixed-timestep loop controller.
pub struct TickLoop {
    step: Duration,
    last_poll: Instant,
    owed: Duration,
    max_catch_up: u32,
    stats: TickStats,
}

/// Step timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Shortest step observed, in microseconds.
    pub min_tick_us: u64,
    /// Longest step observed, in microseconds.
    pub max_tick_us: u64,
    /// Rolling average step duration, in microseconds.
    pub avg_tick_us: u64,
    /// Steps that overran the step budget.
    pub late_ticks: u64,
    /// Steps discarded after falling behind.
    pub skipped_ticks: u64,
    /// Steps run.
    pub total_ticks: u64,
}

impl TickStats {
    fn starting_at(step: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: micros(step),
            late_ticks: 0,
            skipped_ticks: 0,
            total_ticks: 0,
        }
    }

    fn record(&mut self, took: Duration, budget: Duration) {
        let us = micros(took);
        self.total_ticks += 1;
        self.min_tick_us = self.min_tick_us.min(us);
        self.max_tick_us = self.max_tick_us.max(us);
        // Exponential average, 1/16 weight on the newest step
        self.avg_tick_us = (self.avg_tick_us.saturating_mul(15).saturating_add(us)) / 16;
        if took > budget {
            self.late_ticks += 1;
        }
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl TickLoop {
    /// Creates a loop running `tick_rate` steps per second.
    ///
    /// A rate of zero is treated as one.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        let step = Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1)));
        Self {
            step,
            last_poll: Instant::now(),
            owed: Duration::ZERO,
            max_catch_up: DEFAULT_MAX_CATCH_UP,
            stats: TickStats::starting_at(step),
        }
    }

    /// Sets how many steps may run back to back.
    #[must_use]
    pub fn with_max_catch_up(mut self, steps: u32) -> Self {
        self.max_catch_up = steps.max(1);
        self
    }

    /// Adds the time since the last poll to the owed time.
    fn poll(&mut self) -> bool {
        let now = Instant::now();
        self.owed += now.duration_since(self.last_poll);
        self.last_poll = now;
        self.owed >= self.step
    }

    /// Runs every due step, up to the catch-up limit.
    ///
    /// Returns the number of steps run.
    pub fn run_due<F: FnMut()>(&mut self, mut step: F) -> u32 {
        let mut ran = 0;
        while self.poll() {
            if ran == self.max_catch_up {
                self.discard_backlog();
                break;
            }
            self.owed -= self.step;
            let started = Instant::now();
            step();
            self.stats.record(started.elapsed(), self.step);
            ran += 1;
        }
        ran
    }

    fn discard_backlog(&mut self) {
        let behind = self.owed.as_nanos() / self.step.as_nanos().max(1);
        let behind = u64::try_from(behind).unwrap_or(u64::MAX);
        self.stats.skipped_ticks = self.stats.skipped_ticks.saturating_add(behind);
        self.owed = Duration::ZERO;
        tracing::warn!(skipped = behind, "fixed-step loop fell behind, steps discarded");
    }

    /// Sleeps until the next step is due.
    pub fn wait_for_next_tick(&self) {
        let elapsed = self.last_poll.elapsed() + self.owed;
        if let Some(remaining) = self.step.checked_sub(elapsed) {
            std::thread::sleep(remaining);
        }
    }

    /// Timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Duration of one step.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.step
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        Self::new(ember_shared::DEFAULT_TICK_RATE)
    }
}
