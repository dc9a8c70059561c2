#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Fixed-interval scheduler that turns elapsed time into discrete ticks.
//!
//! The scheduler owns no clock of its own. Callers report elapsed time through
//! [`Scheduler::advance`], which makes the simulation clock and the playback
//! clock equally easy to drive from a real timer or from a scripted test.

use std::{fmt, time::Duration};

use carillon_core::Tempo;
use thiserror::Error;

type TickCallback = Box<dyn FnMut(u64)>;

/// Errors raised while configuring a scheduler.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// A zero interval would fire an unbounded number of ticks.
    #[error("tick interval must be greater than zero")]
    ZeroInterval,
    /// Playback needs at least one frame per second.
    #[error("frame rate must be at least one frame per second")]
    ZeroFrameRate,
}

/// Accumulates elapsed time and fires a tick every `interval`.
pub struct Scheduler {
    interval: Duration,
    accumulator: Duration,
    fired: u64,
    cancelled: bool,
    callbacks: Vec<TickCallback>,
}

impl Scheduler {
    /// Creates a scheduler firing once per `interval`.
    pub fn new(interval: Duration) -> Result<Self, ScheduleError> {
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }
        Ok(Self::with_interval(interval))
    }

    /// Creates a scheduler firing one simulation tick per sixteenth note of `tempo`.
    #[must_use]
    pub fn from_tempo(tempo: Tempo) -> Self {
        Self::with_interval(tempo.tick_interval())
    }

    /// Creates a scheduler firing `fps` times per second.
    pub fn from_fps(fps: u32) -> Result<Self, ScheduleError> {
        if fps == 0 {
            return Err(ScheduleError::ZeroFrameRate);
        }
        Self::new(Duration::from_secs(1) / fps)
    }

    fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            accumulator: Duration::ZERO,
            fired: 0,
            cancelled: false,
            callbacks: Vec::new(),
        }
    }

    /// Time between ticks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Changes the interval, keeping time already accumulated toward the next tick.
    pub fn set_interval(&mut self, interval: Duration) -> Result<(), ScheduleError> {
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }
        self.interval = interval;
        Ok(())
    }

    /// Changes the interval to match `tempo`.
    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.interval = tempo.tick_interval();
    }

    /// Registers a callback invoked with the running tick count each time a tick fires.
    pub fn on_tick<F>(&mut self, callback: F)
    where
        F: FnMut(u64) + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Stops firing ticks and drops any partially accumulated time.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.accumulator = Duration::ZERO;
    }

    /// Resumes firing ticks after [`Scheduler::cancel`].
    pub fn resume(&mut self) {
        self.cancelled = false;
    }

    /// Reports whether the scheduler was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Number of ticks fired since construction.
    #[must_use]
    pub const fn fired(&self) -> u64 {
        self.fired
    }

    /// Time still required before the next tick fires.
    #[must_use]
    pub fn until_next_tick(&self) -> Duration {
        self.interval.saturating_sub(self.accumulator)
    }

    /// Accounts for `dt` of elapsed time and returns how many ticks became due.
    ///
    /// Registered callbacks run once per due tick, in registration order,
    /// before this method returns. A cancelled scheduler ignores elapsed time.
    pub fn advance(&mut self, dt: Duration) -> u32 {
        if self.cancelled {
            return 0;
        }

        self.accumulator = self.accumulator.saturating_add(dt);
        let mut due = 0;
        while self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            self.fired = self.fired.saturating_add(1);
            due += 1;
            for callback in &mut self.callbacks {
                callback(self.fired);
            }
        }
        due
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("interval", &self.interval)
            .field("accumulator", &self.accumulator)
            .field("fired", &self.fired)
            .field("cancelled", &self.cancelled)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
