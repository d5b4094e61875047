//! Injectable time source.
//!
//! Every timestamp the protocol engine reads goes through [`Clock`], so the
//! 26 s slave expiry, the anti-flap holds and the reduction throttle can be
//! driven deterministically in tests and simulations.

use chrono::{Local, Timelike};
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Monotonic instant, measured from the clock's start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    pub fn from_secs(secs: u64) -> Self {
        Timestamp(Duration::from_secs(secs))
    }

    /// Elapsed time since `earlier`, saturating to zero if `earlier` is ahead.
    pub fn since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

pub trait Clock {
    /// Current monotonic time.
    fn now(&self) -> Timestamp;

    /// Local wall-clock hour (0-23), used only by the solar window check.
    fn local_hour(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn local_hour(&self) -> u32 {
        (**self).local_hour()
    }
}

/// Process clock: monotonic time from [`Instant`], wall hour from [`Local`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.start.elapsed())
    }

    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }
}

/// Hand-driven clock for tests and bench harnesses.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
    hour: Cell<u32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set_hour(&self, hour: u32) {
        self.hour.set(hour);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.get())
    }

    fn local_hour(&self) -> u32 {
        self.hour.get()
    }
}
