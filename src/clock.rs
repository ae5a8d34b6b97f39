// SPDX-License-Identifier: MPL-2.0

//! Time source shared by plans and the scheduler.
//!
//! All timestamps are seconds since the UNIX epoch as `f64`, so plan times
//! from the controller and the clock can be compared directly.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the UNIX epoch.
pub type Timestamp = f64;

pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |elapsed| elapsed.as_secs_f64())
    }
}

/// Time left until `deadline`, zero if it already passed.
#[must_use]
pub fn until(now: Timestamp, deadline: Timestamp) -> Duration {
    let secs = deadline - now;
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct ManualClock(std::rc::Rc<std::cell::Cell<Timestamp>>);

#[cfg(test)]
impl ManualClock {
    pub fn at(now: Timestamp) -> Self {
        Self(std::rc::Rc::new(std::cell::Cell::new(now)))
    }

    pub fn set(&self, now: Timestamp) {
        self.0.set(now);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.0.get()
    }
}
