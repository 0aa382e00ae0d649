//! An injectable notion of "now", so expiry and signing-period logic can be tested without
//! depending on the wall clock.

use chrono::{DateTime, Utc};

pub trait Clock: std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock, used everywhere outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        FixedClock(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
