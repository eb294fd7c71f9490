//! Clock (C1, §2): the single wall-clock abstraction every other component
//! reads time through, so a test can freeze it and a live deployment can't
//! accidentally race `Utc::now()` calls taken at slightly different instants
//! within one scheduling decision (§5: "Each pipeline stage... no component
//! busy-loops", determinism invariants in §8).

use chrono::{DateTime, Utc};

/// Abstract wall clock. The live implementation wraps `Utc::now()`; tests use
/// [`FixedClock`] so detector/backtest assertions never depend on real time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock: system wall time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant, optionally advanced by the caller. Used by
/// scheduler and live-game-protection tests that need to step through time
/// deterministically.
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: std::sync::Arc<parking_lot::Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            instant: std::sync::Arc::new(parking_lot::Mutex::new(at)),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.instant.lock() += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.instant.lock() = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_only_moves_when_advanced() {
        let start = Utc::now();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));
    }
}
