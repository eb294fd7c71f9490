//! Scheduler (C1, §2, §5, §9): decides *when* each source adapter's next
//! fetch is due and whether the live-game protection window forbids running
//! it. Pure decision logic — no network I/O, no sleeping — so the Detector
//! Engine and the adapters stay the only places that touch I/O directly (§9
//! REDESIGN FLAGS: "Orchestrator with embedded scheduling and detection ->
//! split: Scheduler (C1) triggers; Detector Engine (C9) is a pure function").

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::sources::SourceId;

/// Live-game protection rule (§5): no live-collection fetches are permitted
/// inside `[game_start - 10min, game_start + 4h]`. This is an operational
/// rule the Scheduler enforces on behalf of whichever adapters are
/// configured to honor it; it is not a data invariant.
pub const LIVE_PROTECTION_PRE_GAME: Duration = Duration::minutes(10);
pub const LIVE_PROTECTION_POST_GAME_HOURS: i64 = 4;

pub fn live_game_protection_active(game_start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let window_start = game_start - LIVE_PROTECTION_PRE_GAME;
    let window_end = game_start + Duration::hours(LIVE_PROTECTION_POST_GAME_HOURS);
    now >= window_start && now <= window_end
}

/// Per-source cadence bookkeeping: when each source last ran, so
/// [`Scheduler::due`] can apply its own `cadence_seconds` independently
/// (§4.1 `identity().cadence_seconds`).
pub struct Scheduler {
    last_run: Mutex<HashMap<SourceId, DateTime<Utc>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            last_run: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `source`'s next fetch is due at `now`, given its cadence.
    /// Sources that have never run are always due.
    pub fn due(&self, source: SourceId, cadence_seconds: u64, now: DateTime<Utc>) -> bool {
        match self.last_run.lock().get(&source) {
            None => true,
            Some(last) => now - *last >= Duration::seconds(cadence_seconds as i64),
        }
    }

    pub fn record_run(&self, source: SourceId, at: DateTime<Utc>) {
        self.last_run.lock().insert(source, at);
    }

    /// Whether the Performance Tuner's daily cadence (§4.11, default
    /// `tuner_cadence_secs`) is due, using the same "never run" rule.
    pub fn cadence_due(
        &self,
        key: SourceId,
        cadence_seconds: u64,
        clock: &dyn Clock,
    ) -> bool {
        self.due(key, cadence_seconds, clock.now())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_game_protection_window_bounds() {
        let start = Utc::now();
        assert!(live_game_protection_active(start, start - Duration::minutes(5)));
        assert!(live_game_protection_active(start, start + Duration::hours(3)));
        assert!(!live_game_protection_active(start, start - Duration::minutes(11)));
        assert!(!live_game_protection_active(start, start + Duration::hours(4) + Duration::minutes(1)));
    }

    #[test]
    fn scheduler_due_respects_cadence() {
        let scheduler = Scheduler::new();
        let now = Utc::now();
        assert!(scheduler.due(SourceId::Vsin, 300, now));
        scheduler.record_run(SourceId::Vsin, now);
        assert!(!scheduler.due(SourceId::Vsin, 300, now + Duration::seconds(60)));
        assert!(scheduler.due(SourceId::Vsin, 300, now + Duration::seconds(301)));
    }
}
