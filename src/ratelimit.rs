//! Rate Limiter / Circuit Breaker (C3, §4.2) plus the cross-source "quiet
//! period" registry used by the live-game protection rule (§5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::Rng;
use tracing::info;

use crate::sources::SourceId;

/// Per-source token bucket: refill rate = daily quota / 86400 seconds.
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: DateTime<Utc>,
    /// Provider-declared cooldown from the last `SourceRateLimited`, if any;
    /// no token is handed out again until this passes, even once refill
    /// would otherwise have topped the bucket back up.
    rate_limited_until: Option<DateTime<Utc>>,
}

impl TokenBucket {
    pub fn new(daily_quota: u32, now: DateTime<Utc>) -> Self {
        let capacity = daily_quota.max(1) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / 86_400.0,
            last_refill: now,
            rate_limited_until: None,
        }
    }

    fn refill(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Consume one token; returns whether the caller may proceed. Never
    /// contacts the provider when empty (§4.2: "the call is refused without
    /// contacting the provider").
    pub fn try_consume(&mut self, now: DateTime<Utc>) -> bool {
        if matches!(self.rate_limited_until, Some(until) if now < until) {
            return false;
        }
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// On `SourceRateLimited`, the bucket is zeroed (§4.2).
    pub fn zero(&mut self, now: DateTime<Utc>) {
        self.tokens = 0.0;
        self.last_refill = now;
    }

    /// Zero the bucket and hold it empty for `cooldown_secs`, jittered by
    /// up to ±10% so every source tripped by the same provider incident
    /// doesn't retry in lockstep.
    pub fn zero_with_cooldown(&mut self, now: DateTime<Utc>, cooldown_secs: i64) {
        self.zero(now);
        let jitter_frac = rand::thread_rng().gen_range(-0.1..=0.1);
        let jittered_secs = (cooldown_secs as f64 * (1.0 + jitter_frac)).max(0.0).round() as i64;
        self.rate_limited_until = Some(now + Duration::seconds(jittered_secs));
    }

    pub fn remaining(&self) -> u32 {
        self.tokens.floor().max(0.0) as u32
    }
}

/// Circuit breaker state machine (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    state: CircuitState,
    failure_threshold: u32,
    window: Duration,
    cooldown: Duration,
    failures: Vec<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, window_secs: i64, cooldown_secs: i64) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_threshold,
            window: Duration::seconds(window_secs),
            cooldown: Duration::seconds(cooldown_secs),
            failures: Vec::new(),
            opened_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a call may currently be attempted; transitions OPEN ->
    /// HALF_OPEN once the cooldown has elapsed.
    pub fn allow_call(&mut self, source: SourceId, now: DateTime<Utc>) -> bool {
        if self.state == CircuitState::Open {
            if let Some(opened_at) = self.opened_at {
                if now - opened_at >= self.cooldown {
                    self.state = CircuitState::HalfOpen;
                    info!(source = %source, "circuit breaker transitioning OPEN -> HALF_OPEN");
                }
            }
        }
        self.state != CircuitState::Open
    }

    pub fn record_success(&mut self, source: SourceId) {
        if self.state != CircuitState::Closed {
            info!(source = %source, from = ?self.state, "circuit breaker transitioning -> CLOSED");
        }
        self.state = CircuitState::Closed;
        self.failures.clear();
        self.opened_at = None;
    }

    pub fn record_failure(&mut self, source: SourceId, now: DateTime<Utc>) {
        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Open;
            self.opened_at = Some(now);
            self.failures.clear();
            info!(source = %source, "circuit breaker transitioning HALF_OPEN -> OPEN");
            return;
        }

        self.failures.push(now);
        let cutoff = now - self.window;
        self.failures.retain(|t| *t >= cutoff);

        if self.failures.len() as u32 >= self.failure_threshold && self.state == CircuitState::Closed
        {
            self.state = CircuitState::Open;
            self.opened_at = Some(now);
            info!(
                source = %source,
                failures = self.failures.len(),
                "circuit breaker transitioning CLOSED -> OPEN"
            );
        }
    }
}

/// Coordinates token buckets and circuit breakers across every registered
/// source, plus the global "quiet period" flag any component may set
/// (§4.2, used by the live-game protection rule in §5).
pub struct RateLimitRegistry {
    buckets: Mutex<HashMap<SourceId, TokenBucket>>,
    breakers: Mutex<HashMap<SourceId, CircuitBreaker>>,
    quiet_period: AtomicBool,
}

impl RateLimitRegistry {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            breakers: Mutex::new(HashMap::new()),
            quiet_period: AtomicBool::new(false),
        }
    }

    pub fn register(
        &self,
        source: SourceId,
        daily_quota: u32,
        failure_threshold: u32,
        window_secs: i64,
        cooldown_secs: i64,
        now: DateTime<Utc>,
    ) {
        self.buckets
            .lock()
            .insert(source, TokenBucket::new(daily_quota, now));
        self.breakers.lock().insert(
            source,
            CircuitBreaker::new(failure_threshold, window_secs, cooldown_secs),
        );
    }

    /// Whether `source` may attempt a fetch right now: quiet period is not
    /// set, the circuit isn't OPEN, and a token is available.
    pub fn may_fetch(&self, source: SourceId, now: DateTime<Utc>) -> bool {
        if self.quiet_period.load(Ordering::SeqCst) {
            return false;
        }
        let breaker_ok = self
            .breakers
            .lock()
            .get_mut(&source)
            .map(|b| b.allow_call(source, now))
            .unwrap_or(true);
        if !breaker_ok {
            return false;
        }
        self.buckets
            .lock()
            .get_mut(&source)
            .map(|b| b.try_consume(now))
            .unwrap_or(true)
    }

    pub fn record_success(&self, source: SourceId) {
        if let Some(b) = self.breakers.lock().get_mut(&source) {
            b.record_success(source);
        }
    }

    pub fn record_failure(&self, source: SourceId, now: DateTime<Utc>) {
        if let Some(b) = self.breakers.lock().get_mut(&source) {
            b.record_failure(source, now);
        }
    }

    /// Zero a source's bucket and set the provider-declared cooldown
    /// (§4.2: "On SourceRateLimited, the bucket is zeroed... a
    /// provider-declared cooldown applied").
    pub fn record_rate_limited(&self, source: SourceId, now: DateTime<Utc>, cooldown_secs: i64) {
        if let Some(b) = self.buckets.lock().get_mut(&source) {
            b.zero_with_cooldown(now, cooldown_secs);
        }
    }

    pub fn circuit_state(&self, source: SourceId) -> Option<CircuitState> {
        self.breakers.lock().get(&source).map(|b| b.state())
    }

    pub fn budget_remaining(&self, source: SourceId) -> Option<u32> {
        self.buckets.lock().get(&source).map(|b| b.remaining())
    }

    pub fn set_quiet_period(&self, active: bool) {
        self.quiet_period.store(active, Ordering::SeqCst);
    }

    pub fn is_quiet_period(&self) -> bool {
        self.quiet_period.load(Ordering::SeqCst)
    }
}

impl Default for RateLimitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_opens_after_k_failures_in_window() {
        let now = Utc::now();
        let mut breaker = CircuitBreaker::new(5, 300, 60);
        for i in 0..5 {
            breaker.record_failure(SourceId::Vsin, now + Duration::seconds(i));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn circuit_half_opens_after_cooldown_then_closes_on_success() {
        let now = Utc::now();
        let mut breaker = CircuitBreaker::new(2, 300, 60);
        breaker.record_failure(SourceId::Sbd, now);
        breaker.record_failure(SourceId::Sbd, now + Duration::seconds(1));
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(!breaker.allow_call(SourceId::Sbd, now + Duration::seconds(30)));
        assert!(breaker.allow_call(SourceId::Sbd, now + Duration::seconds(61)));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success(SourceId::Sbd);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn token_bucket_refuses_when_empty() {
        let now = Utc::now();
        let mut bucket = TokenBucket::new(1, now);
        assert!(bucket.try_consume(now));
        assert!(!bucket.try_consume(now));
    }

    #[test]
    fn rate_limited_bucket_stays_empty_through_cooldown() {
        let now = Utc::now();
        let mut bucket = TokenBucket::new(1000, now);
        bucket.zero_with_cooldown(now, 30);
        assert!(!bucket.try_consume(now + Duration::seconds(1)));
        // jitter is at most +-10%, so 40s is past any possible cooldown end.
        assert!(bucket.try_consume(now + Duration::seconds(40)));
    }

    #[test]
    fn quiet_period_blocks_all_sources() {
        let registry = RateLimitRegistry::new();
        let now = Utc::now();
        registry.register(SourceId::Vsin, 1000, 5, 300, 60, now);
        registry.set_quiet_period(true);
        assert!(!registry.may_fetch(SourceId::Vsin, now));
    }
}
