// breaker.rs - Per-provider circuit breaker.
//
// State machine:
//
//   Closed --(failure_threshold consecutive failures)--> Open
//   Open --(next call after cooldown since last failure)--> HalfOpen
//   HalfOpen --(any failure)--> Open
//   HalfOpen --(half_open_requests consecutive successes)--> Closed
//
// Cooldown is evaluated lazily when a call arrives; there is no timer, so
// an open breaker with no traffic stays open. The state lock is released
// before the wrapped operation is awaited.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::BreakerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls fail fast without reaching the provider.
    Open,
    /// Probationary; a failure reopens, enough successes close.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_ms() -> u64 {
    60_000
}

fn default_half_open_requests() -> u32 {
    2
}

/// Breaker tuning, as written in `[breaker]` or a provider's `breaker` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_half_open_requests")]
    pub half_open_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            half_open_requests: default_half_open_requests(),
        }
    }
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Source of monotonic time for cooldown checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

/// Snapshot of a breaker for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    /// Milliseconds since the last failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_ms_ago: Option<u64>,
}

pub struct CircuitBreaker {
    provider: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_clock(provider, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: impl Into<String>,
        config: BreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider: provider.into(),
            config,
            clock,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                last_failure: None,
            }),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state. Does not apply the lazy Open→HalfOpen transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `op` through the breaker.
    ///
    /// When open and still cooling down, returns [`BreakerError::Open`]
    /// without calling `op`. Otherwise `op` runs and its error, if any, is
    /// returned unchanged inside [`BreakerError::Inner`].
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;
        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    pub fn status(&self) -> BreakerStatus {
        let now = self.clock.now();
        let inner = self.lock();
        BreakerStatus {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
            last_failure_ms_ago: inner
                .last_failure
                .map(|t| now.saturating_duration_since(t).as_millis() as u64),
        }
    }

    /// Force the breaker back to Closed with cleared counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.last_failure = None;
        tracing::info!(provider = %self.provider, "circuit breaker reset");
    }

    fn admit<E>(&self) -> Result<(), BreakerError<E>> {
        let now = self.clock.now();
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }
        let cooled = inner
            .last_failure
            .map(|t| now.saturating_duration_since(t) >= self.config.cooldown())
            .unwrap_or(false);
        if cooled {
            inner.state = CircuitState::HalfOpen;
            inner.half_open_successes = 0;
            tracing::info!(provider = %self.provider, "circuit breaker half-open");
            Ok(())
        } else {
            tracing::debug!(provider = %self.provider, "circuit breaker open, call rejected");
            Err(BreakerError::Open {
                provider: self.provider.clone(),
            })
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.half_open_requests {
                inner.state = CircuitState::Closed;
                inner.half_open_successes = 0;
                tracing::info!(provider = %self.provider, "circuit breaker closed");
            }
        }
    }

    fn on_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        inner.last_failure = Some(now);

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.half_open_successes = 0;
                tracing::warn!(provider = %self.provider, "circuit breaker re-opened after half-open failure");
            }
            CircuitState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                inner.state = CircuitState::Open;
                tracing::warn!(
                    provider = %self.provider,
                    failures = inner.consecutive_failures,
                    "circuit breaker opened"
                );
            }
            _ => {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = BreakerConfig {
            failure_threshold: 5,
            cooldown_ms: 60_000,
            half_open_requests: 2,
        };
        (
            CircuitBreaker::with_clock("openai", config, clock.clone()),
            clock,
        )
    }

    async fn fail(b: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        b.execute(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(b: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
        b.execute(|| async { Ok::<_, &'static str>(7) }).await
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let (b, _) = breaker();
        for _ in 0..4 {
            let _ = fail(&b).await;
            assert_eq!(b.state(), CircuitState::Closed);
        }
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_breaker_does_not_invoke_operation() {
        let (b, _) = breaker();
        for _ in 0..5 {
            let _ = fail(&b).await;
        }
        let calls = AtomicU32::new(0);
        let result = b
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn full_recovery_cycle() {
        let (b, clock) = breaker();
        for _ in 0..5 {
            let _ = fail(&b).await;
        }
        clock.advance(Duration::from_millis(60_000));

        assert_eq!(succeed(&b).await.unwrap(), 7);
        assert_eq!(b.state(), CircuitState::HalfOpen);
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.status().half_open_successes, 0);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let (b, clock) = breaker();
        for _ in 0..5 {
            let _ = fail(&b).await;
        }
        clock.advance(Duration::from_secs(61));
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::HalfOpen);

        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);
        // Cooldown restarts from the new failure.
        assert!(succeed(&b).await.unwrap_err().is_open());
    }

    #[tokio::test]
    async fn not_cooled_down_stays_open() {
        let (b, clock) = breaker();
        for _ in 0..5 {
            let _ = fail(&b).await;
        }
        clock.advance(Duration::from_secs(59));
        assert!(succeed(&b).await.unwrap_err().is_open());
    }

    #[tokio::test]
    async fn success_resets_failure_count_while_closed() {
        let (b, _) = breaker();
        for _ in 0..4 {
            let _ = fail(&b).await;
        }
        succeed(&b).await.unwrap();
        for _ in 0..4 {
            let _ = fail(&b).await;
        }
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.status().consecutive_failures, 4);
    }

    #[tokio::test]
    async fn inner_error_is_returned_unchanged() {
        let (b, _) = breaker();
        match fail(&b).await {
            Err(BreakerError::Inner(e)) => assert_eq!(e, "boom"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn reset_closes_breaker() {
        let (b, _) = breaker();
        for _ in 0..5 {
            let _ = fail(&b).await;
        }
        b.reset();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.status().last_failure_ms_ago.is_none());
    }

    #[test]
    fn config_defaults() {
        let c: BreakerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c, BreakerConfig::default());
        assert_eq!(c.cooldown(), Duration::from_secs(60));
    }
}
