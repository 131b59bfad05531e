//! Exponential backoff with jitter, driving reconnection attempts until one
//! succeeds, the caller stops it, or `max_attempts` is exhausted.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::RtError;
use crate::event_bus::EventBus;

/// Configuration for [`ReconnectionPolicy`].
#[derive(Debug, Clone)]
pub struct ReconnectionConfig {
    /// Whether reconnection is attempted at all after an unexpected close.
    pub enabled: bool,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling on the computed delay, regardless of attempt count.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
    /// `0` means unlimited attempts; otherwise the loop gives up after this many.
    pub max_attempts: u32,
    /// Fraction (0.0..=1.0) of the delay to randomize by, uniformly, in both directions.
    pub jitter_factor: f64,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 1.5,
            max_attempts: 0,
            jitter_factor: 0.3,
        }
    }
}

impl ReconnectionConfig {
    /// A policy tuned for interactive use: quick first retry, short ceiling.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// A policy that backs off slowly and retries forever, for long-lived
    /// background connections.
    #[must_use]
    pub fn patient() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Reconnection disabled entirely.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Drives the retry loop described in [`ReconnectionConfig`], emitting
/// `reconnecting` / `reconnected` / `reconnection_failed` on the supplied bus.
pub struct ReconnectionPolicy {
    config: ReconnectionConfig,
    bus: Arc<EventBus>,
    running: AtomicBool,
    attempt: AtomicU32,
    cancel: Mutex<CancellationToken>,
}

impl std::fmt::Debug for ReconnectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectionPolicy")
            .field("config", &self.config)
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("attempt", &self.attempt.load(Ordering::Relaxed))
            .finish()
    }
}

impl ReconnectionPolicy {
    /// Creates a policy bound to `bus` for lifecycle event emission.
    #[must_use]
    pub fn new(config: ReconnectionConfig, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            bus,
            running: AtomicBool::new(false),
            attempt: AtomicU32::new(0),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Resets attempt count and cancellation state, without starting a run.
    pub fn reset(&self) {
        self.attempt.store(0, Ordering::SeqCst);
    }

    /// Cancels any in-progress delay and stops the loop after the current
    /// attempt function call returns. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel
            .lock()
            .expect("reconnection policy lock poisoned")
            .cancel();
    }

    /// Whether a `start()` loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Runs the retry loop: wait (jittered backoff), call `attempt_fn`, and
    /// on failure repeat until success, cancellation, or `max_attempts`.
    ///
    /// Returns `Ok(())` on the first successful `attempt_fn`, `Err` if the
    /// loop was cancelled or exhausted its attempt budget.
    pub async fn start<F, Fut>(&self, mut attempt_fn: F) -> Result<(), RtError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), RtError>>,
    {
        if !self.config.enabled {
            return Err(RtError::ConnectionFailed(
                "reconnection is disabled in configuration".to_string(),
            ));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RtError::ConnectionFailed(
                "a reconnection loop is already running".to_string(),
            ));
        }
        let fresh = CancellationToken::new();
        *self.cancel.lock().expect("reconnection policy lock poisoned") = fresh.clone();

        let mut delay = self.config.initial_delay;
        self.attempt.store(0, Ordering::SeqCst);

        let result = loop {
            let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;

            let jittered = jittered_delay(delay, self.config.jitter_factor);
            self.bus.emit(
                "reconnecting",
                &serde_json::json!({ "attempt": attempt, "delay_ms": jittered.as_millis() }),
            );

            tokio::select! {
                () = fresh.cancelled() => {
                    break Err(RtError::Cancelled);
                }
                () = tokio::time::sleep(jittered) => {}
            }

            if fresh.is_cancelled() {
                break Err(RtError::Cancelled);
            }

            match attempt_fn().await {
                Ok(()) => {
                    self.bus.emit("reconnected", &serde_json::json!({ "attempts": attempt }));
                    self.attempt.store(0, Ordering::SeqCst);
                    break Ok(());
                }
                Err(err) if err.is_auth_shaped() => {
                    tracing::warn!(reason = %err, "reconnection stopped: authentication failure");
                    self.bus.emit(
                        "reconnection_failed",
                        &serde_json::json!({ "attempts": attempt, "reason": err.to_string() }),
                    );
                    break Err(err);
                }
                Err(err) => {
                    tracing::debug!(attempt, reason = %err, "reconnection attempt failed");
                    if self.config.max_attempts != 0 && attempt >= self.config.max_attempts {
                        self.bus.emit(
                            "reconnection_failed",
                            &serde_json::json!({ "attempts": attempt, "reason": err.to_string() }),
                        );
                        break Err(err);
                    }
                    delay = Duration::from_secs_f64(
                        (delay.as_secs_f64() * self.config.backoff_multiplier)
                            .min(self.config.max_delay.as_secs_f64()),
                    );
                }
            }
        };

        self.running.store(false, Ordering::SeqCst);
        result
    }
}

/// Applies `base ± base * jitter_factor` uniform jitter to `base`, clamped to
/// never go negative.
fn jittered_delay(base: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return base;
    }
    let base_secs = base.as_secs_f64();
    let spread = base_secs * jitter_factor;
    let offset = (fastrand::f64() * 2.0 - 1.0) * spread;
    Duration::from_secs_f64((base_secs + offset).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as AU32;

    #[test]
    fn zero_jitter_returns_base_exactly() {
        let d = jittered_delay(Duration::from_millis(1000), 0.0);
        assert_eq!(d, Duration::from_millis(1000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..200 {
            let d = jittered_delay(base, 0.3);
            assert!(d.as_millis() >= 700, "{:?} below lower bound", d);
            assert!(d.as_millis() <= 1300, "{:?} above upper bound", d);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_first_attempt_emits_reconnected() {
        let bus = Arc::new(EventBus::new());
        let reconnected = Arc::new(AU32::new(0));
        let r = reconnected.clone();
        bus.on("reconnected", move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        let policy = ReconnectionPolicy::new(
            ReconnectionConfig {
                initial_delay: Duration::from_millis(10),
                jitter_factor: 0.0,
                ..ReconnectionConfig::default()
            },
            bus,
        );
        let result = policy.start(|| async { Ok(()) }).await;
        assert!(result.is_ok());
        assert_eq!(reconnected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_max_attempts_and_emits_reconnection_failed() {
        let bus = Arc::new(EventBus::new());
        let failed = Arc::new(AU32::new(0));
        let f = failed.clone();
        bus.on("reconnection_failed", move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let policy = ReconnectionPolicy::new(
            ReconnectionConfig {
                initial_delay: Duration::from_millis(1),
                max_attempts: 3,
                jitter_factor: 0.0,
                ..ReconnectionConfig::default()
            },
            bus,
        );
        let result = policy
            .start(|| async { Err(RtError::ConnectionFailed("refused".into())) })
            .await;
        assert!(result.is_err());
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_shaped_failure_stops_immediately() {
        let bus = Arc::new(EventBus::new());
        let attempts = Arc::new(AU32::new(0));
        let a = attempts.clone();
        let policy = ReconnectionPolicy::new(
            ReconnectionConfig {
                initial_delay: Duration::from_millis(1),
                max_attempts: 10,
                jitter_factor: 0.0,
                ..ReconnectionConfig::default()
            },
            bus,
        );
        let result = policy
            .start(move || {
                a.fetch_add(1, Ordering::SeqCst);
                async { Err(RtError::AuthenticationRequired) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
