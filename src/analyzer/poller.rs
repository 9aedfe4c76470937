//! Bounded polling loop shared by every long-running operation.
//!
//! [`poll_until`] knows nothing about HTTP: it repeatedly invokes a tick action, sleeps between
//! ticks through a [`Clock`], and stops on the first terminal tick or once the timeout has
//! elapsed. A tick that is still in flight when the budget runs out is abandoned. The clock is a trait so the loop runs the same under a multi-threaded runtime, a
//! current-thread runtime, or a virtual clock in tests.

use async_trait::async_trait;
use futures_util::future::{Either, select};
use std::future::Future;
use std::pin::pin;
use std::time::Duration;

/// Monotonic time source and delay primitive used by the polling loop.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the tokio timer.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Start a clock at the current instant.
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Interval and overall budget for polling one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two ticks.
    pub interval: Duration,
    /// Budget after which polling gives up.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Build a policy from an interval and timeout.
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Build a policy from whole seconds.
    pub const fn from_secs(interval_secs: u64, timeout_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(interval_secs),
            Duration::from_secs(timeout_secs),
        )
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_secs(2, 120)
    }
}

/// Outcome of a single tick.
#[derive(Debug)]
pub enum Tick<T, E> {
    /// Terminal success.
    Ready(T),
    /// Not finished yet.
    Pending,
    /// Terminal failure.
    Failed(E),
    /// The tick itself failed; try again on the next interval.
    Retry(String),
}

/// Why [`poll_until`] stopped without a value.
#[derive(Debug, PartialEq, Eq)]
pub enum PollError<E> {
    /// A tick reported a terminal failure.
    Failed(E),
    /// The budget ran out first.
    Timeout {
        /// Ticks issued before giving up.
        attempts: u32,
        /// Time spent polling.
        elapsed: Duration,
    },
}

/// Invoke `tick` until it returns a terminal outcome or `policy.timeout` elapses.
///
/// At least one tick is always issued. Each tick races the remaining budget on `clock`, so a
/// tick that hangs is dropped once the budget is spent. After a non-terminal tick the loop
/// sleeps for the interval (clipped to the remaining budget); once the budget is spent it
/// returns [`PollError::Timeout`] without ticking again.
pub async fn poll_until<T, E, C, F, Fut>(
    clock: &C,
    policy: PollPolicy,
    mut tick: F,
) -> Result<T, PollError<E>>
where
    C: Clock + ?Sized,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Tick<T, E>>,
{
    let started = clock.now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = policy
            .timeout
            .saturating_sub(clock.now().saturating_sub(started));
        let outcome = match select(pin!(tick(attempts)), clock.sleep(remaining)).await {
            Either::Left((outcome, _)) => outcome,
            Either::Right(((), _)) => {
                let elapsed = clock.now().saturating_sub(started);
                tracing::warn!(attempts, ?elapsed, "Poll attempt outlived the timeout");
                return Err(PollError::Timeout { attempts, elapsed });
            }
        };

        match outcome {
            Tick::Ready(value) => {
                tracing::debug!(attempts, "Polling finished");
                return Ok(value);
            }
            Tick::Failed(error) => return Err(PollError::Failed(error)),
            Tick::Pending => tracing::trace!(attempt = attempts, "Still pending"),
            Tick::Retry(reason) => {
                tracing::warn!(attempt = attempts, reason = %reason, "Poll attempt failed; retrying")
            }
        }

        let elapsed = clock.now().saturating_sub(started);
        let remaining = policy.timeout.saturating_sub(elapsed);
        if !remaining.is_zero() {
            clock.sleep(policy.interval.min(remaining)).await;
        }

        let elapsed = clock.now().saturating_sub(started);
        if elapsed >= policy.timeout {
            tracing::warn!(attempts, ?elapsed, "Polling timed out");
            return Err(PollError::Timeout { attempts, elapsed });
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Virtual clock whose `sleep` advances time instantly.
    #[derive(Debug, Default)]
    pub(crate) struct ManualClock {
        now: Mutex<Duration>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl ManualClock {
        pub(crate) fn advance(&self, by: Duration) {
            *self.now.lock().expect("clock lock") += by;
        }

        pub(crate) fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().expect("clock lock").clone()
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            *self.now.lock().expect("clock lock")
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().expect("clock lock").push(duration);
            self.advance(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_first_ready_value() {
        let clock = ManualClock::default();
        let result: Result<u32, PollError<()>> =
            poll_until(&clock, PollPolicy::from_secs(1, 10), |attempt| async move {
                if attempt < 3 { Tick::Pending } else { Tick::Ready(attempt) }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 2]);
    }

    #[tokio::test]
    async fn timeout_stops_ticking() {
        let clock = ManualClock::default();
        let ticks = AtomicU32::new(0);
        let result: Result<(), PollError<()>> =
            poll_until(&clock, PollPolicy::from_secs(1, 5), |_| {
                ticks.fetch_add(1, Ordering::SeqCst);
                async { Tick::Pending }
            })
            .await;

        assert_eq!(
            result,
            Err(PollError::Timeout {
                attempts: 5,
                elapsed: Duration::from_secs(5)
            })
        );
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn sleep_is_clipped_to_remaining_budget() {
        let clock = ManualClock::default();
        let result: Result<(), PollError<()>> =
            poll_until(&clock, PollPolicy::from_secs(10, 3), |_| async { Tick::Pending }).await;

        assert!(matches!(result, Err(PollError::Timeout { attempts: 1, .. })));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(3)]);
    }

    #[tokio::test]
    async fn zero_timeout_still_ticks_once() {
        let clock = ManualClock::default();
        let result: Result<&str, PollError<()>> =
            poll_until(&clock, PollPolicy::from_secs(1, 0), |_| async { Tick::Ready("done") })
                .await;
        assert_eq!(result, Ok("done"));
    }

    #[tokio::test]
    async fn retry_ticks_do_not_abort() {
        let clock = ManualClock::default();
        let result: Result<&str, PollError<()>> =
            poll_until(&clock, PollPolicy::from_secs(1, 10), |attempt| async move {
                if attempt == 1 {
                    Tick::Retry("connection reset".into())
                } else {
                    Tick::Ready("ok")
                }
            })
            .await;
        assert_eq!(result, Ok("ok"));
    }

    #[tokio::test]
    async fn failure_is_terminal() {
        let clock = ManualClock::default();
        let result: Result<(), PollError<&str>> =
            poll_until(&clock, PollPolicy::from_secs(1, 10), |_| async { Tick::Failed("boom") })
                .await;
        assert_eq!(result, Err(PollError::Failed("boom")));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn hung_tick_is_abandoned_at_the_deadline() {
        let clock = ManualClock::default();
        let result: Result<(), PollError<()>> =
            poll_until(&clock, PollPolicy::from_secs(1, 5), |_| {
                std::future::pending::<Tick<(), ()>>()
            })
            .await;

        assert_eq!(
            result,
            Err(PollError::Timeout {
                attempts: 1,
                elapsed: Duration::from_secs(5)
            })
        );
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hung_tick_respects_real_deadline() {
        let clock = TokioClock::new();
        let started = tokio::time::Instant::now();
        let result: Result<(), PollError<()>> = poll_until(
            &clock,
            PollPolicy::new(Duration::from_millis(10), Duration::from_millis(50)),
            |_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Tick::Pending
            },
        )
        .await;

        assert!(matches!(result, Err(PollError::Timeout { attempts: 1, .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn tokio_clock_observes_real_time() {
        let clock = TokioClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(5)).await;
        assert!(clock.now() >= before + Duration::from_millis(5));
    }
}
