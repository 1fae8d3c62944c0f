//! Wall-clock deadline for one execution attempt.
//!
//! Every execution runs on its own blocking worker with its own
//! [`Deadline`], so there is no process-wide interrupt state to install or
//! restore and concurrent executions cannot clobber each other.
//!
//! Two mechanisms stop a script:
//!
//! 1. **Cooperative**: the interpreter polls [`Deadline::should_stop`] from its
//!    progress hook, so pure computation loops are terminated mid-loop.
//! 2. **Abandonment**: if the worker has not returned `grace` after the limit
//!    (for example because it is blocked inside a service call), the caller
//!    gets [`Interrupt::TimedOut`] immediately and the worker's token is
//!    cancelled so it stops at its next check.
//!
//! Side effects already issued before the deadline are not rolled back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const RUNNING: u8 = 0;
const EXPIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Why a guarded execution did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The deadline elapsed.
    TimedOut { limit: Duration },
    /// The caller cancelled the execution.
    Cancelled,
    /// The worker panicked.
    Panicked,
}

/// Deadline handle shared with the running script.
#[derive(Debug, Clone)]
pub struct Deadline {
    limit: Duration,
    started: Instant,
    token: CancellationToken,
    state: Arc<AtomicU8>,
}

impl Deadline {
    /// Start a deadline of `limit` from now.
    pub fn start(limit: Duration, token: CancellationToken) -> Self {
        Self {
            limit,
            started: Instant::now(),
            token,
            state: Arc::new(AtomicU8::new(RUNNING)),
        }
    }

    /// The configured limit.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Time since the deadline started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the limit (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }

    /// True once the limit has elapsed.
    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.limit
    }

    /// The cancellation token observed by this deadline.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Check whether the script must stop now.
    ///
    /// The first reason observed (cancellation or expiry) is latched and
    /// reported by [`run_with_deadline`].
    pub fn should_stop(&self) -> bool {
        match self.state.load(Ordering::Acquire) {
            RUNNING => {}
            _ => return true,
        }

        let next = if self.token.is_cancelled() {
            CANCELLED
        } else if self.is_expired() {
            EXPIRED
        } else {
            return false;
        };

        // Keep whichever reason was latched first.
        let _ = self
            .state
            .compare_exchange(RUNNING, next, Ordering::AcqRel, Ordering::Acquire);
        true
    }

    fn interrupt(&self) -> Option<Interrupt> {
        match self.state.load(Ordering::Acquire) {
            EXPIRED => Some(Interrupt::TimedOut { limit: self.limit }),
            CANCELLED => Some(Interrupt::Cancelled),
            _ => None,
        }
    }
}

/// Run `work` on a blocking worker under a deadline.
///
/// Returns as soon as the worker finishes, the caller cancels `cancel`, or
/// `limit + grace` elapses, whichever comes first. In the last two cases the
/// worker is abandoned and its token cancelled.
pub async fn run_with_deadline<T, F>(
    limit: Duration,
    grace: Duration,
    cancel: &CancellationToken,
    work: F,
) -> Result<T, Interrupt>
where
    F: FnOnce(Deadline) -> T + Send + 'static,
    T: Send + 'static,
{
    let token = cancel.child_token();
    let _stop_worker = token.clone().drop_guard();
    let deadline = Deadline::start(limit, token);
    let observed = deadline.clone();

    let worker = tokio::task::spawn_blocking(move || work(deadline));

    tokio::select! {
        joined = worker => match joined {
            Ok(value) => {
                // A worker that finished late without polling still overran.
                observed.should_stop();
                match observed.interrupt() {
                    Some(interrupt) => Err(interrupt),
                    None => Ok(value),
                }
            }
            Err(e) => {
                warn!(error = %e, "sandbox worker did not complete");
                Err(Interrupt::Panicked)
            }
        },
        _ = cancel.cancelled() => {
            debug!(elapsed_ms = observed.elapsed().as_millis() as u64, "execution cancelled by caller");
            Err(Interrupt::Cancelled)
        }
        _ = tokio::time::sleep(limit + grace) => {
            warn!(
                timeout_ms = limit.as_millis() as u64,
                "sandbox worker unresponsive after deadline, abandoning it"
            );
            Err(Interrupt::TimedOut { limit })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_deadline_does_not_stop() {
        let deadline = Deadline::start(Duration::from_secs(60), CancellationToken::new());
        assert!(!deadline.should_stop());
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() > Duration::from_secs(59));
        assert_eq!(deadline.interrupt(), None);
    }

    #[test]
    fn test_zero_limit_expires_immediately() {
        let deadline = Deadline::start(Duration::ZERO, CancellationToken::new());
        assert!(deadline.should_stop());
        assert_eq!(
            deadline.interrupt(),
            Some(Interrupt::TimedOut {
                limit: Duration::ZERO
            })
        );
    }

    #[test]
    fn test_cancellation_latches_first_reason() {
        let token = CancellationToken::new();
        let deadline = Deadline::start(Duration::from_secs(60), token.clone());
        token.cancel();
        assert!(deadline.should_stop());
        assert_eq!(deadline.interrupt(), Some(Interrupt::Cancelled));
        // Clones observe the same latch.
        assert!(deadline.clone().should_stop());
    }

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let cancel = CancellationToken::new();
        let result =
            run_with_deadline(Duration::from_secs(5), Duration::ZERO, &cancel, |_| 40 + 2).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_cooperative_loop_times_out() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let result = run_with_deadline(
            Duration::from_millis(200),
            Duration::from_secs(5),
            &cancel,
            |deadline| {
                let mut spins: u64 = 0;
                while !deadline.should_stop() {
                    spins = spins.wrapping_add(1);
                }
                spins
            },
        )
        .await;

        assert_eq!(
            result,
            Err(Interrupt::TimedOut {
                limit: Duration::from_millis(200)
            })
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_unresponsive_worker_is_abandoned() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let result = run_with_deadline(
            Duration::from_millis(100),
            Duration::from_millis(100),
            &cancel,
            |deadline| {
                // Ignores the deadline until its token is cancelled.
                while !deadline.token().is_cancelled() {
                    std::thread::sleep(Duration::from_millis(10));
                }
            },
        )
        .await;

        assert!(matches!(result, Err(Interrupt::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_late_finish_without_polling_times_out() {
        let cancel = CancellationToken::new();
        let result = run_with_deadline(
            Duration::from_millis(50),
            Duration::from_secs(5),
            &cancel,
            |_| {
                std::thread::sleep(Duration::from_millis(200));
                "done"
            },
        )
        .await;
        assert_eq!(
            result,
            Err(Interrupt::TimedOut {
                limit: Duration::from_millis(50)
            })
        );
    }

    #[tokio::test]
    async fn test_caller_cancellation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = run_with_deadline(
            Duration::from_secs(30),
            Duration::ZERO,
            &cancel,
            |deadline| while !deadline.should_stop() {},
        )
        .await;

        assert_eq!(result, Err(Interrupt::Cancelled));
    }

    #[tokio::test]
    async fn test_worker_panic_is_contained() {
        let cancel = CancellationToken::new();
        let result: Result<(), Interrupt> =
            run_with_deadline(Duration::from_secs(5), Duration::ZERO, &cancel, |_| {
                panic!("capability fault")
            })
            .await;
        assert_eq!(result, Err(Interrupt::Panicked));
    }

    #[tokio::test]
    async fn test_guard_reusable_after_timeout() {
        let cancel = CancellationToken::new();
        let first = run_with_deadline(
            Duration::from_millis(50),
            Duration::from_secs(1),
            &cancel,
            |deadline| while !deadline.should_stop() {},
        )
        .await;
        assert!(matches!(first, Err(Interrupt::TimedOut { .. })));

        let second =
            run_with_deadline(Duration::from_secs(5), Duration::ZERO, &cancel, |_| "ok").await;
        assert_eq!(second, Ok("ok"));
    }
}
