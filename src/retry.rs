//! Bounded retry with exponential backoff.
//!
//! Each failure of the wrapped operation is classified as
//! [`Classified::Retryable`] or [`Classified::Fatal`]. Fatal errors abort
//! immediately. Retryable errors are absorbed until `max_retries` retries
//! have been spent, sleeping between attempts. An exhausted operation
//! surfaces its last error bundled with the executor's [`RetryStats`].
//!
//! Two backoff strategies are available:
//!
//! - [`BackoffStrategy::Accumulating`] carries a delay that starts at
//!   `initial_delay` and is multiplied by `backoff_factor` after every retry.
//! - [`BackoffStrategy::Exponential`] computes `initial_delay *
//!   backoff_factor^i` afresh for retry `i` (0-indexed).

use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified<E> {
    Retryable(E),
    Fatal(E),
}

impl<E> Classified<E> {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Classified::Retryable(_))
    }

    pub fn into_inner(self) -> E {
        match self {
            Classified::Retryable(e) | Classified::Fatal(e) => e,
        }
    }
}

/// Errors that know whether they are worth retrying.
pub trait Transience {
    fn is_transient(&self) -> bool;
}

impl Transience for io::Error {
    /// Would-block, interrupted, timed-out and connection-class errors are
    /// transient, as is any error without an errno. Everything else carries
    /// a definite errno and is not.
    fn is_transient(&self) -> bool {
        match self.kind() {
            io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe => true,
            _ => self.raw_os_error().is_none(),
        }
    }
}

/// Default classification.
pub fn classify<E: Transience>(err: E) -> Classified<E> {
    if err.is_transient() {
        Classified::Retryable(err)
    } else {
        Classified::Fatal(err)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(with = "secs_f64")]
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    /// Upper bound on any single delay.
    #[serde(with = "secs_f64")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Delay before retry `index` under the exponential strategy.
    pub fn delay_for(&self, index: u32) -> Duration {
        let exponent = i32::try_from(index).unwrap_or(i32::MAX);
        self.scale(self.initial_delay, self.backoff_factor.powi(exponent))
    }

    fn scale(&self, delay: Duration, factor: f64) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Counters accumulated by a [`RetryExecutor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// Every invocation of the wrapped operation.
    pub total_attempts: u32,
    /// Operations that succeeded after at least one failed attempt.
    pub successful_retries: u32,
    /// Operations that ended in an error, fatal or exhausted.
    pub failed_retries: u32,
    /// Time spent sleeping between attempts.
    pub total_retry_time: Duration,
    /// Message of every failed attempt, in order.
    pub retry_errors: Vec<String>,
}

impl RetryStats {
    /// Fold another set of counters into this one.
    pub fn merge(&mut self, other: &RetryStats) {
        self.total_attempts += other.total_attempts;
        self.successful_retries += other.successful_retries;
        self.failed_retries += other.failed_retries;
        self.total_retry_time += other.total_retry_time;
        self.retry_errors.extend(other.retry_errors.iter().cloned());
    }
}

/// Terminal failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("{source}")]
    Fatal { source: E, attempts: u32 },

    #[error("{source} (gave up after {attempts} attempts)")]
    Exhausted {
        source: E,
        attempts: u32,
        stats: RetryStats,
    },
}

impl<E> RetryError<E> {
    /// The last error the operation returned.
    pub fn source_error(&self) -> &E {
        match self {
            RetryError::Fatal { source, .. } | RetryError::Exhausted { source, .. } => source,
        }
    }

    pub fn into_source(self) -> E {
        match self {
            RetryError::Fatal { source, .. } | RetryError::Exhausted { source, .. } => source,
        }
    }

    /// How many times the operation ran.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// How the delay between attempts evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Accumulating,
    Exponential,
}

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Runs fallible operations with bounded retries.
pub struct RetryExecutor {
    config: RetryConfig,
    stats: RetryStats,
    sleeper: Sleeper,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        RetryExecutor::new(RetryConfig::default())
    }
}

impl RetryExecutor {
    /// Create an executor that sleeps the calling thread between attempts.
    pub fn new(config: RetryConfig) -> Self {
        RetryExecutor {
            config,
            stats: RetryStats::default(),
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the function used to wait between attempts.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn stats(&self) -> &RetryStats {
        &self.stats
    }

    pub fn clear_stats(&mut self) {
        self.stats = RetryStats::default();
    }

    /// Retry with the accumulating delay and default classification.
    pub fn retry<T, E, F>(&mut self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Transience + fmt::Display,
    {
        self.run(BackoffStrategy::Accumulating, op, classify)
    }

    /// Retry with pure exponential backoff and default classification.
    pub fn retry_with_backoff<T, E, F>(&mut self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Transience + fmt::Display,
    {
        self.run(BackoffStrategy::Exponential, op, classify)
    }

    /// Retry with exponential backoff.
    pub fn execute<T, E, F>(&mut self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Transience + fmt::Display,
    {
        self.retry_with_backoff(op)
    }

    /// Retry with exponential backoff, classifying failures with `classifier`
    /// instead of the default rules.
    pub fn execute_with<T, E, F, C>(&mut self, op: F, classifier: C) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        C: Fn(E) -> Classified<E>,
        E: fmt::Display,
    {
        self.run(BackoffStrategy::Exponential, op, classifier)
    }

    /// The retry loop shared by every entry point.
    pub fn run<T, E, F, C>(
        &mut self,
        strategy: BackoffStrategy,
        mut op: F,
        classifier: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        C: Fn(E) -> Classified<E>,
        E: fmt::Display,
    {
        let mut carried = self.config.initial_delay;
        let mut retries = 0u32;

        loop {
            self.stats.total_attempts += 1;
            let attempts = retries + 1;

            let err = match op() {
                Ok(value) => {
                    if retries > 0 {
                        self.stats.successful_retries += 1;
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            self.stats
                .retry_errors
                .push(format!("attempt {}: {}", attempts, err));

            let err = match classifier(err) {
                Classified::Fatal(err) => {
                    self.stats.failed_retries += 1;
                    tracing::debug!("Attempt {} failed with a fatal error: {}", attempts, err);
                    return Err(RetryError::Fatal {
                        source: err,
                        attempts,
                    });
                }
                Classified::Retryable(err) => err,
            };

            if retries >= self.config.max_retries {
                self.stats.failed_retries += 1;
                tracing::debug!("Giving up after {} attempts: {}", attempts, err);
                return Err(RetryError::Exhausted {
                    source: err,
                    attempts,
                    stats: self.stats.clone(),
                });
            }

            let delay = match strategy {
                BackoffStrategy::Accumulating => {
                    let delay = carried.min(self.config.max_delay);
                    carried = self.config.scale(carried, self.config.backoff_factor);
                    delay
                }
                BackoffStrategy::Exponential => self.config.delay_for(retries),
            };

            tracing::warn!(
                "Attempt {}/{} failed: {}; retrying in {:.1}s",
                attempts,
                self.config.max_retries + 1,
                err,
                delay.as_secs_f64()
            );

            (self.sleeper)(delay);
            self.stats.total_retry_time += delay;
            retries += 1;
        }
    }
}

mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Transient(&'static str),
        Permanent(&'static str),
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                TestError::Transient(m) => write!(f, "transient: {}", m),
                TestError::Permanent(m) => write!(f, "permanent: {}", m),
            }
        }
    }

    impl Transience for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Transient(_))
        }
    }

    fn recording_executor(config: RetryConfig) -> (RetryExecutor, Arc<Mutex<Vec<Duration>>>) {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&sleeps);
        let executor = RetryExecutor::new(config).with_sleeper(move |d| log.lock().unwrap().push(d));
        (executor, sleeps)
    }

    #[test]
    fn test_exhaustion_runs_max_retries_plus_one() {
        let (mut executor, sleeps) = recording_executor(RetryConfig::default());
        let mut calls = 0;

        let result: Result<(), _> = executor.execute(|| {
            calls += 1;
            Err(TestError::Transient("locked"))
        });

        assert_eq!(calls, 4);
        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 4);
        assert_eq!(err.source_error(), &TestError::Transient("locked"));

        assert_eq!(
            *sleeps.lock().unwrap(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );

        let stats = executor.stats();
        assert_eq!(stats.total_attempts, 4);
        assert_eq!(stats.failed_retries, 1);
        assert_eq!(stats.total_retry_time, Duration::from_secs(7));
        assert_eq!(stats.retry_errors.len(), 4);
    }

    #[test]
    fn test_fatal_aborts_without_sleeping() {
        let (mut executor, sleeps) = recording_executor(RetryConfig::default());
        let mut calls = 0;

        let result: Result<(), _> = executor.execute(|| {
            calls += 1;
            Err(TestError::Permanent("bad argument"))
        });

        assert_eq!(calls, 1);
        let err = result.unwrap_err();
        assert!(!err.is_exhausted());
        assert_eq!(err.attempts(), 1);
        assert!(sleeps.lock().unwrap().is_empty());
        assert_eq!(executor.stats().failed_retries, 1);
        assert_eq!(executor.stats().total_retry_time, Duration::ZERO);
    }

    #[test]
    fn test_recovery_counts_successful_retry() {
        let (mut executor, sleeps) = recording_executor(RetryConfig::default());
        let mut calls = 0;

        let value = executor
            .execute(|| {
                calls += 1;
                if calls < 3 {
                    Err(TestError::Transient("busy"))
                } else {
                    Ok(42)
                }
            })
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(sleeps.lock().unwrap().len(), 2);
        assert_eq!(executor.stats().total_attempts, 3);
        assert_eq!(executor.stats().successful_retries, 1);
        assert_eq!(executor.stats().failed_retries, 0);
    }

    #[test]
    fn test_first_try_success_is_not_a_retry() {
        let (mut executor, _) = recording_executor(RetryConfig::default());
        let value: Result<u8, RetryError<TestError>> = executor.execute(|| Ok(1));

        assert_eq!(value.unwrap(), 1);
        assert_eq!(executor.stats().total_attempts, 1);
        assert_eq!(executor.stats().successful_retries, 0);
    }

    #[test]
    fn test_classifier_overrides_defaults() {
        let (mut executor, sleeps) = recording_executor(RetryConfig::default());
        let mut calls = 0;

        // Treat everything as fatal, even transient errors.
        let result: Result<(), _> = executor.execute_with(
            || {
                calls += 1;
                Err(TestError::Transient("locked"))
            },
            Classified::Fatal,
        );

        assert_eq!(calls, 1);
        assert!(!result.unwrap_err().is_exhausted());
        assert!(sleeps.lock().unwrap().is_empty());

        // And everything as retryable.
        let mut calls = 0;
        let result: Result<(), _> = executor.execute_with(
            || {
                calls += 1;
                Err(TestError::Permanent("nope"))
            },
            Classified::Retryable,
        );
        assert_eq!(calls, 4);
        assert!(result.unwrap_err().is_exhausted());
    }

    #[test]
    fn test_strategies_produce_same_schedule() {
        let config = RetryConfig {
            max_retries: 4,
            initial_delay: Duration::from_millis(100),
            backoff_factor: 3.0,
            ..RetryConfig::default()
        };

        let (mut accumulating, acc_sleeps) = recording_executor(config);
        let _: Result<(), _> = accumulating.retry(|| Err(TestError::Transient("x")));

        let (mut exponential, exp_sleeps) = recording_executor(config);
        let _: Result<(), _> = exponential.retry_with_backoff(|| Err(TestError::Transient("x")));

        let expected: Vec<Duration> = [100u64, 300, 900, 2700]
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect();

        let close = |a: &[Duration], b: &[Duration]| {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|(x, y)| (x.as_secs_f64() - y.as_secs_f64()).abs() < 1e-6)
        };

        assert!(close(&acc_sleeps.lock().unwrap(), &expected));
        assert!(close(&exp_sleeps.lock().unwrap(), &expected));
    }

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(5),
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for(0), Duration::from_secs(1));
        assert_eq!(config.delay_for(2), Duration::from_secs(4));
        assert_eq!(config.delay_for(3), Duration::from_secs(5));
        assert_eq!(config.delay_for(500), Duration::from_secs(5));
    }

    #[test]
    fn test_stats_accumulate_until_cleared() {
        let (mut executor, _) = recording_executor(RetryConfig::default());
        let _: Result<(), _> = executor.execute(|| Err(TestError::Permanent("a")));
        let _: Result<(), _> = executor.execute(|| Err(TestError::Permanent("b")));

        assert_eq!(executor.stats().total_attempts, 2);
        assert_eq!(executor.stats().failed_retries, 2);

        executor.clear_stats();
        assert_eq!(executor.stats(), &RetryStats::default());
    }

    #[test]
    fn test_io_error_classification() {
        let would_block = io::Error::from_raw_os_error(11);
        let interrupted = io::Error::from(io::ErrorKind::Interrupted);
        let no_errno = io::Error::new(io::ErrorKind::Other, "something odd");
        let not_found = io::Error::from_raw_os_error(2);

        if cfg!(target_os = "linux") {
            // EAGAIN
            assert!(classify(would_block).is_retryable());
        }
        if cfg!(unix) {
            // ENOENT
            assert!(!classify(not_found).is_retryable());
        }
        assert!(classify(interrupted).is_retryable());
        assert!(classify(no_errno).is_retryable());
    }

    #[test]
    fn test_config_deserializes_seconds() {
        let config: RetryConfig =
            toml::from_str("max_retries = 5\ninitial_delay = 0.5\nbackoff_factor = 1.5").unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.backoff_factor, 1.5);
        assert_eq!(config.max_delay, Duration::from_secs(60));
    }
}
