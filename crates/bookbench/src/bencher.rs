//! Timing harness.
//!
//! [`benchmark`] runs a target closure with a growing iteration count until
//! the measured time reaches the configured target, the way standard
//! micro-benchmark loops do: one iteration first, then a prediction based on
//! the previous round, padded by 20% and capped at 100x growth.
//!
//! The closure receives a [`Bencher`] and is responsible for running
//! [`Bencher::iterations`] iterations. It can stop and restart the clock
//! around work that must not be measured (seeding rows, resetting an
//! identity field) and report failures of measured calls without aborting
//! the loop. Returning `Err` from the closure aborts the benchmark.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::alloc::{self, AllocSnapshot};
use crate::config::BenchTime;
use crate::error::{Error, Result};

/// Upper bound on iterations per round.
pub const MAX_ITERATIONS: u64 = 1_000_000_000;

/// Failure messages kept per benchmark; later ones are only counted.
const MAX_RECORDED_ERRORS: usize = 5;

/// Measurement context handed to each benchmark round.
pub struct Bencher {
    n: u64,
    timer_on: bool,
    started_at: Instant,
    started_allocs: AllocSnapshot,
    elapsed: Duration,
    allocated: AllocSnapshot,
    error_count: u64,
    errors: Vec<String>,
}

impl Bencher {
    fn new() -> Self {
        Self {
            n: 0,
            timer_on: false,
            started_at: Instant::now(),
            started_allocs: AllocSnapshot::default(),
            elapsed: Duration::ZERO,
            allocated: AllocSnapshot::default(),
            error_count: 0,
            errors: Vec::new(),
        }
    }

    /// Iterations the current round must run.
    pub fn iterations(&self) -> u64 {
        self.n
    }

    /// Start (or resume) measuring.
    pub fn start_timer(&mut self) {
        if !self.timer_on {
            self.started_allocs = alloc::snapshot();
            self.started_at = Instant::now();
            self.timer_on = true;
        }
    }

    /// Stop measuring; time and allocations until the next `start_timer` are excluded.
    pub fn stop_timer(&mut self) {
        if self.timer_on {
            self.elapsed += self.started_at.elapsed();
            let now = alloc::snapshot().since(self.started_allocs);
            self.allocated.allocs += now.allocs;
            self.allocated.bytes += now.bytes;
            self.timer_on = false;
        }
    }

    /// Discard everything measured so far in this round.
    pub fn reset_timer(&mut self) {
        if self.timer_on {
            self.started_allocs = alloc::snapshot();
            self.started_at = Instant::now();
        }
        self.elapsed = Duration::ZERO;
        self.allocated = AllocSnapshot::default();
    }

    /// Run `f` with the clock stopped.
    pub fn paused<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let was_on = self.timer_on;
        self.stop_timer();
        let out = f();
        if was_on {
            self.start_timer();
        }
        out
    }

    /// Record a failed measured call as an [`Error::Operation`]. The round
    /// keeps running.
    pub fn record_error(&mut self, err: impl fmt::Display) {
        let was_on = self.timer_on;
        self.stop_timer();
        self.error_count += 1;
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(Error::Operation(err.to_string()).to_string());
        }
        if was_on {
            self.start_timer();
        }
    }

    /// Unwrap the outcome of a measured call, recording it on failure.
    pub fn check<T, E: fmt::Display>(&mut self, result: std::result::Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.record_error(err);
                None
            }
        }
    }

    /// Whether any measured call has failed.
    pub fn failed(&self) -> bool {
        self.error_count > 0
    }

    fn run_round<F>(&mut self, n: u64, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Bencher) -> Result<()>,
    {
        self.n = n;
        self.elapsed = Duration::ZERO;
        self.allocated = AllocSnapshot::default();
        self.start_timer();
        let outcome = f(self);
        self.stop_timer();
        outcome
    }

    fn into_result(self) -> BenchmarkResult {
        BenchmarkResult {
            iterations: self.n,
            elapsed: self.elapsed,
            alloc_bytes: self.allocated.bytes,
            allocs: self.allocated.allocs,
            error_count: self.error_count,
            errors: self.errors,
        }
    }
}

/// Predict the iteration count of the next round.
fn predict_iterations(goal: Duration, prev_iters: u64, prev_elapsed: Duration) -> u64 {
    let prev_ns = prev_elapsed.as_nanos().max(1);
    let predicted = goal.as_nanos() * u128::from(prev_iters) / prev_ns;
    let mut n = u64::try_from(predicted).unwrap_or(MAX_ITERATIONS);
    n = n.saturating_add(n / 5);
    n = n.min(prev_iters.saturating_mul(100));
    n = n.max(prev_iters + 1);
    n.min(MAX_ITERATIONS)
}

/// Benchmark `f` until `bench_time` is satisfied.
///
/// Growth stops early once a measured call has failed; the failing round is
/// reported as is.
pub fn benchmark<F>(bench_time: BenchTime, mut f: F) -> Result<BenchmarkResult>
where
    F: FnMut(&mut Bencher) -> Result<()>,
{
    let mut b = Bencher::new();
    match bench_time {
        BenchTime::Iterations(n) => b.run_round(n, &mut f)?,
        BenchTime::Duration(goal) => {
            b.run_round(1, &mut f)?;
            while !b.failed() && b.elapsed < goal && b.n < MAX_ITERATIONS {
                let next = predict_iterations(goal, b.n, b.elapsed);
                tracing::trace!(iterations = next, "growing benchmark round");
                b.run_round(next, &mut f)?;
            }
        }
    }
    Ok(b.into_result())
}

/// Outcome of one benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchmarkResult {
    /// Iterations in the reported round.
    pub iterations: u64,
    /// Measured time of the reported round.
    #[serde(serialize_with = "serialize_nanos")]
    pub elapsed: Duration,
    /// Bytes allocated inside the measured region.
    pub alloc_bytes: u64,
    /// Allocation calls inside the measured region.
    pub allocs: u64,
    /// Measured calls that failed.
    pub error_count: u64,
    /// First few failure messages.
    pub errors: Vec<String>,
}

impl BenchmarkResult {
    pub fn ns_per_op(&self) -> u64 {
        if self.iterations == 0 {
            return 0;
        }
        (self.elapsed.as_nanos() / u128::from(self.iterations)) as u64
    }

    pub fn bytes_per_op(&self) -> u64 {
        self.alloc_bytes.checked_div(self.iterations).unwrap_or(0)
    }

    pub fn allocs_per_op(&self) -> u64 {
        self.allocs.checked_div(self.iterations).unwrap_or(0)
    }

    pub fn failed(&self) -> bool {
        self.error_count > 0
    }
}

fn serialize_nanos<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hint::black_box;
    use std::thread::sleep;

    #[test]
    fn test_fixed_iterations() {
        let mut calls = 0;
        let result = benchmark(BenchTime::Iterations(5), |b| {
            for _ in 0..b.iterations() {
                calls += 1;
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(result.iterations, 5);
        assert_eq!(calls, 5);
        assert!(!result.failed());
    }

    #[test]
    fn test_adaptive_growth_reaches_goal() {
        let goal = Duration::from_millis(20);
        let mut rounds = Vec::new();
        let result = benchmark(BenchTime::Duration(goal), |b| {
            rounds.push(b.iterations());
            for _ in 0..b.iterations() {
                sleep(Duration::from_micros(50));
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(rounds[0], 1);
        assert!(rounds.windows(2).all(|w| w[1] > w[0]));
        assert!(rounds.windows(2).all(|w| w[1] <= w[0] * 100));
        assert!(result.iterations > 1);
        assert!(result.elapsed >= goal);
        assert_eq!(result.iterations, *rounds.last().unwrap());
    }

    #[test]
    fn test_paused_work_is_excluded() {
        let result = benchmark(BenchTime::Iterations(5), |b| {
            for _ in 0..b.iterations() {
                b.paused(|| sleep(Duration::from_millis(2)));
            }
            Ok(())
        })
        .unwrap();

        assert!(result.elapsed < Duration::from_millis(5));
    }

    #[test]
    fn test_stop_and_start_timer() {
        let result = benchmark(BenchTime::Iterations(3), |b| {
            for _ in 0..b.iterations() {
                b.stop_timer();
                sleep(Duration::from_millis(2));
                b.start_timer();
            }
            Ok(())
        })
        .unwrap();

        assert!(result.elapsed < Duration::from_millis(3));
    }

    #[test]
    fn test_reset_timer_discards_setup() {
        let result = benchmark(BenchTime::Iterations(1), |b| {
            sleep(Duration::from_millis(10));
            b.reset_timer();
            Ok(())
        })
        .unwrap();

        assert!(result.elapsed < Duration::from_millis(10));
    }

    #[test]
    fn test_measured_errors_are_recorded() {
        let result = benchmark(BenchTime::Iterations(4), |b| {
            for i in 0..b.iterations() {
                let outcome: std::result::Result<(), String> = if i % 2 == 0 {
                    Err(format!("iteration {} failed", i))
                } else {
                    Ok(())
                };
                b.check(outcome);
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(result.iterations, 4);
        assert_eq!(result.error_count, 2);
        assert_eq!(
            result.errors,
            vec![
                "operation error: iteration 0 failed",
                "operation error: iteration 2 failed"
            ]
        );
        assert!(result.failed());
    }

    #[test]
    fn test_error_messages_are_capped() {
        let result = benchmark(BenchTime::Iterations(20), |b| {
            for _ in 0..b.iterations() {
                b.record_error("boom");
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(result.error_count, 20);
        assert_eq!(result.errors.len(), MAX_RECORDED_ERRORS);
    }

    #[test]
    fn test_failure_stops_growth() {
        let result = benchmark(BenchTime::Duration(Duration::from_secs(1)), |b| {
            b.record_error("unreachable");
            Ok(())
        })
        .unwrap();

        assert_eq!(result.iterations, 1);
        assert!(result.failed());
    }

    #[test]
    fn test_setup_error_aborts() {
        let err = benchmark(BenchTime::Iterations(10), |_| {
            Err(Error::Setup("seed failed".to_string()))
        })
        .unwrap_err();

        assert!(matches!(err, Error::Setup(_)));
    }

    #[test]
    fn test_allocations_are_counted() {
        let result = benchmark(BenchTime::Iterations(100), |b| {
            for _ in 0..b.iterations() {
                let buf: Vec<u8> = black_box(Vec::with_capacity(64));
                drop(buf);
            }
            Ok(())
        })
        .unwrap();

        assert!(result.allocs_per_op() >= 1);
        assert!(result.bytes_per_op() >= 64);
    }

    #[test]
    fn test_predict_iterations() {
        let goal = Duration::from_secs(1);
        // 1 iteration took 1ms: 1000 predicted, +20%, capped at 100x.
        assert_eq!(predict_iterations(goal, 1, Duration::from_millis(1)), 100);
        // 100 iterations took 100ms: 1000 predicted, +20%.
        assert_eq!(predict_iterations(goal, 100, Duration::from_millis(100)), 1200);
        // Always grows by at least one.
        assert_eq!(predict_iterations(goal, 10, Duration::from_secs(5)), 11);
        // Never exceeds the cap.
        assert_eq!(
            predict_iterations(goal, MAX_ITERATIONS / 2, Duration::from_nanos(1)),
            MAX_ITERATIONS
        );
    }

    #[test]
    fn test_per_op_math() {
        let result = BenchmarkResult {
            iterations: 4,
            elapsed: Duration::from_nanos(1000),
            alloc_bytes: 400,
            allocs: 8,
            error_count: 0,
            errors: vec![],
        };
        assert_eq!(result.ns_per_op(), 250);
        assert_eq!(result.bytes_per_op(), 100);
        assert_eq!(result.allocs_per_op(), 2);

        let empty = BenchmarkResult { iterations: 0, ..result };
        assert_eq!(empty.ns_per_op(), 0);
        assert_eq!(empty.bytes_per_op(), 0);
    }
}
