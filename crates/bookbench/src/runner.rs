//! Runs the selected operations over every strategy and collects results.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::bencher::{benchmark, BenchmarkResult};
use crate::config::RunOptions;
use crate::operation::Operation;
use crate::reset::SchemaReset;
use crate::strategy::{run_operation, Strategy};

/// What happened to one strategy/operation pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The benchmark ran. Measured failures are counted on the result.
    Measured(BenchmarkResult),
    /// The benchmark was aborted before producing a result.
    Failed { reason: String },
    /// The strategy has no primitive for the operation.
    Skipped { reason: String },
}

impl Outcome {
    pub fn result(&self) -> Option<&BenchmarkResult> {
        match self {
            Self::Measured(result) => Some(result),
            _ => None,
        }
    }

    /// Whether the pair produced a result free of recorded errors.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Measured(result) if !result.failed())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub operation: Operation,
    pub outcome: Outcome,
}

/// Results of one strategy.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyReport {
    pub strategy: &'static str,
    /// Reset or init failure; no operation ran when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub operations: Vec<OperationReport>,
}

impl StrategyReport {
    fn new(strategy: &'static str) -> Self {
        Self {
            strategy,
            error: None,
            operations: Vec::new(),
        }
    }

    pub fn outcome(&self, op: Operation) -> Option<&Outcome> {
        self.operations
            .iter()
            .find(|report| report.operation == op)
            .map(|report| &report.outcome)
    }
}

/// Results of a whole run, strategies in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub seed: u64,
    pub operations: Vec<Operation>,
    pub strategies: Vec<StrategyReport>,
}

impl RunReport {
    pub fn strategy(&self, name: &str) -> Option<&StrategyReport> {
        self.strategies.iter().find(|report| report.strategy == name)
    }

    pub fn outcome(&self, strategy: &str, op: Operation) -> Option<&Outcome> {
        self.strategy(strategy).and_then(|report| report.outcome(op))
    }
}

/// Drives strategies one after another.
pub struct Runner<R> {
    reset: R,
    options: RunOptions,
}

impl<R: SchemaReset> Runner<R> {
    pub fn new(reset: R, options: RunOptions) -> Self {
        Self { reset, options }
    }

    /// Run every selected operation on every strategy, in seeded random order.
    pub fn run(&self, mut strategies: Vec<Box<dyn Strategy>>) -> RunReport {
        let mut rng = StdRng::seed_from_u64(self.options.seed);
        strategies.shuffle(&mut rng);

        let operations = self.options.selector.operations();
        let order: Vec<_> = strategies.iter().map(|s| s.name()).collect();
        tracing::info!(
            seed = self.options.seed,
            order = ?order,
            operation = %self.options.selector,
            "starting benchmark run"
        );

        let reports = strategies
            .iter_mut()
            .map(|strategy| self.run_strategy(strategy.as_mut(), &operations))
            .collect();

        RunReport {
            seed: self.options.seed,
            operations,
            strategies: reports,
        }
    }

    fn run_strategy(&self, strategy: &mut dyn Strategy, operations: &[Operation]) -> StrategyReport {
        let name = strategy.name();
        let mut report = StrategyReport::new(name);

        if let Err(e) = self.reset.reset() {
            tracing::error!(strategy = name, error = %e, "schema reset failed");
            report.error = Some(e.to_string());
            return report;
        }

        if let Err(e) = strategy.init() {
            tracing::error!(strategy = name, error = %e, "init failed");
            report.error = Some(e.to_string());
            if let Err(e) = strategy.close() {
                tracing::warn!(strategy = name, error = %e, "close failed");
            }
            return report;
        }

        for &op in operations {
            let outcome = match benchmark(self.options.bench_time, |b| run_operation(strategy, op, b)) {
                Ok(result) => {
                    if result.failed() {
                        tracing::warn!(
                            strategy = name,
                            operation = %op,
                            errors = result.error_count,
                            first = result.errors.first().map(String::as_str).unwrap_or_default(),
                            "measured calls failed"
                        );
                    } else {
                        tracing::info!(
                            strategy = name,
                            operation = %op,
                            iterations = result.iterations,
                            ns_per_op = result.ns_per_op(),
                            "benchmark finished"
                        );
                    }
                    Outcome::Measured(result)
                }
                Err(e) if e.is_unsupported() => {
                    tracing::info!(strategy = name, operation = %op, "skipped: {}", e);
                    Outcome::Skipped { reason: e.to_string() }
                }
                Err(e) => {
                    tracing::error!(strategy = name, operation = %op, error = %e, "benchmark aborted");
                    Outcome::Failed { reason: e.to_string() }
                }
            };
            report.operations.push(OperationReport { operation: op, outcome });
        }

        if let Err(e) = strategy.close() {
            tracing::warn!(strategy = name, error = %e, "close failed");
        }
        report
    }
}
