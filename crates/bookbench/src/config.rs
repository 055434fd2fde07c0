//! Benchmark configuration.
//!
//! Connection settings come from the environment (optionally seeded from a
//! `.env` file); run options come from the command line.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::{Error, Result};
use crate::operation::OperationSelector;

/// Environment variable holding the PostgreSQL connection string.
pub const DSN_VAR: &str = "POSTGRES_DSN";

/// Environment variable bounding pool size.
pub const MAX_OPEN_CONN_VAR: &str = "POSTGRES_MAX_OPEN_CONN";

/// Environment variable for connections kept open while idle.
pub const MAX_IDLE_CONN_VAR: &str = "POSTGRES_MAX_IDLE_CONN";

/// Default pool size.
pub const DEFAULT_MAX_OPEN_CONN: u32 = 10;

/// Default idle connections.
pub const DEFAULT_MAX_IDLE_CONN: u32 = 2;

/// Books per `insert-bulk` call.
pub const DEFAULT_BULK_SIZE: usize = 2000;

/// Largest accepted bulk size (6 bind parameters per row must stay under 65535).
pub const MAX_BULK_SIZE: usize = 5000;

/// Books per batched statement when seeding.
pub const SEED_BATCH_SIZE: usize = 10_000;

/// Rows per page for `select-paginating`.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Default time allowed for acquiring a connection.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Target measured time per benchmark.
pub const DEFAULT_BENCH_TIME: Duration = Duration::from_secs(1);

/// Connection settings shared by every strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// PostgreSQL connection string.
    pub dsn: String,

    /// Upper bound on pooled connections.
    pub max_open_conns: u32,

    /// Connections kept open while idle.
    pub max_idle_conns: u32,

    /// Time allowed for acquiring a connection.
    pub connect_timeout: Duration,
}

impl BenchConfig {
    /// Create a configuration for the given connection string.
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            max_open_conns: DEFAULT_MAX_OPEN_CONN,
            max_idle_conns: DEFAULT_MAX_IDLE_CONN,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Set the pool size.
    pub fn with_max_open_conns(mut self, conns: u32) -> Self {
        self.max_open_conns = conns.max(1);
        self
    }

    /// Set the idle connection count.
    pub fn with_max_idle_conns(mut self, conns: u32) -> Self {
        self.max_idle_conns = conns;
        self
    }

    /// Set the connection acquisition timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dsn = lookup(DSN_VAR)
            .filter(|dsn| !dsn.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{} is required", DSN_VAR)))?;

        let mut config = Self::new(dsn);
        if let Some(value) = lookup(MAX_OPEN_CONN_VAR) {
            config = config.with_max_open_conns(parse_count(MAX_OPEN_CONN_VAR, &value)?);
        }
        if let Some(value) = lookup(MAX_IDLE_CONN_VAR) {
            config = config.with_max_idle_conns(parse_count(MAX_IDLE_CONN_VAR, &value)?);
        }
        // Idle connections can never exceed the pool.
        config.max_idle_conns = config.max_idle_conns.min(config.max_open_conns);
        Ok(config)
    }
}

fn parse_count(var: &str, value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(0) => Err(Error::Config(format!("{} must be a positive integer, got 0", var))),
        Ok(n) => Ok(n),
        Err(e) => Err(Error::Config(format!("{} must be a positive integer: {}", var, e))),
    }
}

/// How long each benchmark runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchTime {
    /// Grow the iteration count until the measured time reaches the target.
    Duration(Duration),
    /// Run exactly this many iterations, once.
    Iterations(u64),
}

impl Default for BenchTime {
    fn default() -> Self {
        BenchTime::Duration(DEFAULT_BENCH_TIME)
    }
}

impl fmt::Display for BenchTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchTime::Duration(d) => write!(f, "{}", humantime::format_duration(*d)),
            BenchTime::Iterations(n) => write!(f, "{}x", n),
        }
    }
}

impl FromStr for BenchTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(count) = s.strip_suffix('x') {
            let n = count
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("invalid iteration count '{}': {}", s, e)))?;
            if n == 0 {
                return Err(Error::Config("iteration count must be positive".to_string()));
            }
            return Ok(BenchTime::Iterations(n));
        }
        let d = humantime::parse_duration(s)
            .map_err(|e| Error::Config(format!("invalid bench time '{}': {}", s, e)))?;
        if d.is_zero() {
            return Err(Error::Config("bench time must be positive".to_string()));
        }
        Ok(BenchTime::Duration(d))
    }
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned plain-text table
    #[default]
    Table,
    /// JSON document
    Json,
}

/// Options for one benchmark run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Operations to benchmark.
    pub selector: OperationSelector,

    /// Measured time (or iteration count) per benchmark.
    pub bench_time: BenchTime,

    /// Books per `insert-bulk` call.
    pub bulk_size: usize,

    /// Rows per `select-paginating` page.
    pub page_size: usize,

    /// Seed for the strategy shuffle.
    pub seed: u64,
}

impl RunOptions {
    /// Options with defaults and the given shuffle seed.
    pub fn new(seed: u64) -> Self {
        Self {
            selector: OperationSelector::default(),
            bench_time: BenchTime::default(),
            bulk_size: DEFAULT_BULK_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            seed,
        }
    }

    pub fn with_selector(mut self, selector: OperationSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_bench_time(mut self, bench_time: BenchTime) -> Self {
        self.bench_time = bench_time;
        self
    }

    pub fn with_bulk_size(mut self, size: usize) -> Self {
        self.bulk_size = size.clamp(1, MAX_BULK_SIZE);
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new(time_seed())
    }
}

/// Seed derived from the wall clock.
pub fn time_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "bookbench")]
#[command(version, about = "Compare PostgreSQL data-access libraries", long_about = None)]
pub struct Args {
    /// Operation to benchmark, or "all".
    #[arg(short, long, default_value = "select-one")]
    pub operation: OperationSelector,

    /// Strategies to run (repeatable). Defaults to every registered strategy.
    #[arg(short, long = "strategy")]
    pub strategies: Vec<String>,

    /// Measured time per benchmark ("1s", "250ms") or a fixed iteration count ("100x").
    #[arg(long, default_value = "1s")]
    pub bench_time: BenchTime,

    /// Books per insert-bulk call.
    #[arg(long, default_value_t = DEFAULT_BULK_SIZE as u64,
          value_parser = clap::value_parser!(u64).range(1..=MAX_BULK_SIZE as u64))]
    pub bulk_size: u64,

    /// Rows per select-paginating page.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE as u64,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub page_size: u64,

    /// Seed for the strategy shuffle (defaults to the clock).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Report format.
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Seconds allowed for acquiring a database connection.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,
}

impl Args {
    /// Apply connection flags to an environment configuration.
    pub fn apply_to(&self, config: BenchConfig) -> BenchConfig {
        config.with_connect_timeout(Duration::from_secs(self.connect_timeout.max(1)))
    }

    /// Convert command-line arguments to run options.
    pub fn into_options(self) -> RunOptions {
        RunOptions::new(self.seed.unwrap_or_else(time_seed))
            .with_selector(self.operation)
            .with_bench_time(self.bench_time)
            .with_bulk_size(self.bulk_size as usize)
            .with_page_size(self.page_size as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_dsn_is_fatal() {
        let err = BenchConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(DSN_VAR));
    }

    #[test]
    fn test_blank_dsn_is_fatal() {
        let err = BenchConfig::from_lookup(lookup(&[(DSN_VAR, "  ")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_pool_defaults() {
        let config =
            BenchConfig::from_lookup(lookup(&[(DSN_VAR, "postgres://localhost/books")])).unwrap();
        assert_eq!(config.dsn, "postgres://localhost/books");
        assert_eq!(config.max_open_conns, DEFAULT_MAX_OPEN_CONN);
        assert_eq!(config.max_idle_conns, DEFAULT_MAX_IDLE_CONN);
        assert_eq!(
            config.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_pool_sizing_from_env() {
        let config = BenchConfig::from_lookup(lookup(&[
            (DSN_VAR, "postgres://localhost/books"),
            (MAX_OPEN_CONN_VAR, "20"),
            (MAX_IDLE_CONN_VAR, "40"),
        ]))
        .unwrap();
        assert_eq!(config.max_open_conns, 20);
        assert_eq!(config.max_idle_conns, 20);
    }

    #[test]
    fn test_invalid_pool_size() {
        let err = BenchConfig::from_lookup(lookup(&[
            (DSN_VAR, "postgres://localhost/books"),
            (MAX_OPEN_CONN_VAR, "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(MAX_OPEN_CONN_VAR));
    }

    #[test]
    fn test_zero_pool_sizes_are_rejected() {
        for var in [MAX_OPEN_CONN_VAR, MAX_IDLE_CONN_VAR] {
            let err = BenchConfig::from_lookup(lookup(&[
                (DSN_VAR, "postgres://localhost/books"),
                (var, "0"),
            ]))
            .unwrap_err();
            assert!(matches!(err, Error::Config(_)));
            assert!(err.to_string().contains(var), "{}", err);
            assert!(err.to_string().contains("positive"), "{}", err);
        }
    }

    #[test]
    fn test_bench_time_parsing() {
        assert_eq!(
            "250ms".parse::<BenchTime>().unwrap(),
            BenchTime::Duration(Duration::from_millis(250))
        );
        assert_eq!("100x".parse::<BenchTime>().unwrap(), BenchTime::Iterations(100));
        assert!("0x".parse::<BenchTime>().is_err());
        assert!("0s".parse::<BenchTime>().is_err());
        assert!("soon".parse::<BenchTime>().is_err());
        assert_eq!(BenchTime::Iterations(7).to_string(), "7x");
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["bookbench"]);
        let options = args.into_options();
        assert_eq!(options.selector, OperationSelector::One(Operation::FindOne));
        assert_eq!(options.bench_time, BenchTime::default());
        assert_eq!(options.bulk_size, DEFAULT_BULK_SIZE);
        assert_eq!(options.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_args_full() {
        let args = Args::parse_from([
            "bookbench",
            "--operation",
            "all",
            "--strategy",
            "sqlx",
            "--strategy",
            "sea-orm",
            "--bench-time",
            "10x",
            "--bulk-size",
            "200",
            "--seed",
            "42",
            "--format",
            "json",
            "--connect-timeout",
            "3",
        ]);
        let config = args.apply_to(BenchConfig::new("postgres://localhost/books"));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(args.strategies, vec!["sqlx", "sea-orm"]);
        assert_eq!(args.format, OutputFormat::Json);
        let options = args.into_options();
        assert_eq!(options.selector, OperationSelector::All);
        assert_eq!(options.bench_time, BenchTime::Iterations(10));
        assert_eq!(options.bulk_size, 200);
        assert_eq!(options.seed, 42);
    }

    #[test]
    fn test_args_reject_bogus_operation() {
        let err = Args::try_parse_from(["bookbench", "--operation", "bogus-op"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_args_reject_oversized_bulk() {
        assert!(Args::try_parse_from(["bookbench", "--bulk-size", "100000"]).is_err());
    }
}
