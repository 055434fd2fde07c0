//! Bookbench: PostgreSQL data-access library comparison
//!
//! Runs the same six operations over a `books` table with several client
//! libraries and reports time, allocated bytes and allocation count per
//! operation.
//!
//! # Strategies
//!
//! - **sqlx**: raw SQL through an sqlx pool
//! - **tokio-postgres**: prepared statements and binary `COPY`
//! - **sqlx-builder**: statements assembled with `QueryBuilder`
//! - **sea-orm**: SeaORM entities and active models
//! - **diesel**: Diesel's typed query DSL over `diesel-async`
//!
//! Every strategy implements [`Strategy`]; the [`Runner`] resets the schema
//! before each one, times each operation with [`bencher::benchmark`] and
//! collects a [`RunReport`].

pub mod alloc;
pub mod bencher;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod model;
pub mod operation;
pub mod pagination;
pub mod report;
pub mod reset;
pub mod runner;
pub mod strategy;

pub use bencher::{benchmark, Bencher, BenchmarkResult};
pub use config::{Args, BenchConfig, BenchTime, OutputFormat, RunOptions};
pub use error::{Error, Result};
pub use model::Book;
pub use operation::{Operation, OperationSelector};
pub use reset::{PostgresReset, SchemaReset};
pub use runner::{Outcome, RunReport, Runner, StrategyReport};
pub use strategy::{Strategy, StrategyRegistry, Workload};
