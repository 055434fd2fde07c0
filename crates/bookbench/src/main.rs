//! Bookbench command-line entry point.

use std::io::Write;

use bookbench::{report, Args, BenchConfig, PostgresReset, Runner, StrategyRegistry, Workload};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookbench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Unknown operations are rejected here, before any strategy exists.
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> bookbench::Result<()> {
    let config = args.apply_to(BenchConfig::from_env()?);
    let registry = StrategyRegistry::builtin().select(&args.strategies)?;
    let format = args.format;
    let options = args.into_options();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        strategies = ?registry.names(),
        bench_time = %options.bench_time,
        "starting bookbench"
    );

    let strategies = registry.build(&config, Workload::from(&options));
    let reset = PostgresReset::from_config(&config);
    let run_report = Runner::new(reset, options).run(strategies);

    let rendered = report::render(&run_report, format)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", rendered)?;
    Ok(())
}
