//! `acoustic-model` - trains one recurrent model on a sensor CSV and prints
//! its test MAE.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sonar_cli::{log_filter, Cli};

fn main() -> Result<()> {
    // Initialize tracing subscriber with environment filter
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(directives.as_deref());
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();

    let report = sonar_cli::run(&cli)?;
    info!(checkpoint = %report.checkpoint_path.display(), "Training completed");
    println!("{}", report.summary_line());
    Ok(())
}
