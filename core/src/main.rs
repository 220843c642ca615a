//! LAUNCHNAV: closed-loop launch vehicle navigation simulator.
//!
//! Simulates a powered ascent from a launch site, generates noisy IMU and GPS data from the
//! truth trajectory and tracks it with the 15-state extended Kalman filter. The run is defined
//! by a scenario file (TOML/JSON/YAML) or the built-in default scenario, and the per-step
//! estimate and truth can be exported to CSV.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use launchnav::sim::{ScenarioConfig, run_scenario};

/// Command line arguments
#[derive(Parser)]
#[command(
    author,
    version,
    about = "Closed-loop launch vehicle navigation simulator (IMU/GPS extended Kalman filter)."
)]
struct Cli {
    /// Scenario configuration file (TOML/JSON/YAML); the default scenario is used if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write per-step estimate and truth to this CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the number of IMU steps
    #[arg(long)]
    steps: Option<usize>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write the default scenario to this path and exit
    #[arg(long)]
    write_default_config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Initialize the logger at `log_level`, appending to `log_file` when given.
fn init_logger(log_level: &str, log_file: Option<&Path>) -> Result<()> {
    use std::io::Write;

    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .with_context(|| format!("opening log file {}", log_path.display()))?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_deref())?;

    if let Some(path) = &cli.write_default_config {
        ScenarioConfig::default()
            .to_file(path)
            .with_context(|| format!("writing default scenario to {}", path.display()))?;
        info!("Wrote default scenario to {}", path.display());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading scenario from {}", path.display());
            ScenarioConfig::from_file(path)
                .with_context(|| format!("reading scenario {}", path.display()))?
        }
        None => ScenarioConfig::default(),
    };
    if let Some(steps) = cli.steps {
        config.steps = steps;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    let result = run_scenario(&config)?;
    let summary = result.summary();
    println!(
        "{}: {} steps, {} GPS updates, final position error {:.2} m (mean {:.2} m, max {:.2} m), final velocity error {:.3} m/s",
        result.name,
        config.steps,
        summary.gps_updates,
        summary.final_position_error,
        summary.mean_position_error,
        summary.max_position_error,
        summary.final_velocity_error
    );
    if let Some(state) = &result.final_state {
        println!("{}", state);
    }

    if let Some(path) = &cli.output {
        result
            .to_csv(path)
            .with_context(|| format!("writing results to {}", path.display()))?;
        info!("Results written to {}", path.display());
    }
    Ok(())
}
