//! Partitioned forage simulation - command line runner

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use simulation::{RunReport, SimConfig, TracingObserver};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "forage-sim")]
#[command(about = "Partitioned forage simulation across message-passing units")]
struct Cli {
    /// TOML file with any subset of the run parameters
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    units: Option<usize>,
    #[arg(long)]
    threads: Option<usize>,
    #[arg(long)]
    cycles: Option<u64>,
    #[arg(long)]
    agents: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,
    /// Write the per-cycle metrics stream here as JSON lines
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(units) = cli.units {
        config.units = units;
    }
    if let Some(threads) = cli.threads {
        config.threads_per_unit = Some(threads);
    }
    if let Some(cycles) = cli.cycles {
        config.cycles = cycles;
    }
    if let Some(agents) = cli.agents {
        config.agents = agents;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    let report = simulation::run(&config, &TracingObserver).context("simulation aborted")?;

    if let Some(path) = &cli.out {
        write_stream(path, &report)?;
        info!(path = %path.display(), "metrics stream written");
    }

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Pretty => print_summary(&report),
    }

    Ok(())
}

fn write_stream(path: &Path, report: &RunReport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for record in &report.records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!(
        "{} units x {} threads, {} cycles in {:.3}s",
        report.units,
        report.threads_per_unit,
        report.cycles,
        report.elapsed.as_secs_f64()
    );
    if let Some(last) = report.last() {
        println!(
            "final: season {} | agents {} | energy {:.2} | resource {:.2}",
            last.season.label(),
            last.total_agents,
            last.total_energy,
            last.total_resource
        );
    }
    if let Some(bytes) = report.memory_bytes {
        println!("resident memory: {:.1} MiB", bytes as f64 / (1024.0 * 1024.0));
    }
}
