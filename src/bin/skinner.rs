//! Skinner command line aggregator
//!
//! Reads datapoints as concatenated or newline-delimited JSON from stdin,
//! aggregates them, and prints one JSON row per line.
//!
//! # Usage
//!
//! ```bash
//! # Sum by host, then by utilization bucket of width 10
//! skinner -d host -d util -b util=10 < points.json
//!
//! # Histogram with inclusive bounds instead of ordinals
//! skinner -d util -b util=10 --bounds < points.json
//!
//! # Load decompositions and bucketizers from a file
//! skinner --config skinner.toml < points.json
//!
//! # Validate a configuration file
//! skinner --config skinner.toml check-config
//! ```

use clap::{Parser, Subcommand};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info};

use skinner::aggregation::{
    create_aggregator, ordinal_to_bounds, AggregateOutput, BucketizerSpec, MissingFieldPolicy,
};
use skinner::{Datapoint, Error, SkinnerConfig};

// =============================================================================
// CLI Definition
// =============================================================================

/// Skinner - grouped sums and histograms over tagged datapoints
#[derive(Parser)]
#[command(name = "skinner")]
#[command(version)]
#[command(about = "Aggregate JSON datapoints into grouped sums and histograms", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Decomposition field path, in grouping order (repeatable)
    #[arg(short = 'd', long = "decomp")]
    decomps: Vec<String>,

    /// Linear bucketizer as FIELD=WIDTH (repeatable)
    #[arg(short = 'b', long = "bucketize", value_parser = parse_linear)]
    linear: Vec<(String, u64)>,

    /// Power-of-two bucketizer for FIELD (repeatable)
    #[arg(long = "p2")]
    power_of_two: Vec<String>,

    /// Emit datapoints instead of rows
    #[arg(long, conflicts_with = "bounds")]
    points: bool,

    /// Fail on datapoints missing a decomposition field
    #[arg(long)]
    reject_missing: bool,

    /// Replace ordinals with inclusive bounds (single bucketized decomposition)
    #[arg(long)]
    bounds: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate stdin (default)
    Run,

    /// Validate configuration without reading input
    CheckConfig,
}

fn parse_linear(arg: &str) -> Result<(String, u64), String> {
    let (field, width) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=WIDTH, got '{}'", arg))?;
    let width = width
        .parse::<u64>()
        .map_err(|e| format!("invalid width '{}': {}", width, e))?;
    Ok((field.to_string(), width))
}

// =============================================================================
// Configuration
// =============================================================================

/// Merge the config file, environment, and command line into one config
fn build_config(cli: &Cli) -> skinner::Result<SkinnerConfig> {
    let mut config = match &cli.config {
        Some(path) => SkinnerConfig::from_file_with_env(path)?,
        None => SkinnerConfig::from_env()?,
    };

    if !cli.decomps.is_empty() {
        config.aggregation.decomps = cli.decomps.clone();
    }
    for (field, width) in &cli.linear {
        config.bucketizers.insert(
            field.clone(),
            BucketizerSpec::Linear {
                width: *width as f64,
            }
        );
    }
    for field in &cli.power_of_two {
        config
            .bucketizers
            .insert(field.clone(), BucketizerSpec::PowerOfTwo);
    }
    if cli.points {
        config.aggregation.results_as_points = true;
    }
    if cli.reject_missing {
        config.aggregation.missing_fields = MissingFieldPolicy::Reject;
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Aggregation
// =============================================================================

fn run(cli: &Cli, config: &SkinnerConfig) -> skinner::Result<()> {
    let stream_config = config.to_aggregator_config()?;

    let bounds = if cli.bounds {
        let bucketizer = match stream_config.decomps.as_slice() {
            [field] => stream_config.bucketizers.get(field).cloned(),
            _ => None,
        };
        let missing = || {
            Error::Configuration(
                "--bounds requires exactly one bucketized decomposition".to_string(),
            )
        };
        Some(bucketizer.ok_or_else(missing)?)
    } else {
        None
    };

    let mut aggregator = create_aggregator(stream_config)?;

    let stdin = io::stdin();
    let points = serde_json::Deserializer::from_reader(stdin.lock()).into_iter::<Datapoint>();
    for point in points {
        aggregator.write(&point?)?;
    }

    aggregator.end()?;
    let stats = aggregator.stats();
    info!(
        points = stats.points_ingested,
        rejected = stats.points_rejected,
        groups = stats.groups,
        "Aggregation complete"
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let output = aggregator.result()?;
    match (output, &bounds) {
        (AggregateOutput::Rows(rows), Some(bucketizer)) => {
            for row in ordinal_to_bounds(bucketizer.as_ref(), rows)? {
                serde_json::to_writer(&mut out, &row)?;
                out.write_all(b"\n")?;
            }
        }
        (AggregateOutput::Rows(rows), None) => {
            for row in rows {
                serde_json::to_writer(&mut out, row)?;
                out.write_all(b"\n")?;
            }
        }
        (AggregateOutput::Points(points), _) => {
            for point in points {
                serde_json::to_writer(&mut out, point)?;
                out.write_all(b"\n")?;
            }
        }
    }
    out.flush()?;
    debug!("Wrote {} results", output.len());
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("skinner: {}", e);
            std::process::exit(2);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    debug!(
        "Configuration: decomps={:?}, bucketizers={:?}, missing_fields={:?}",
        config.aggregation.decomps,
        config.bucketizers.keys().collect::<Vec<_>>(),
        config.aggregation.missing_fields
    );

    let result = match &cli.command {
        Some(Commands::CheckConfig) => {
            println!("Configuration is valid");
            Ok(())
        }
        Some(Commands::Run) | None => run(&cli, &config),
    };

    if let Err(e) = result {
        eprintln!("skinner: {}", e);
        std::process::exit(1);
    }
}
