//! CAN Trip CLI Application
//!
//! Command-line front end for the can-trip-decoder library:
//! - `trips`: split one or more ASC logs into trips (parallel over files)
//! - `export`: write each trip's speed events to its own CSV file
//! - `replay`: replay one trip in real time and print the sampled acceleration

use anyhow::{bail, Context, Result};
use can_trip_decoder::{ErrorPolicy, LogParser, MessageIds, ParseOutcome, SpeedUnit, Trip};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod config;
mod report;

use config::AppConfig;

/// CAN Trip Decoder - Reconstruct trips from vehicle-bus logs
#[derive(Parser, Debug)]
#[command(name = "can-trip-cli")]
#[command(about = "Split ASC vehicle-bus logs into trips, export and replay them", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split logs into trips and print a summary per file
    Trips {
        /// ASC log files
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Print trips as JSON instead of a summary
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        parsing: ParsingArgs,
    },

    /// Export speed events as one CSV file per trip
    Export {
        /// ASC log file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output directory (default: [output] dir, then the log's directory)
        #[arg(short, long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// File name prefix
        #[arg(long)]
        prefix: Option<String>,

        #[command(flatten)]
        parsing: ParsingArgs,
    },

    /// Replay a trip in real time and sample its acceleration
    Replay {
        /// ASC log file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Index of the trip to replay
        #[arg(short, long, default_value_t = 0)]
        trip: usize,

        /// Sampling interval in milliseconds
        #[arg(long, value_name = "MS")]
        poll_ms: Option<u64>,

        #[command(flatten)]
        parsing: ParsingArgs,
    },
}

/// Overrides for the [messages] and [parsing] tables
#[derive(clap::Args, Debug, Default)]
struct ParsingArgs {
    /// Speed message id (hex, e.g. 0x1A0)
    #[arg(long, value_name = "ID", value_parser = parse_id)]
    speed_id: Option<u32>,

    /// Standard engine message id (hex)
    #[arg(long, value_name = "ID", value_parser = parse_id)]
    engine_id: Option<u32>,

    /// EV engine message id (hex)
    #[arg(long, value_name = "ID", value_parser = parse_id)]
    ev_id: Option<u32>,

    /// Stop at the first undecodable line
    #[arg(long)]
    fail_fast: bool,

    /// Treat the engine as running before any engine message
    #[arg(long)]
    engine_on: bool,

    /// Convert speeds to this unit (mph or kph)
    #[arg(long, value_parser = parse_unit)]
    unit: Option<SpeedUnit>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("CAN Trip CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", can_trip_decoder::VERSION);

    let mut app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    match args.command {
        Command::Trips {
            files,
            json,
            parsing,
        } => {
            apply_overrides(&mut app_config, &parsing)?;
            trips_mode(&app_config, &files, json)
        }
        Command::Export {
            file,
            out_dir,
            prefix,
            parsing,
        } => {
            apply_overrides(&mut app_config, &parsing)?;
            if let Some(prefix) = prefix {
                app_config.output.prefix = prefix;
            }
            export_mode(&app_config, &file, out_dir)
        }
        Command::Replay {
            file,
            trip,
            poll_ms,
            parsing,
        } => {
            apply_overrides(&mut app_config, &parsing)?;
            if let Some(ms) = poll_ms {
                app_config.replay = app_config
                    .replay
                    .with_poll_interval(Duration::from_millis(ms));
            }
            replay_mode(&app_config, &file, trip)
        }
    }
}

/// Command-line flags win over the config file
fn apply_overrides(config: &mut AppConfig, args: &ParsingArgs) -> Result<()> {
    if args.speed_id.is_some() || args.engine_id.is_some() || args.ev_id.is_some() {
        let base = config.messages;
        let speed = args
            .speed_id
            .or(base.map(|ids| ids.speed))
            .context("--speed-id is required when no [messages] table is configured")?;
        let engine = args
            .engine_id
            .or(base.map(|ids| ids.standard_engine))
            .context("--engine-id is required when no [messages] table is configured")?;
        let ev = args
            .ev_id
            .or(base.map(|ids| ids.ev_engine))
            .context("--ev-id is required when no [messages] table is configured")?;
        config.messages = Some(MessageIds::new(speed, engine, ev));
    }

    if args.fail_fast {
        config.parsing.error_policy = ErrorPolicy::FailFast;
    }
    if args.engine_on {
        config.parsing.initial_engine_on = true;
    }
    if args.unit.is_some() {
        config.parsing.output_unit = args.unit;
    }

    Ok(())
}

fn build_parser(config: &AppConfig) -> Result<LogParser> {
    let parser = LogParser::new(config.decoder_config()?, config.signal_decoder())?;
    Ok(parser)
}

#[derive(Debug, Serialize)]
struct FileTrips<'a> {
    file: &'a Path,
    skipped_lines: usize,
    summary: Vec<report::TripSummary>,
    trips: &'a [Trip],
}

impl<'a> FileTrips<'a> {
    fn new(file: &'a Path, outcome: &'a ParseOutcome<Vec<Trip>>) -> Self {
        Self {
            file,
            skipped_lines: outcome.report.errors.len(),
            summary: outcome
                .output
                .iter()
                .enumerate()
                .map(|(index, trip)| report::TripSummary::from_trip(index, trip))
                .collect(),
            trips: &outcome.output,
        }
    }
}

/// Parse every file in parallel and report its trips
fn trips_mode(config: &AppConfig, files: &[PathBuf], json: bool) -> Result<()> {
    let parser = build_parser(config)?;

    let results: Vec<_> = files
        .par_iter()
        .map(|path| (path, parser.parse_trips(path)))
        .collect();

    let mut failed = 0;
    let mut documents = Vec::new();
    for (path, result) in &results {
        match result {
            Ok(outcome) => {
                log::info!("{:?}: {} trips", path, outcome.output.len());
                if json {
                    documents.push(FileTrips::new(path, outcome));
                } else {
                    report::print_trip_summary(path, &outcome.output, &outcome.report);
                }
            }
            Err(e) => {
                log::error!("{:?}: {}", path, e);
                failed += 1;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&documents)?);
    }

    if failed > 0 {
        bail!("{} of {} files could not be parsed", failed, files.len());
    }
    Ok(())
}

fn export_mode(config: &AppConfig, file: &Path, out_dir: Option<PathBuf>) -> Result<()> {
    let parser = build_parser(config)?;
    let outcome = parser
        .export_speed_events(file)
        .with_context(|| format!("Failed to export {:?}", file))?;

    let dir = out_dir
        .or_else(|| config.output.dir.clone())
        .unwrap_or_else(|| {
            file.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });

    let written = report::write_trip_csvs(&dir, &config.output.prefix, &outcome.output)?;

    println!("✓ Exported {} trips from {:?}", written.len(), file);
    for path in &written {
        println!("  {}", path.display());
    }
    if !outcome.report.errors.is_empty() {
        println!("⚠️  {} lines skipped", outcome.report.errors.len());
    }

    Ok(())
}

fn replay_mode(config: &AppConfig, file: &Path, index: usize) -> Result<()> {
    let parser = build_parser(config)?;
    let trips = parser
        .parse_trips(file)
        .with_context(|| format!("Failed to parse {:?}", file))?
        .output;

    let trip = match trips.get(index) {
        Some(trip) => trip,
        None => bail!("trip {} out of range ({} trips in {:?})", index, trips.len(), file),
    };

    let name = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "replay".to_string());

    println!("═══════════════════════════════════════════════");
    println!("  Replaying trip {} of {:?}", index, file);
    println!("  {} samples, {:.3} s", trip.len(), trip.duration_ms() as f64 / 1000.0);
    println!("═══════════════════════════════════════════════\n");

    let replay = config.replay_config();
    log::debug!("Replaying speeds recorded in {}", replay.source_unit);
    let session = can_trip_decoder::ReplaySession::new(name, replay);
    let outcome = session.run(trip, can_trip_decoder::AccelerationLog::default())?;

    report::print_acceleration(&outcome.acceleration.mph, &outcome.acceleration.kph);
    println!(
        "\n✓ {} samples replayed, {} polls in {:.3} s",
        outcome.samples_replayed,
        outcome.polls,
        outcome.elapsed.as_secs_f64()
    );

    Ok(())
}

fn parse_id(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid message id '{}': {}", s, e))
}

fn parse_unit(s: &str) -> Result<SpeedUnit, String> {
    match s.to_ascii_lowercase().as_str() {
        "mph" => Ok(SpeedUnit::Mph),
        "kph" | "kmh" => Ok(SpeedUnit::Kph),
        _ => Err(format!("unknown speed unit '{}' (expected mph or kph)", s)),
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
