//! CLI entry point for the lane capacity calibration tool.
//!
//! Provides subcommands for calibrating a road graph from turning counts,
//! inspecting the result for a single link, and checking a correction table.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use lane_capacity::{
    config::{CalibrationConfig, DEFAULT_CAPACITY_THRESHOLD},
    corrections::CorrectionTable,
    counts::read_lane_capacities,
    efficiency::turn_efficiencies,
    network::{LinkId, read_graph, write_graph},
    output::{append_summary, write_turn_efficiencies},
    pipeline::calibrate,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "lane_capacity")]
#[command(about = "Derive link and lane capacities from turning counts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve capacities and turn efficiencies, apply corrections, write the graph
    Calibrate {
        /// Road graph JSON (optionally .gz)
        #[arg(long)]
        network: PathBuf,

        /// CSV file with lane capacities
        #[arg(long)]
        counts: Option<PathBuf>,

        /// JSON correction table
        #[arg(long)]
        corrections: Option<PathBuf>,

        /// Output road graph, .gz compresses
        #[arg(short, long)]
        output: PathBuf,

        /// CSV file to append the run summary to
        #[arg(long)]
        summary: Option<PathBuf>,

        /// CSV export of every stored turn efficiency
        #[arg(long)]
        efficiencies: Option<PathBuf>,

        /// Minimum plausible capacity per lane (veh/h)
        #[arg(long, default_value_t = DEFAULT_CAPACITY_THRESHOLD)]
        threshold: f64,

        /// Scale lane capacity by this factor
        #[arg(long, default_value_t = 1.0)]
        capacity_factor: f64,

        /// Scale up free flow speed of slow links
        #[arg(long, default_value_t = 1.0)]
        free_flow_factor: f64,
    },
    /// Show capacity, junction flag and turn efficiencies of a link
    Inspect {
        #[arg(long)]
        network: PathBuf,

        #[arg(long)]
        link: String,
    },
    /// Check that every link of a correction table exists in the network
    ValidateCorrections {
        #[arg(long)]
        network: PathBuf,

        #[arg(long)]
        corrections: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/lane_capacity.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("lane_capacity.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Calibrate {
            network,
            counts,
            corrections,
            output,
            summary,
            efficiencies,
            threshold,
            capacity_factor,
            free_flow_factor,
        } => {
            let config = CalibrationConfig {
                capacity_threshold: threshold,
                capacity_factor,
                free_flow_factor,
            };

            let mut graph = read_graph(&network)
                .with_context(|| format!("failed to load network {}", network.display()))?;

            // Malformed count files abort here, before the graph is touched
            let counts = match counts {
                Some(path) => read_lane_capacities(&path)
                    .with_context(|| format!("failed to read counts {}", path.display()))?,
                None => {
                    warn!("No count file given, capacities stay at their imported values");
                    Default::default()
                }
            };

            let table = match corrections {
                Some(path) => CorrectionTable::load(&path)?,
                None => CorrectionTable::default(),
            };

            let run = calibrate(&mut graph, &counts, &table, &config)?;

            write_graph(&output, &graph)
                .with_context(|| format!("failed to write {}", output.display()))?;

            info!(
                links_implausible = run.links_implausible,
                links_unmatched = run.links_unmatched,
                lanes_implausible = run.lanes_implausible,
                lanes_unmatched = run.lanes_unmatched,
                links_doubled = run.links_doubled,
                links_overridden = run.links_overridden,
                "Run summary"
            );
            if let Some(path) = summary {
                append_summary(&path, &run)?;
            }
            if let Some(path) = efficiencies {
                write_turn_efficiencies(&path, &graph)?;
            }

            info!(output = %output.display(), "Network written");
        }
        Commands::Inspect { network, link } => {
            let graph = read_graph(&network)?;
            let id = LinkId::new(link);

            let Some(link) = graph.network.link(&id) else {
                bail!("link {id} not found in {}", network.display());
            };

            info!(
                link = %id,
                capacity = link.capacity,
                lanes = link.number_of_lanes,
                junction = link.is_junction(),
                "Link"
            );

            for (to, ratio) in turn_efficiencies(&link.attributes) {
                info!(to = %to, ratio, "Turn efficiency");
            }

            if let Some(l2l) = graph.lanes.assignments.get(&id) {
                for lane in l2l.lanes.values() {
                    info!(
                        lane = %lane.id,
                        capacity = lane.capacity_vehicles_per_hour,
                        turns = turn_efficiencies(&lane.attributes).len(),
                        "Lane"
                    );
                }
            }
        }
        Commands::ValidateCorrections {
            network,
            corrections,
        } => {
            let graph = read_graph(&network)?;
            let table = CorrectionTable::load(&corrections)?;

            table.validate(&graph.network)?;
            info!(
                double_lanes = table.double_lanes.len(),
                overrides = table.capacity_overrides.len(),
                "Correction table is valid"
            );
        }
    }

    Ok(())
}
