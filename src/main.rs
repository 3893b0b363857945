//! Replay binary: drive the decision kernel over a historical tick range.
//!
//! The minimal evaluation loop — load the config, dataset and forecaster
//! checkpoint, run `decide` per row, print each decision and an end-of-run
//! cost summary. The HTTP surface and workflow orchestrator live elsewhere
//! and consume the same kernel operations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lift_os::config::{self, StationConfig};
use lift_os::dataset::{DatasetConfig, HistoricalDataset};
use lift_os::forecast::InflowForecaster;
use lift_os::pipeline::DecisionDriver;

#[derive(Parser, Debug)]
#[command(name = "lift-os", about = "Lift station decision kernel replay", version)]
struct Args {
    /// Path to station_config.toml (defaults to the standard search order)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the dataset path from the config
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Override the forecaster checkpoint path from the config
    #[arg(long)]
    model: Option<PathBuf>,

    /// First dataset row to replay
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Number of ticks to run (0 = to the end of the dataset)
    #[arg(long, default_value_t = 0)]
    ticks: usize,

    /// Emit one JSON decision per line instead of the human summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let station_config = match &args.config {
        Some(path) => StationConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StationConfig::load(),
    };
    let findings = config::validation::validate(&station_config);
    if !findings.is_empty() {
        warn!(count = findings.len(), "Config validation findings — see warnings above");
    }
    config::init(station_config);
    let cfg = config::get();

    let dataset_path = args.dataset.as_ref().unwrap_or(&cfg.paths.dataset);
    let dataset = Arc::new(
        HistoricalDataset::load(dataset_path, DatasetConfig::default(), cfg.price_scenario)
            .with_context(|| format!("loading dataset {}", dataset_path.display()))?,
    );

    let model_path = args.model.as_ref().unwrap_or(&cfg.paths.forecaster_model);
    let forecaster = InflowForecaster::new(dataset.inflow_series(), model_path);

    let driver = DecisionDriver::new(dataset.clone(), forecaster);

    let end = if args.ticks == 0 {
        dataset.len()
    } else {
        (args.start + args.ticks).min(dataset.len())
    };
    info!(start = args.start, end, station = %cfg.station.name, "Starting replay");

    let mut total_cost_eur = 0.0;
    let mut total_energy_kwh = 0.0;
    let mut total_flow_m3 = 0.0;
    let mut violation_ticks = 0usize;

    for index in args.start..end {
        let state = driver.state_at(index)?;
        let decision = match driver.decide(state).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(index, error = %e, "Tick rejected");
                continue;
            }
        };

        total_cost_eur += decision.cost_calculation.cost_eur;
        total_energy_kwh += decision.cost_calculation.energy_consumed_kwh;
        total_flow_m3 += decision.cost_calculation.flow_pumped_m3;
        if !decision.constraint_violations.is_empty() {
            violation_ticks += 1;
        }

        if args.json {
            println!("{}", serde_json::to_string(&decision)?);
        } else {
            println!(
                "{} | {} pump(s) | {:>8.0} m³/h | {:>7.2} EUR | {}",
                decision.timestamp.format("%Y-%m-%d %H:%M"),
                decision.running_pumps(),
                decision.total_flow_m3h(),
                decision.cost_calculation.cost_eur,
                decision.priority_applied,
            );
        }
    }

    let stats = driver.stats();
    let ticks = stats.ticks_processed.max(1);
    println!("\n=== Replay summary ===");
    println!("Ticks processed:      {}", stats.ticks_processed);
    println!("Total cost:           {total_cost_eur:.2} EUR");
    println!("Total energy:         {total_energy_kwh:.1} kWh");
    println!("Total flow:           {total_flow_m3:.0} m³");
    if total_flow_m3 > 0.0 {
        println!(
            "Specific energy:      {:.4} kWh/m³",
            total_energy_kwh / total_flow_m3
        );
    }
    println!(
        "Avg cost per tick:    {:.2} EUR",
        total_cost_eur / ticks as f64
    );
    println!("Ticks with violations: {violation_ticks}");
    println!(
        "Agent timeouts: {} | vetoes: {} | validator rewrites: {}",
        stats.agent_timeouts, stats.vetoes_applied, stats.validator_rewrites
    );
    Ok(())
}
