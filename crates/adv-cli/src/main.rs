//! ADV CLI - plan adventure routes and inspect routing models.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use adv_core::routing_model::{self, Preset};
use adv_core::{Coordinate, PlanningPreferences};
use adv_planner::{Config, Planner, PlannerCache};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Adventure motorcycle route planner
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan a route from a JSON request file
    Plan {
        /// Request file with `waypoints` and optional `preferences`
        #[arg(long)]
        request: PathBuf,

        /// Overall deadline in milliseconds (overrides ADV_DEADLINE_MS)
        #[arg(long)]
        budget_ms: Option<u64>,

        /// Ride-trace JSON file for popularity (overrides ADV_TRACES_FILE)
        #[arg(long)]
        traces: Option<PathBuf>,

        /// Scoring weights JSON file (overrides ADV_WEIGHTS_FILE)
        #[arg(long)]
        weights: Option<PathBuf>,

        /// Print a GeoJSON FeatureCollection instead of the full result
        #[arg(long)]
        geojson: bool,

        #[arg(long)]
        pretty: bool,
    },

    /// Print the routing engine custom model for a preset
    Model {
        #[arg(long, default_value = "MIXED")]
        preset: String,

        /// Print explanation lines instead of the model
        #[arg(long)]
        explain: bool,
    },
}

#[derive(Debug, Deserialize)]
struct PlanRequest {
    waypoints: Vec<Coordinate>,
    #[serde(default)]
    preferences: PlanningPreferences,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("adv_planner=debug".parse()?)
                .add_directive("adv=info".parse()?),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Plan {
            request,
            budget_ms,
            traces,
            weights,
            geojson,
            pretty,
        } => {
            let mut config = Config::from_env();
            if let Some(path) = traces {
                config.traces_path = Some(path);
            }
            if let Some(path) = weights {
                config.weights_path = Some(path);
            }
            if config.engine_url.is_none() {
                bail!("ADV_ENGINE_URL is not set; a routing engine is required to plan");
            }
            run_plan(&config, &request, budget_ms, geojson, pretty).await
        }
        Command::Model { preset, explain } => {
            let preset: Preset = preset.parse()?;
            let model = routing_model::build(preset);
            if explain {
                for line in model.explain() {
                    println!("{}", line);
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&model.export())?);
            }
            Ok(())
        }
    }
}

async fn run_plan(
    config: &Config,
    request_path: &Path,
    budget_ms: Option<u64>,
    geojson: bool,
    pretty: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(request_path)
        .with_context(|| format!("reading {}", request_path.display()))?;
    let request: PlanRequest = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", request_path.display()))?;
    tracing::info!(
        "Loaded request {} with {} waypoints",
        request_path.display(),
        request.waypoints.len()
    );

    let mut budget = config.budget();
    if let Some(ms) = budget_ms {
        budget = budget.with_deadline(Duration::from_millis(ms));
    }

    let mut planner = Planner::new(config.sources(), config.settings()?);
    if config.cache_enabled {
        planner = planner.with_cache(Arc::new(PlannerCache::new(
            config.cache_ttl(),
            config.cache_max_entries,
        )));
    }

    let result = planner
        .plan(&request.waypoints, &request.preferences, &budget)
        .await?;
    tracing::info!(
        "Route ready: {:.1} km, {} detours, confidence {:.2}",
        result.summary.distance_m / 1000.0,
        result.summary.detour_count,
        result.diagnostics.confidence
    );

    let output = if geojson {
        result.to_geojson()
    } else {
        serde_json::to_value(&result)?
    };
    let text = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", text);
    Ok(())
}
