use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dshield_obs_planner::{ObsPlanner, PlanReport, Strategy, ValueRanking};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "dshield-plan", version, about = "DSHIELD satellite observation planner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Searches for an observation plan.
    Plan(PlanArgs),
    /// Validates the configuration and inputs without searching.
    Check {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct PlanArgs {
    #[arg(long)]
    config: PathBuf,
    /// Overrides `planner.strategy` (dfs, beam, beam.N).
    #[arg(long)]
    strategy: Option<String>,
    /// Overrides `planner.value_ranking`.
    #[arg(long)]
    value_ranking: Option<String>,
    /// Writes the full JSON report here.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Plan(args) => {
            let report = handle_plan(&args)?;
            println!("{}", serde_json::to_string_pretty(&report.summary())?);
            Ok(())
        }
        Commands::Check { config } => {
            let planner = ObsPlanner::from_config(&config)?;
            let summary = planner.check()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "satellites": summary.satellites,
                    "variables": summary.build.variables,
                    "ground_points": summary.ground_points,
                    "horizon_ground_points": summary.build.horizon_ground_points,
                    "commands": summary.commands,
                    "slew_entries": summary.slew_entries,
                    "unreachable_ground_points": summary.unreachable_ground_points,
                    "error_categories": summary.error_categories,
                }))?
            );
            Ok(())
        }
    }
}

fn handle_plan(args: &PlanArgs) -> Result<PlanReport> {
    anyhow::ensure!(
        args.config.exists(),
        "config file not found: {}",
        args.config.display()
    );
    let mut planner = ObsPlanner::from_config(&args.config)?;
    if let Some(strategy) = &args.strategy {
        planner.settings_mut().strategy = strategy.parse::<Strategy>()?;
    }
    if let Some(ranking) = &args.value_ranking {
        planner.settings_mut().value_ranking = ranking.parse::<ValueRanking>()?;
    }
    let report = planner.plan()?;
    if let Some(output) = &args.output {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(output, serde_json::to_vec_pretty(&report)?)
            .with_context(|| format!("writing report {}", output.display()))?;
    }
    Ok(report)
}
