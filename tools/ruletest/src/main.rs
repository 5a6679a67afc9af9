//! Rule test harness CLI for VoltageEMS
//!
//! Analyzes rule files, generates test scenarios from them and runs scenarios
//! against a live rule engine through Redis.

mod loader;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use voltage_rtdb::RedisRtdb;
use voltage_ruletest::{analyze_rules, HarnessConfig, ScenarioDocument, ScenarioGenerator, TestRunner};

#[derive(Parser)]
#[command(name = "ruletest")]
#[command(about = "VoltageEMS rule test harness")]
#[command(long_about = "VoltageEMS rule test harness

Commands:
  analyze     Show input sensors, dependencies and temporal rules
  generate    Generate test scenarios from rule files
  run         Run generated or saved scenarios against the engine

Examples:
  ruletest analyze -r rules/
  ruletest generate -r rules/ -o scenarios.yaml
  ruletest run -r rules/ --filter high_temp
  ruletest run -s scenarios.yaml --results results.json --verbose")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Harness configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long = "config", global = true, env = "RULETEST_CONFIG")]
    config: Option<PathBuf>,

    /// Redis URL, overrides the configuration file
    #[arg(long = "redis-url", global = true)]
    redis_url: Option<String>,

    /// Enable verbose logging and failure details
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show input sensors, dependencies and temporal rules
    Analyze {
        /// Rule files or directories
        #[arg(short, long = "rules", required = true, num_args = 1..)]
        rules: Vec<PathBuf>,
    },

    /// Generate test scenarios from rule files
    Generate {
        /// Rule files or directories
        #[arg(short, long = "rules", required = true, num_args = 1..)]
        rules: Vec<PathBuf>,

        /// Output file (.yaml or .json)
        #[arg(short, long)]
        output: PathBuf,

        /// Only keep scenarios whose name contains this text
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Run scenarios against the engine
    Run {
        /// Rule files or directories to generate scenarios from
        #[arg(short, long = "rules", num_args = 1.., required_unless_present = "scenarios", conflicts_with = "scenarios")]
        rules: Vec<PathBuf>,

        /// Saved scenario document
        #[arg(short, long)]
        scenarios: Option<PathBuf>,

        /// Only run scenarios whose name contains this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Write the results document (JSON) to this file
        #[arg(long)]
        results: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = HarnessConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = &cli.redis_url {
        config.redis.url = url.clone();
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.no_color {
        config.logging.ansi = false;
    }
    let _log_guard = common::init_logging(&config.logging).context("Failed to initialize logging")?;
    debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Analyze { rules } => {
            let rules = loader::load_rules(&rules)?;
            output::print_analysis(&analyze_rules(&rules));
            Ok(ExitCode::SUCCESS)
        },
        Commands::Generate {
            rules,
            output: path,
            filter,
        } => {
            let scenarios = generate(&config, &rules, filter.as_deref())?;
            ScenarioDocument::new(scenarios.clone())
                .to_file(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            output::print_generated(&scenarios);
            println!(
                "{} {} scenarios written to {}",
                "OK".green().bold(),
                scenarios.len(),
                path.display()
            );
            Ok(ExitCode::SUCCESS)
        },
        Commands::Run {
            rules,
            scenarios,
            filter,
            results,
        } => {
            let scenarios = match scenarios {
                Some(path) => loader::filter_scenarios(loader::load_scenarios(&path)?, filter.as_deref()),
                None => generate(&config, &rules, filter.as_deref())?,
            };
            run(&config, scenarios, results.as_deref(), cli.verbose).await
        },
    }
}

fn generate(
    config: &HarnessConfig,
    rule_paths: &[PathBuf],
    filter: Option<&str>,
) -> Result<Vec<voltage_ruletest::TestScenario>> {
    let rules = loader::load_rules(rule_paths)?;
    let analysis = analyze_rules(&rules);
    let generator = ScenarioGenerator::new(config.generator.clone());
    let scenarios = loader::filter_scenarios(generator.generate_all(&analysis), filter);
    info!(rules = rules.len(), scenarios = scenarios.len(), "Scenarios ready");
    Ok(scenarios)
}

async fn run(
    config: &HarnessConfig,
    scenarios: Vec<voltage_ruletest::TestScenario>,
    results_path: Option<&Path>,
    verbose: bool,
) -> Result<ExitCode> {
    if scenarios.is_empty() {
        println!("{} No scenarios to run", "WARN".yellow());
        return Ok(ExitCode::SUCCESS);
    }

    let rtdb = RedisRtdb::with_config(config.redis.clone())
        .await
        .with_context(|| format!("Cannot connect to Redis at {}", config.redis.url))?;
    info!(url = %config.redis.url, "Connected to Redis");

    let runner = TestRunner::with_rtdb(Arc::new(rtdb), config.runner.clone());
    let summary = runner.run_all(&scenarios).await;
    output::print_summary(&summary, verbose);

    if let Some(path) = results_path {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        println!("Results written to {}", path.display());
    }

    Ok(if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
