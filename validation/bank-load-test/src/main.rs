//! Load test CLI for the banking transfer service.

use anyhow::Context;
use bank_load_test::{LoadRunner, ResultsReport, TaskSelection, TestConfig, TestResults};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bank-load-test")]
#[command(about = "Virtual-user load generator for the banking transfer service", long_about = None)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test from a scenario file
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override number of virtual users
        #[arg(short, long)]
        users: Option<u32>,

        /// Override test duration in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Override target base URL
        #[arg(long, env = "BANK_HOST")]
        host: Option<String>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Run a quick smoke test
    Quick {
        /// Base URL
        #[arg(long, env = "BANK_HOST", default_value = "http://localhost:8080")]
        host: String,

        /// Number of virtual users
        #[arg(short, long, default_value = "10")]
        users: u32,

        /// Test duration in seconds
        #[arg(short, long, default_value = "30")]
        duration: u64,

        /// Alternate transfer directions instead of picking at random
        #[arg(long)]
        round_robin: bool,
    },

    /// List available scenarios
    List {
        /// Scenarios directory
        #[arg(short, long, default_value = "scenarios")]
        dir: PathBuf,
    },
}

fn init_tracing(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!(e))
}

fn print_results(results: &TestResults, output: &str) -> anyhow::Result<()> {
    match output {
        "json" => {
            println!("{}", ResultsReport::format_json(results)?);
        }
        "csv" => {
            println!("{}", ResultsReport::csv_header());
            println!("{}", ResultsReport::format_csv(results));
        }
        _ => {
            println!("{}", ResultsReport::format_table(results));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json)?;

    match cli.command {
        Commands::Run {
            scenario,
            users,
            duration,
            host,
            output,
        } => {
            println!("Loading scenario: {}", scenario.display());

            let mut config = TestConfig::from_file(&scenario)
                .with_context(|| format!("Failed to load scenario {}", scenario.display()))?;

            // Apply overrides
            if let Some(u) = users {
                config.users = u;
            }
            if let Some(d) = duration {
                config.duration_secs = d;
            }
            if let Some(h) = host {
                config.base_url = h;
            }

            config.validate()?;

            println!("✓ Configuration loaded successfully");
            println!("  Name: {}", config.name);
            println!("  Description: {}", config.description);
            println!("  Target: {}", config.base_url);
            println!("  Duration: {}s", config.duration_secs);
            println!("  Users: {}", config.users);
            println!("  Think time: {}-{}ms", config.wait_min_ms, config.wait_max_ms);
            println!();

            let runner = LoadRunner::new(config)?;
            let results = runner.run().await?;

            print_results(&results, &output)
        }
        Commands::Quick {
            host,
            users,
            duration,
            round_robin,
        } => {
            println!("Running quick test:");
            println!("  Target: {}", host);
            println!("  Users: {}", users);
            println!("  Duration: {}s", duration);
            println!();

            let mut config = TestConfig::new("quick", duration, users);
            config.description = "Quick smoke test".to_string();
            config.base_url = host;
            config.hatch_rate = users as f64;
            if round_robin {
                config.task_selection = TaskSelection::RoundRobin;
            }

            let runner = LoadRunner::new(config)?;
            let results = runner.run().await?;

            print_results(&results, "table")
        }
        Commands::List { dir } => {
            println!("Available scenarios in {}:", dir.display());
            println!();

            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    eprintln!("Error reading directory: {}", e);
                    eprintln!("Make sure the directory exists and is readable");
                    return Ok(());
                }
            };

            let mut scenarios = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("yaml") {
                    continue;
                }
                // Try to load the config to get name and description
                if let (Ok(config), Some(filename)) =
                    (TestConfig::from_file(&path), path.file_name())
                {
                    scenarios.push((
                        filename.to_string_lossy().to_string(),
                        config.name,
                        config.description,
                    ));
                }
            }

            scenarios.sort_by(|a, b| a.0.cmp(&b.0));

            if scenarios.is_empty() {
                println!("No scenario files found");
            } else {
                for (filename, name, desc) in scenarios {
                    println!("  {} - {}", filename, name);
                    println!("    {}", desc);
                    println!();
                }
            }

            Ok(())
        }
    }
}
