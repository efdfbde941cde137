use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LoggingSettings, CONFIG_PATH_ENV};
use crate::dataset;
use crate::llm::OpenAiProvider;
use crate::sandbox::{ExecutionOutcome, Sandbox};
use crate::table::DataFrame;
use crate::workflow::AnalysisWorkflow;

#[derive(Parser)]
#[command(name = "pacer")]
#[command(about = "Pacer - ask questions about your running history", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Model name (overrides config file and env vars)
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer a question about a dataset
    Ask {
        /// The question, in plain language
        question: String,

        /// Normalized activities CSV
        #[arg(short = 'd', long = "data")]
        data: PathBuf,

        /// Where to write the chart, when one is generated
        #[arg(long)]
        chart: Option<PathBuf>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run an analysis script in the sandbox
    Exec {
        /// Script file
        script: PathBuf,

        /// Normalized activities CSV, bound to `df`
        #[arg(short = 'd', long = "data")]
        data: PathBuf,

        /// Run as chart code and write the PNG here
        #[arg(long)]
        chart: Option<PathBuf>,
    },

    /// Convert raw activity JSON into the normalized CSV
    Import {
        /// JSON array of activities
        input: PathBuf,

        /// Output CSV path
        #[arg(short = 'o', long = "out")]
        out: PathBuf,
    },

    /// Print the dataset schema
    Schema,

    /// Print aggregate statistics for a dataset
    Summary {
        #[arg(short = 'd', long = "data")]
        data: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

/// Install the global subscriber; `RUST_LOG` wins over the configured filter
pub fn init_tracing(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    // already installed when embedded or under test
    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    if let Some(config_path) = &cli.config {
        std::env::set_var(CONFIG_PATH_ENV, config_path);
    }

    // Config errors surface before any command output
    let config = Config::builder().model(cli.model.clone()).build()?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Ask {
            question,
            data,
            chart,
            json,
        } => {
            let frame = load_dataset(&data)?;
            let provider = OpenAiProvider::new(&config.llm).context("Failed to set up the model provider")?;
            let workflow = AnalysisWorkflow::from_config(&config, Arc::new(provider));
            let result = workflow.ask(&question, frame).await;

            if let (Some(path), Some(encoded)) = (&chart, &result.chart_url_or_data) {
                write_png(path, encoded)?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!("{}", result.response);
            if let Some(output) = result.textual_output.as_deref().filter(|o| !o.trim().is_empty()) {
                println!("\nOutput:");
                println!("{}", output.trim_end());
            }
            if result.chart_generated {
                match &chart {
                    Some(path) => println!("\nChart written to {}", path.display()),
                    None => println!("\nChart generated (use --chart to save it)"),
                }
            }
            if let Some(error) = &result.chart_error {
                eprintln!("{}", error.trim_end());
            }
            if !result.degraded.is_empty() {
                let stages: Vec<&str> = result.degraded.iter().map(|s| s.name()).collect();
                eprintln!("Warning: degraded stages: {}", stages.join(", "));
            }
        }

        Commands::Exec {
            script,
            data,
            chart,
        } => {
            let code = std::fs::read_to_string(&script)
                .with_context(|| format!("Failed to read script {}", script.display()))?;
            let frame = load_dataset(&data)?;
            let sandbox = Sandbox::new(config.sandbox.options());

            match chart {
                Some(path) => {
                    let outcome = sandbox.execute_chart(&code, frame).await;
                    let Some(png) = outcome.png_bytes() else {
                        anyhow::bail!("{}", outcome.text());
                    };
                    std::fs::write(&path, png)
                        .with_context(|| format!("Failed to write chart {}", path.display()))?;
                    println!("✓ Chart written to {}", path.display());
                }
                None => match sandbox.execute_data(&code, frame).await {
                    ExecutionOutcome::Completed { stdout, truncated } => {
                        print!("{}", stdout);
                        if truncated {
                            eprintln!("Warning: output was truncated");
                        }
                    }
                    ExecutionOutcome::Failed { error, stdout } => {
                        print!("{}", stdout);
                        anyhow::bail!("{}", error);
                    }
                },
            }
        }

        Commands::Import { input, out } => {
            let json = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let activities = dataset::parse_activities(&json)?;
            let frame = dataset::normalize(&activities)?;
            dataset::write_csv(&frame, &out)?;
            println!(
                "✓ Imported {} run(s) of {} activities into {}",
                frame.len(),
                activities.len(),
                out.display()
            );
        }

        Commands::Schema => {
            println!("{}", dataset::schema_overview());
        }

        Commands::Summary { data } => {
            let frame = load_dataset(&data)?;
            println!("{}", dataset::summarize(&frame));
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn load_dataset(path: &Path) -> Result<Arc<DataFrame>> {
    let frame = dataset::read_csv(path).with_context(|| format!("Failed to load dataset {}", path.display()))?;
    if let Err(e) = dataset::validate(&frame) {
        tracing::warn!(error = %e, "Dataset does not match the expected schema");
    }
    Ok(Arc::new(frame))
}

fn write_png(path: &Path, encoded: &str) -> Result<()> {
    use base64::Engine;
    let png = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .context("Chart payload is not valid base64")?;
    std::fs::write(path, png).with_context(|| format!("Failed to write chart {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from([
            "pacer",
            "--model",
            "gpt-4o-mini",
            "ask",
            "How far did I run in May?",
            "--data",
            "runs.csv",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.model.as_deref(), Some("gpt-4o-mini"));
        match cli.command {
            Commands::Ask {
                question,
                data,
                chart,
                json,
            } => {
                assert_eq!(question, "How far did I run in May?");
                assert_eq!(data, PathBuf::from("runs.csv"));
                assert_eq!(chart, None);
                assert!(json);
            }
            _ => panic!("Expected ask command"),
        }
    }

    #[test]
    fn test_parse_exec_with_chart() {
        let cli = Cli::try_parse_from(["pacer", "exec", "plot.py", "-d", "runs.csv", "--chart", "out.png"]).unwrap();
        match cli.command {
            Commands::Exec { script, chart, .. } => {
                assert_eq!(script, PathBuf::from("plot.py"));
                assert_eq!(chart, Some(PathBuf::from("out.png")));
            }
            _ => panic!("Expected exec command"),
        }
    }

    #[test]
    fn test_data_is_required() {
        assert!(Cli::try_parse_from(["pacer", "summary"]).is_err());
        assert!(Cli::try_parse_from(["pacer", "ask", "question"]).is_err());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["pacer", "schema", "--config", "custom.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("custom.toml"));
        assert!(matches!(cli.command, Commands::Schema));
    }

    #[test]
    fn test_write_png_decodes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        write_png(&path, "iVBORw0KGgo=").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
        assert!(write_png(&path, "not base64!").is_err());
    }
}
