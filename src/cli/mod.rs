//! Command-line interface for qaflow.
//!
//! Provides commands for running and resuming pipelines, inspecting run
//! workspaces, and serving the HTTP/WebSocket API.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::EventLogSubscriber;
use crate::config::{self, ResolvedConfig};
use crate::core::{BroadcastHub, Orchestrator, RunStatus, RunWorkspace};
use crate::domain::{Phase, PipelineResult, PipelineStatus, RunRequest};

pub mod console;

use console::ConsoleSubscriber;

/// qaflow - Multi-phase web application testing pipeline
#[derive(Parser, Debug)]
#[command(name = "qaflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run pipeline phases against an application
    Run {
        /// Base URL of the application under test
        base_url: String,

        /// Free-text guidance for the agents
        #[arg(short, long, default_value = "")]
        instructions: String,

        /// Phases to run (comma-separated)
        #[arg(short, long, value_delimiter = ',', default_value = "exploration")]
        phases: Vec<String>,

        /// Run ID (generated if not provided)
        #[arg(long)]
        run_id: Option<String>,

        /// Redo phases even if their outputs exist
        #[arg(short, long)]
        force: bool,

        /// Run browsers without a window
        #[arg(long)]
        headless: bool,

        /// Pages exploration should aim for
        #[arg(long)]
        target_page_count: Option<u32>,
    },

    /// Resume an interrupted run
    Resume {
        /// Run ID to resume
        run_id: String,

        /// Base URL of the application under test
        base_url: String,

        /// Phases to run (comma-separated)
        #[arg(short, long, value_delimiter = ',', default_value = "exploration")]
        phases: Vec<String>,

        /// Free-text guidance for the agents
        #[arg(short, long, default_value = "")]
        instructions: String,

        /// Redo phases even if their outputs exist
        #[arg(short, long)]
        force: bool,

        /// Run browsers without a window
        #[arg(long)]
        headless: bool,
    },

    /// Show artifact progress of a run
    Status {
        /// Run ID
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List pipeline phases and their outputs
    Phases,

    /// Start the HTTP/WebSocket server
    Serve {
        /// Address to bind to (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Run {
                base_url,
                instructions,
                phases,
                run_id,
                force,
                headless,
                target_page_count,
            } => {
                let request = RunRequest {
                    base_url,
                    instructions,
                    force,
                    headless,
                    test_run_id: run_id,
                    phases,
                    target_page_count: target_page_count.unwrap_or(cfg.target_page_count),
                };
                run_pipeline(cfg, request, false).await
            }
            Commands::Resume {
                run_id,
                base_url,
                phases,
                instructions,
                force,
                headless,
            } => {
                let request = RunRequest {
                    base_url,
                    instructions,
                    force,
                    headless,
                    test_run_id: Some(run_id),
                    phases,
                    target_page_count: cfg.target_page_count,
                };
                run_pipeline(cfg, request, true).await
            }
            Commands::Status { run_id } => show_status(cfg, &run_id).await,
            Commands::Runs { limit } => list_runs(cfg, limit).await,
            Commands::Phases => {
                list_phases();
                Ok(())
            }
            Commands::Serve { bind } => serve(cfg, bind).await,
            Commands::Config => {
                show_config(cfg);
                Ok(())
            }
        }
    }
}

/// Hub with the per-run event log attached
async fn build_hub(cfg: &ResolvedConfig) -> Arc<BroadcastHub> {
    let hub = Arc::new(BroadcastHub::with_delivery_timeout(cfg.delivery_timeout));
    let event_log = EventLogSubscriber::new(RunWorkspace::new(cfg.workspaces.clone()));
    hub.register(Arc::new(event_log)).await;
    hub
}

/// Run (or resume) a pipeline in the foreground
async fn run_pipeline(cfg: &ResolvedConfig, request: RunRequest, resume: bool) -> Result<()> {
    let config = if resume {
        request.into_resume_config()?
    } else {
        request.into_config()?
    };

    let hub = build_hub(cfg).await;
    hub.register(Arc::new(ConsoleSubscriber)).await;
    let orchestrator = Orchestrator::from_config(cfg, hub);

    let result = if resume {
        orchestrator.resume(&config).await?
    } else {
        orchestrator.run(&config).await?
    };

    report(&result)
}

/// Print the final outcome, exiting non-zero unless the run succeeded
fn report(result: &PipelineResult) -> Result<()> {
    match &result.status {
        PipelineStatus::Completed => {
            for record in &result.phases {
                if let Some(summary) = &record.summary {
                    println!("== {} ==\n{}\n", record.phase.title(), summary);
                }
            }
            eprintln!(
                "\n[Run {} completed: outputs in {}]",
                result.run_id,
                result.workspace.display()
            );
        }
        PipelineStatus::Skipped { reason } => {
            eprintln!("\n[Run {} skipped: {}]", result.run_id, reason);
        }
        PipelineStatus::Halted { phase, missing } => {
            eprintln!(
                "\n[Run {} halted after {}: missing {}]",
                result.run_id,
                phase,
                missing.join(", ")
            );
            std::process::exit(1);
        }
        PipelineStatus::Failed { phase, error } => {
            eprintln!("\n[Run {} failed in {}: {}]", result.run_id, phase, error);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Show the artifact status of a run
async fn show_status(cfg: &ResolvedConfig, run_id: &str) -> Result<()> {
    let orchestrator = Orchestrator::from_config(cfg, Arc::new(BroadcastHub::new()));
    let status = RunStatus::collect(orchestrator.workspace(), orchestrator.validator(), run_id)
        .await
        .with_context(|| format!("Failed to read status of run {}", run_id))?;

    println!("Run ID: {}", status.test_run_id);
    println!("Path: {}", status.run_path.display());
    println!("Progress: {}", status.overall_progress);
    println!("Complete: {}", status.is_complete);
    println!("\nPhases:");
    for (phase, phase_status) in &status.phases {
        let mark = if phase_status.completed { "done" } else { "pending" };
        println!(
            "  {:<12} {:<8} {}/{} outputs",
            phase.as_str(),
            mark,
            phase_status.outputs.len(),
            phase_status.expected.len()
        );
    }

    Ok(())
}

/// List recent runs
async fn list_runs(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let workspace = RunWorkspace::new(cfg.workspaces.clone());
    let runs = workspace.list_runs().await?;

    if runs.is_empty() {
        println!("No runs found in {}", cfg.workspaces.display());
        return Ok(());
    }

    for run_id in runs.into_iter().take(limit) {
        println!("{}", run_id);
    }

    Ok(())
}

fn list_phases() {
    let validator = crate::core::ArtifactValidator::new();
    for phase in Phase::ALL {
        println!("{}. {} ({})", phase.number(), phase.title(), phase.as_str());
        println!("   {}", phase.description());
        if let Some(contract) = validator.contract(phase.as_str()) {
            println!("   outputs: {}", contract.outputs().join(", "));
        }
    }
}

/// Start the HTTP/WebSocket server
async fn serve(cfg: &ResolvedConfig, bind: Option<String>) -> Result<()> {
    let mut settings = cfg.server.clone();
    if let Some(bind) = bind {
        settings.bind = bind;
    }

    let hub = build_hub(cfg).await;
    let orchestrator = Arc::new(Orchestrator::from_config(cfg, hub));
    if orchestrator.registered_phases().is_empty() {
        tracing::warn!("No phase executors configured; every run will fail");
    }

    crate::server::start_server(&settings, orchestrator).await
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &ResolvedConfig) {
    println!("qaflow configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (engine state): {}", cfg.home.display());
    println!("  Workspaces:          {}", cfg.workspaces.display());
    println!();
    println!("Server:");
    println!("  Bind:         {}", cfg.server.bind);
    println!("  CORS origins: {}", cfg.server.cors_origins.join(", "));
    println!();
    println!("Delivery timeout:  {:?}", cfg.delivery_timeout);
    println!("Target page count: {}", cfg.target_page_count);
    println!();
    println!("Executors:");
    if cfg.executors.is_empty() {
        println!("  (none configured)");
    }
    for (phase, spec) in &cfg.executors {
        let timeout = spec
            .timeout_seconds
            .map(|s| format!(" (timeout {}s)", s))
            .unwrap_or_default();
        println!(
            "  {:<12} {} {}{}",
            phase.as_str(),
            spec.program,
            spec.args.join(" "),
            timeout
        );
    }
}
