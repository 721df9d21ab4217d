//! Main orchestrator for pipeline execution.
//!
//! Sequences the requested phases in canonical order, gates each one on
//! artifact validation, and streams every state transition through the
//! broadcast hub.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::adapters::{CommandExecutor, PhaseExecutor, PhaseInputs, PhaseLog, PhaseOutput};
use crate::config::ResolvedConfig;
use crate::domain::{
    CheckpointInfo, EventKind, LogEvent, Phase, PhaseOutcome, PhaseRecord, PhaseStatus,
    PipelineResult, PipelineRun, PipelineStatus, RunConfig, RunState, ValidationResult,
};

use super::broadcast::BroadcastHub;
use super::checkpoint::CheckpointResolver;
use super::validator::ArtifactValidator;
use super::workspace::{RunWorkspace, WorkspaceError};

/// Source label on every event the orchestrator emits
const SOURCE: &str = "Orchestrator";

/// Longest report summary echoed in the completion event
const REPORT_SUMMARY_LIMIT: usize = 500;

/// Main pipeline orchestrator
pub struct Orchestrator {
    hub: Arc<BroadcastHub>,
    workspace: RunWorkspace,
    validator: ArtifactValidator,
    checkpoints: CheckpointResolver,
    executors: HashMap<Phase, Arc<dyn PhaseExecutor>>,
}

impl Orchestrator {
    /// Create an orchestrator with no executors registered
    pub fn new(hub: Arc<BroadcastHub>, workspace: RunWorkspace) -> Self {
        Self {
            hub,
            workspace,
            validator: ArtifactValidator::new(),
            checkpoints: CheckpointResolver::new(),
            executors: HashMap::new(),
        }
    }

    /// Orchestrator wired from resolved configuration.
    ///
    /// Every phase with an `executors.<phase>` entry gets a command
    /// executor; phases without one fail when requested.
    pub fn from_config(config: &ResolvedConfig, hub: Arc<BroadcastHub>) -> Self {
        let mut orchestrator = Self::new(hub, RunWorkspace::new(config.workspaces.clone()));
        for (phase, spec) in &config.executors {
            let executor = Arc::new(CommandExecutor::new(spec.clone()));
            orchestrator = orchestrator.with_executor(*phase, executor);
        }
        orchestrator
    }

    /// Register the executor for a phase, replacing any previous one
    pub fn with_executor(mut self, phase: Phase, executor: Arc<dyn PhaseExecutor>) -> Self {
        self.executors.insert(phase, executor);
        self
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn workspace(&self) -> &RunWorkspace {
        &self.workspace
    }

    pub fn validator(&self) -> &ArtifactValidator {
        &self.validator
    }

    /// Phases that have an executor registered, in canonical order
    pub fn registered_phases(&self) -> Vec<Phase> {
        Phase::ALL
            .into_iter()
            .filter(|phase| self.executors.contains_key(phase))
            .collect()
    }

    /// Whether the run would be skipped because its outputs already exist
    pub async fn should_skip(&self, config: &RunConfig) -> Result<bool, WorkspaceError> {
        if config.force {
            return Ok(false);
        }
        let path = self.workspace.path_for(&config.run_id)?;
        Ok(self
            .validator
            .is_satisfied(&config.ordered_phases(), &path)
            .await)
    }

    /// Resume hints for an existing run; `NotFound` if it never started
    pub async fn resume_hints(&self, run_id: &str) -> Result<CheckpointInfo, WorkspaceError> {
        let path = self.workspace.existing(run_id).await?;
        Ok(self.checkpoints.resolve(&path).await)
    }

    /// Continue a previously started run from what its workspace holds.
    ///
    /// Resuming always executes the requested phases; existing outputs
    /// never turn a resume into a skip.
    pub async fn resume(&self, config: &RunConfig) -> Result<PipelineResult, WorkspaceError> {
        let hints = self.resume_hints(&config.run_id).await?;
        info!(
            run_id = %config.run_id,
            total_pages = hints.total_pages,
            last_index = ?hints.last_index,
            "Resuming run"
        );
        self.execute(&config.clone().with_resume_hints(hints)).await
    }

    /// Start a run on its own task and return immediately
    pub fn spawn(self: &Arc<Self>, config: RunConfig) -> JoinHandle<Result<PipelineResult, WorkspaceError>> {
        let orchestrator = Arc::clone(self);
        let run_id = config.run_id.clone();
        spawn_logged(run_id, async move { orchestrator.run(&config).await })
    }

    /// Start a resume on its own task and return immediately
    pub fn spawn_resume(
        self: &Arc<Self>,
        config: RunConfig,
    ) -> JoinHandle<Result<PipelineResult, WorkspaceError>> {
        let orchestrator = Arc::clone(self);
        let run_id = config.run_id.clone();
        spawn_logged(run_id, async move { orchestrator.resume(&config).await })
    }

    /// Execute the requested phases of a run, unless their outputs exist
    pub async fn run(&self, config: &RunConfig) -> Result<PipelineResult, WorkspaceError> {
        if self.should_skip(config).await? {
            let workspace = self.workspace.path_for(&config.run_id)?;
            info!(run_id = %config.run_id, "Outputs already exist, skipping run");
            self.emit(
                LogEvent::new(
                    SOURCE,
                    EventKind::PipelineSkipped,
                    format!("Output already exists for run {}, skipping", config.run_id),
                )
                .with_run(&config.run_id),
            )
            .await;
            return Ok(PipelineResult::skipped(
                &config.run_id,
                workspace,
                "Output already exists",
            ));
        }

        self.execute(config).await
    }

    #[instrument(skip(self, config), fields(run_id = %config.run_id))]
    async fn execute(&self, config: &RunConfig) -> Result<PipelineResult, WorkspaceError> {
        let phases = config.ordered_phases();

        let workspace = match self.workspace.ensure(&config.run_id).await {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "Could not prepare workspace");
                self.emit(
                    LogEvent::log(SOURCE, format!("Pipeline error: {}", e)).with_run(&config.run_id),
                )
                .await;
                return Err(e);
            }
        };

        let mut run = PipelineRun::new(config.clone(), workspace.clone());
        let mut records: Vec<PhaseRecord> = Vec::new();
        let mut produced: BTreeMap<Phase, Vec<PathBuf>> = BTreeMap::new();

        info!(phases = ?phases, "Starting pipeline execution");
        self.emit(
            LogEvent::new(
                SOURCE,
                EventKind::PipelineStart,
                format!("Starting multi-phase testing pipeline:\n{}", config.summary()),
            )
            .with_run(&config.run_id),
        )
        .await;

        for phase in phases {
            run.set_status(phase, PhaseStatus::Running);
            self.emit_phase(
                &run,
                phase,
                EventKind::PhaseStart,
                format!("PHASE {}: {}", phase.number(), phase.title().to_uppercase()),
            )
            .await;

            let inputs = build_inputs(&run, phase, &produced);
            let started = Instant::now();
            let result = match self.executors.get(&phase) {
                Some(executor) => {
                    info!(%phase, executor = executor.name(), "Executing phase");
                    let log = PhaseLog::new(
                        Arc::clone(&self.hub),
                        executor.name(),
                        &config.run_id,
                        phase,
                    );
                    executor.execute(&inputs, &log).await
                }
                None => Err(anyhow::anyhow!("No executor registered for phase '{}'", phase)),
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            let output = match result {
                Ok(output) => output,
                Err(e) => {
                    return Ok(self
                        .fail_phase(run, records, phase, e, duration_ms)
                        .await);
                }
            };

            let validation = self.validator.validate(phase.as_str(), &workspace).await;
            if validation.degraded {
                warn!(%phase, reason = ?validation.reason, "Validation degraded, continuing");
            }

            if !validation.passed {
                let missing = validation.missing.join(", ");
                self.emit_phase(
                    &run,
                    phase,
                    EventKind::ValidationFailed,
                    format!(
                        "Phase {} validation failed - Missing: {}",
                        phase, missing
                    ),
                )
                .await;

                if !config.force {
                    return Ok(self
                        .halt(run, records, phase, output, validation, duration_ms)
                        .await);
                }
                warn!(%phase, %missing, "Validation failed, continuing because force is set");
            }

            produced.insert(phase, produced_artifacts(&validation, phase, &self.validator, &output));
            run.set_status(phase, PhaseStatus::Completed);
            records.push(PhaseRecord {
                phase,
                outcome: PhaseOutcome::Completed,
                validation: Some(validation),
                error: None,
                summary: non_empty(&output.summary),
                duration_ms,
            });

            info!(%phase, duration_ms, "Phase completed");
            self.emit_phase(
                &run,
                phase,
                EventKind::PhaseComplete,
                format!(
                    "Phase {}: {} completed successfully",
                    phase.number(),
                    phase.title()
                ),
            )
            .await;
        }

        Ok(self.complete(run, records).await)
    }

    /// Executor error: stop the run and report the phase as failed
    async fn fail_phase(
        &self,
        mut run: PipelineRun,
        mut records: Vec<PhaseRecord>,
        phase: Phase,
        error: anyhow::Error,
        duration_ms: u64,
    ) -> PipelineResult {
        let message = format!("{:#}", error);
        error!(%phase, error = %message, "Phase failed");

        run.set_status(phase, PhaseStatus::Failed);
        run.finish(RunState::Failed {
            phase,
            error: message.clone(),
        });
        records.push(PhaseRecord {
            phase,
            outcome: PhaseOutcome::Failed,
            validation: None,
            error: Some(message.clone()),
            summary: None,
            duration_ms,
        });

        self.emit_phase(
            &run,
            phase,
            EventKind::PhaseFailed,
            format!("Phase {}: {} failed: {}", phase.number(), phase.title(), message),
        )
        .await;

        PipelineResult {
            run_id: run.config.run_id,
            workspace: run.workspace,
            status: PipelineStatus::Failed {
                phase,
                error: message,
            },
            phases: records,
        }
    }

    /// Validation failure without force: stop before the next phase
    async fn halt(
        &self,
        mut run: PipelineRun,
        mut records: Vec<PhaseRecord>,
        phase: Phase,
        output: PhaseOutput,
        validation: ValidationResult,
        duration_ms: u64,
    ) -> PipelineResult {
        warn!(%phase, "Stopping pipeline after failed validation");
        let missing = validation.missing.clone();

        run.set_status(phase, PhaseStatus::Failed);
        run.finish(RunState::Halted { phase });
        records.push(PhaseRecord {
            phase,
            outcome: PhaseOutcome::ValidationFailed,
            validation: Some(validation),
            error: None,
            summary: non_empty(&output.summary),
            duration_ms,
        });

        PipelineResult {
            run_id: run.config.run_id,
            workspace: run.workspace,
            status: PipelineStatus::Halted { phase, missing },
            phases: records,
        }
    }

    /// Every requested phase ran
    async fn complete(&self, mut run: PipelineRun, records: Vec<PhaseRecord>) -> PipelineResult {
        run.finish(RunState::Completed);
        info!("Pipeline completed successfully");

        let completed: Vec<&str> = run.completed_phases().iter().map(|p| p.as_str()).collect();
        let mut message = format!(
            "Multi-phase testing pipeline completed\nAll outputs saved to: {}\nApplication tested: {}\nPhases completed: [{}]",
            run.workspace.display(),
            run.config.target_url,
            completed.join(", ")
        );
        let report = records
            .iter()
            .find(|r| r.phase == Phase::Reporting)
            .and_then(|r| r.summary.as_deref());
        if let Some(report) = report {
            message.push_str("\nFinal reporting summary:\n");
            message.push_str(&truncate(report, REPORT_SUMMARY_LIMIT));
        }

        self.emit(
            LogEvent::new(SOURCE, EventKind::PipelineComplete, message).with_run(run.run_id()),
        )
        .await;

        PipelineResult {
            run_id: run.config.run_id,
            workspace: run.workspace,
            status: PipelineStatus::Completed,
            phases: records,
        }
    }

    async fn emit_phase(&self, run: &PipelineRun, phase: Phase, kind: EventKind, message: String) {
        self.emit(
            LogEvent::new(SOURCE, kind, message)
                .with_run(run.run_id())
                .with_phase(phase),
        )
        .await;
    }

    async fn emit(&self, event: LogEvent) {
        self.hub.broadcast(&event).await;
    }
}

/// Run `task` on its own tokio task, logging how it ended
fn spawn_logged<F>(run_id: String, task: F) -> JoinHandle<Result<PipelineResult, WorkspaceError>>
where
    F: Future<Output = Result<PipelineResult, WorkspaceError>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = task.await;
        match &result {
            Ok(outcome) => info!(
                run_id = %outcome.run_id,
                status = ?outcome.status,
                "Background run finished"
            ),
            Err(e) => error!(%run_id, error = %e, "Background run failed"),
        }
        result
    })
}

fn build_inputs(
    run: &PipelineRun,
    phase: Phase,
    produced: &BTreeMap<Phase, Vec<PathBuf>>,
) -> PhaseInputs {
    let config = &run.config;
    PhaseInputs {
        phase,
        run_id: config.run_id.clone(),
        target_url: config.target_url.clone(),
        instructions: config.instructions.clone(),
        workspace: run.workspace.clone(),
        target_page_count: config.target_page_count,
        headless: config.headless,
        force: config.force,
        prior_artifacts: produced.clone(),
        resume_hints: config.resume_hints,
    }
}

/// Contract outputs that were found, plus whatever the executor reported
fn produced_artifacts(
    validation: &ValidationResult,
    phase: Phase,
    validator: &ArtifactValidator,
    output: &PhaseOutput,
) -> Vec<PathBuf> {
    let mut artifacts: Vec<PathBuf> = validator
        .contract(phase.as_str())
        .map(|contract| contract.outputs())
        .unwrap_or_default()
        .into_iter()
        .filter(|path| !validation.missing.contains(path))
        .map(|path| Path::new(path.trim_end_matches('/')).to_path_buf())
        .collect();

    for artifact in &output.artifacts {
        if !artifacts.contains(artifact) {
            artifacts.push(artifact.clone());
        }
    }
    artifacts
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Cut `text` to at most `limit` characters, marking the cut
fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
