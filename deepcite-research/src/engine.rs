//! Research engine: drives the stages as a state machine
//!
//! ```text
//! Init -> Researching -> Drafting -> Checking -> Correcting -> Researching ...
//!                                       \-> Validating -> Reporting -> Done
//! ```
//!
//! Every stage works on a copy of the state that is committed only when the
//! stage succeeds, so a failed or cancelled run still carries the state of
//! the last completed stage.

use crate::audit::{AuditLog, Stage};
use crate::services::StageServices;
use crate::stages::{
    Corrector, Drafter, FactChecker, IterationOutcome, ReportCompiler, Researcher, Validator,
};
use crate::{ResearchError, ResearchResult};
use chrono::{DateTime, Utc};
use deepcite_core::performance::measure_async;
use deepcite_core::{
    log_operation_error, log_operation_start, log_operation_success, CompletionService,
    DeepciteConfig, ResearchConfig, ResearchDepth, ResearchState, SearchService,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Last stage a run completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Init,
    Researching,
    Drafting,
    Checking,
    Correcting,
    Validating,
    Reporting,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Init => "init",
            PipelineStage::Researching => "researching",
            PipelineStage::Drafting => "drafting",
            PipelineStage::Checking => "checking",
            PipelineStage::Correcting => "correcting",
            PipelineStage::Validating => "validating",
            PipelineStage::Reporting => "reporting",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A research query together with its optional overrides
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub query: String,
    /// Iteration budget; the configured default when absent
    pub iterations: Option<usize>,
    pub depth: Option<ResearchDepth>,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            iterations: None,
            depth: None,
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn with_depth(mut self, depth: ResearchDepth) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// Everything a run produced, complete or not
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub session_id: String,
    pub state: ResearchState,
    pub audit: AuditLog,
    pub stage: PipelineStage,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    fn new(state: ResearchState) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            state,
            audit: AuditLog::new(),
            stage: PipelineStage::Init,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn commit(&mut self, working: ResearchState, stage: PipelineStage) {
        self.state = working;
        self.stage = stage;
        debug!(session_id = %self.session_id, stage = %stage, "Stage committed");
    }

    pub fn is_done(&self) -> bool {
        self.stage == PipelineStage::Done
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

/// A run that stopped before `Done`, with the last consistent state
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct PipelineFailure {
    #[source]
    pub error: ResearchError,
    pub run: PipelineRun,
}

impl PipelineFailure {
    pub fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }
}

/// Orchestrates one research run per call
pub struct ResearchEngine {
    config: ResearchConfig,
    completion: Arc<dyn CompletionService>,
    search: Arc<dyn SearchService>,
    researcher: Researcher,
    drafter: Drafter,
    fact_checker: FactChecker,
    corrector: Corrector,
    validator: Validator,
    reporter: ReportCompiler,
}

impl ResearchEngine {
    pub fn new(
        config: &DeepciteConfig,
        completion: Arc<dyn CompletionService>,
        search: Arc<dyn SearchService>,
    ) -> Self {
        let research = &config.research;
        info!(
            completion = %completion.describe(),
            search = %search.describe(),
            "Creating research engine"
        );

        Self {
            config: research.clone(),
            completion,
            search,
            researcher: Researcher::from_config(research, &config.search),
            drafter: Drafter::from_config(research),
            fact_checker: FactChecker::from_config(research),
            corrector: Corrector::new(),
            validator: Validator::from_config(research),
            reporter: ReportCompiler::from_config(research),
        }
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Run a request to completion
    pub async fn run(&self, request: ResearchRequest) -> Result<PipelineRun, PipelineFailure> {
        self.run_with_cancellation(request, CancellationToken::new()).await
    }

    /// Run a request that can be stopped through `cancel`
    pub async fn run_with_cancellation(
        &self,
        request: ResearchRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineRun, PipelineFailure> {
        let iterations = request.iterations.unwrap_or(self.config.default_iterations);
        let depth = request.depth.unwrap_or(self.config.default_depth);
        let mut run = PipelineRun::new(ResearchState::new(request.query.trim(), iterations, depth));

        if let Err(error) = self.validate_request(&run.state) {
            run.audit.error(Stage::Orchestrator, error.to_string());
            run.finished_at = Some(Utc::now());
            return Err(PipelineFailure { error, run });
        }

        log_operation_start!(
            "research_run",
            session_id = %run.session_id,
            query = %run.state.query
        );

        let services = StageServices::new(
            Arc::clone(&self.completion),
            Arc::clone(&self.search),
            Duration::from_secs(self.config.call_timeout_secs),
        )
        .with_cancellation(cancel);

        let result = self.drive(&services, &mut run).await;
        run.finished_at = Some(Utc::now());

        match result {
            Ok(()) => {
                log_operation_success!(
                    "research_run",
                    session_id = %run.session_id,
                    sources = run.state.research_data.len(),
                    iterations = run.state.current_iteration
                );
                Ok(run)
            }
            Err(error) => {
                let stage = error.failed_stage().unwrap_or(Stage::Orchestrator);
                if error.is_cancelled() {
                    run.audit
                        .warning(stage, format!("Run cancelled after {} stage", run.stage));
                } else {
                    run.audit.error(stage, format!("Pipeline aborted: {}", error));
                }
                log_operation_error!("research_run", error, session_id = %run.session_id);
                Err(PipelineFailure { error, run })
            }
        }
    }

    fn validate_request(&self, state: &ResearchState) -> ResearchResult<()> {
        if state.query.is_empty() {
            return Err(ResearchError::invalid_request("Research query must not be empty"));
        }
        self.config
            .validate_iterations(state.max_iterations)
            .map_err(|e| ResearchError::invalid_request(e.to_string()))
    }

    async fn drive(&self, services: &StageServices, run: &mut PipelineRun) -> ResearchResult<()> {
        loop {
            checkpoint(services, Stage::Researcher)?;
            let mut working = run.state.clone();
            let outcome = measure_async(
                Stage::Researcher.name(),
                self.researcher.run(services, &mut working, &mut run.audit),
            )
            .await?;
            run.commit(working, PipelineStage::Researching);
            debug!(?outcome, "Research iteration finished");
            if outcome == IterationOutcome::BudgetExhausted {
                // Only reachable when the loop is entered without budget
                break;
            }

            checkpoint(services, Stage::Drafter)?;
            let mut working = run.state.clone();
            measure_async(
                Stage::Drafter.name(),
                self.drafter.run(services, &mut working, &mut run.audit),
            )
            .await?;
            run.commit(working, PipelineStage::Drafting);

            checkpoint(services, Stage::FactChecker)?;
            let mut working = run.state.clone();
            let issues = measure_async(
                Stage::FactChecker.name(),
                self.fact_checker.run(services, &mut working, &mut run.audit),
            )
            .await?;
            run.commit(working, PipelineStage::Checking);

            if !run.state.has_budget() {
                run.audit.warning(
                    Stage::Orchestrator,
                    format!(
                        "Maximum iterations reached ({}) - moving to validation",
                        run.state.max_iterations
                    ),
                );
                break;
            }
            if !self.config.continuation.should_continue(issues.len()) {
                run.audit.info(
                    Stage::Orchestrator,
                    format!(
                        "{} parsed issues after iteration {}; continuation policy ends research",
                        issues.len(),
                        run.state.current_iteration
                    ),
                );
                break;
            }

            checkpoint(services, Stage::Corrector)?;
            let mut working = run.state.clone();
            measure_async(
                Stage::Corrector.name(),
                self.corrector.run(services, &mut working, &mut run.audit),
            )
            .await?;
            run.commit(working, PipelineStage::Correcting);
        }

        checkpoint(services, Stage::Validator)?;
        let mut working = run.state.clone();
        measure_async(
            Stage::Validator.name(),
            self.validator.run(services, &mut working, &mut run.audit),
        )
        .await?;
        run.commit(working, PipelineStage::Validating);

        checkpoint(services, Stage::ReportCompiler)?;
        let mut working = run.state.clone();
        measure_async(
            Stage::ReportCompiler.name(),
            self.reporter.run(services, &mut working, &mut run.audit),
        )
        .await?;
        run.commit(working, PipelineStage::Reporting);

        run.stage = PipelineStage::Done;
        Ok(())
    }
}

fn checkpoint(services: &StageServices, stage: Stage) -> ResearchResult<()> {
    if services.is_cancelled() {
        return Err(ResearchError::Cancelled { stage });
    }
    Ok(())
}

impl fmt::Debug for ResearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResearchEngine")
            .field("completion", &self.completion.describe())
            .field("search", &self.search.describe())
            .field("continuation", &self.config.continuation)
            .finish()
    }
}
