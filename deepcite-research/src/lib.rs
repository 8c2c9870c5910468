//! Deepcite Research - the iterative research-refinement pipeline
//!
//! A run threads a single [`ResearchState`](deepcite_core::ResearchState)
//! through the stages below, recording every step in an [`AuditLog`]:
//!
//! - **Query Refiner** proposes a focused search query from the sources gathered so far
//! - **Researcher** runs one bounded search iteration and merges new documents
//! - **Drafter** writes a cited draft and filters unsupported lines
//! - **Fact Checker** lists issues in the draft
//! - **Corrector** turns issues into follow-up queries appended to the research question
//! - **Validator** performs a last audit of the draft
//! - **Report Compiler** produces the long-form report with a source appendix
//!
//! [`ResearchEngine`] drives the stages as a state machine and
//! [`FileResearchHistoryStorage`] persists finished runs.

pub mod audit;
pub mod engine;
pub mod history;
pub mod issues;
pub mod prompts;
pub mod services;
pub mod stages;

pub use audit::{AuditEntry, AuditLog, Severity, Stage};
pub use engine::{PipelineFailure, PipelineRun, PipelineStage, ResearchEngine, ResearchRequest};
pub use history::{
    FileResearchHistoryStorage, ResearchHistoryFilters, ResearchHistoryRecord,
    ResearchHistoryStorage, ResearchMetadata, ResearchStatus,
};
pub use issues::{count_marked_lines, parse_issues, parse_resolution_queries, Issue, IssueKind};
pub use services::StageServices;

use deepcite_core::DeepciteError;

/// Pipeline-level error type
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Core error: {0}")]
    Core(#[from] DeepciteError),

    #[error("{stage} failed for query '{query}': {source}")]
    Stage {
        stage: Stage,
        query: String,
        #[source]
        source: DeepciteError,
    },

    #[error("Research cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("Invalid research request: {message}")]
    InvalidRequest { message: String },

    #[error("History error: {message}")]
    History { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ResearchResult<T> = Result<T, ResearchError>;

impl ResearchError {
    /// Wrap a service failure raised inside a stage.
    ///
    /// Cancellation keeps its own variant so callers can tell an aborted run
    /// from a failed one.
    pub fn stage(stage: Stage, query: impl Into<String>, source: DeepciteError) -> Self {
        if source.is_cancelled() {
            Self::Cancelled { stage }
        } else {
            Self::Stage {
                stage,
                query: query.into(),
                source,
            }
        }
    }

    /// Create an invalid request error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a history error
    pub fn history<S: Into<String>>(message: S) -> Self {
        Self::History {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
            || matches!(self, Self::Core(e) if e.is_cancelled())
    }

    /// Stage in which the error was raised, when known
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } | Self::Cancelled { stage } => Some(*stage),
            _ => None,
        }
    }
}
