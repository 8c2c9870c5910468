//! Query Refiner: proposes a focused follow-up search query

use crate::audit::{AuditLog, Stage};
use crate::prompts;
use crate::services::StageServices;
use deepcite_core::{DeepciteResult, ResearchConfig, ResearchState};

#[derive(Debug, Clone)]
pub struct QueryRefiner {
    max_sources: usize,
}

impl QueryRefiner {
    pub fn new(max_sources: usize) -> Self {
        Self { max_sources }
    }

    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(config.max_sources_in_prompt)
    }

    /// Return the refined query. Failures are left to the caller.
    pub async fn refine(
        &self,
        services: &StageServices,
        state: &ResearchState,
        audit: &mut AuditLog,
    ) -> DeepciteResult<String> {
        let titles: Vec<&str> = state
            .selected_sources(self.max_sources)
            .iter()
            .map(|doc| doc.title.as_str())
            .collect();

        let prompt = prompts::refine_query_prompt(&state.query, &titles);
        let refined = services
            .complete(Stage::QueryRefiner, &prompt)
            .await?
            .trim()
            .to_string();

        audit.info(
            Stage::QueryRefiner,
            format!("Generated exploration query: '{}'", refined),
        );
        Ok(refined)
    }
}
