//! Researcher: one bounded search iteration

use crate::audit::{AuditLog, Stage};
use crate::services::StageServices;
use crate::stages::QueryRefiner;
use crate::{ResearchError, ResearchResult};
use deepcite_core::{ResearchConfig, ResearchState, SearchConfig, SearchRequest};

/// What a single Researcher invocation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Budget was spent; nothing changed
    BudgetExhausted,
    Searched { new_sources: usize, total_sources: usize },
    /// Search failed; the iteration still counts
    SearchFailed,
}

#[derive(Debug, Clone)]
pub struct Researcher {
    refiner: QueryRefiner,
    search: SearchConfig,
}

impl Researcher {
    pub fn new(refiner: QueryRefiner, search: SearchConfig) -> Self {
        Self { refiner, search }
    }

    pub fn from_config(research: &ResearchConfig, search: &SearchConfig) -> Self {
        Self::new(QueryRefiner::from_config(research), search.clone())
    }

    pub async fn run(
        &self,
        services: &StageServices,
        state: &mut ResearchState,
        audit: &mut AuditLog,
    ) -> ResearchResult<IterationOutcome> {
        if !state.has_budget() {
            audit.warning(Stage::Researcher, "Maximum iterations reached - stopping research");
            return Ok(IterationOutcome::BudgetExhausted);
        }

        state.current_iteration += 1;
        audit.info(
            Stage::Researcher,
            format!("Iteration {}/{}", state.current_iteration, state.max_iterations),
        );

        let query = match self.refiner.refine(services, state, audit).await {
            Ok(refined) if !refined.is_empty() => refined,
            Ok(_) => {
                audit.warning(
                    Stage::QueryRefiner,
                    "Empty refined query, searching with the current query",
                );
                state.query.clone()
            }
            Err(e) if e.is_cancelled() => {
                return Err(ResearchError::Cancelled {
                    stage: Stage::QueryRefiner,
                })
            }
            Err(e) => {
                audit.warning(
                    Stage::QueryRefiner,
                    format!("Query refinement failed, searching with the current query: {}", e),
                );
                state.query.clone()
            }
        };

        let request = SearchRequest {
            query,
            depth: state.research_depth.search_depth(),
            max_results: self.search.max_results_for(state.research_depth),
        };

        match services.search(&request).await {
            Ok(documents) => {
                let new_sources = state.research_data.merge(documents);
                let total_sources = state.research_data.len();
                audit.success(
                    Stage::Researcher,
                    format!(
                        "Found {} new sources using query: '{}'\nTotal sources: {}",
                        new_sources, request.query, total_sources
                    ),
                );
                Ok(IterationOutcome::Searched {
                    new_sources,
                    total_sources,
                })
            }
            Err(e) if e.is_cancelled() => Err(ResearchError::Cancelled {
                stage: Stage::Researcher,
            }),
            Err(e) => {
                e.log();
                audit.error(Stage::Researcher, format!("Research failed: {}", e));
                Ok(IterationOutcome::SearchFailed)
            }
        }
    }
}
