//! Corrector: turns fact-check issues into follow-up search queries

use crate::audit::{AuditLog, Stage};
use crate::issues::{parse_resolution_queries, ISSUE_MARKER};
use crate::prompts;
use crate::services::StageServices;
use crate::{ResearchError, ResearchResult};
use deepcite_core::ResearchState;

#[derive(Debug, Clone, Default)]
pub struct Corrector;

impl Corrector {
    pub fn new() -> Self {
        Self
    }

    /// Append quoted resolution queries to `state.query` and return them
    pub async fn run(
        &self,
        services: &StageServices,
        state: &mut ResearchState,
        audit: &mut AuditLog,
    ) -> ResearchResult<Vec<String>> {
        audit.info(Stage::Corrector, "Generating correction queries...");

        let issue_lines: Vec<&str> = state
            .fact_checks
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(|line| line.contains(ISSUE_MARKER))
            .collect();

        if issue_lines.is_empty() {
            audit.success(Stage::Corrector, "No issues to correct; query unchanged");
            return Ok(Vec::new());
        }

        let prompt = prompts::correction_prompt(&issue_lines);
        let response = services
            .complete(Stage::Corrector, &prompt)
            .await
            .map_err(|e| ResearchError::stage(Stage::Corrector, &state.original_query, e))?;

        let queries = parse_resolution_queries(&response);
        let previous = state.query.clone();
        state.query = augment_query(&state.query, &queries);

        audit.success(
            Stage::Corrector,
            format!(
                "Generated {} correction queries\nOriginal query: {}\nUpdated query: {}",
                queries.len(),
                previous,
                state.query
            ),
        );
        Ok(queries)
    }
}

/// `Q` plus `["a", "b"]` becomes `Q "a" "b"`; no queries leaves `Q` untouched
pub fn augment_query(query: &str, resolution_queries: &[String]) -> String {
    if resolution_queries.is_empty() {
        return query.to_string();
    }

    let quoted = resolution_queries
        .iter()
        .map(|q| format!("\"{}\"", q))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {}", query, quoted)
}
