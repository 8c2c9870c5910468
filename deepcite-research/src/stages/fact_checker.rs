//! Fact Checker: lists issues in the current draft

use crate::audit::{AuditLog, Stage};
use crate::issues::{count_marked_lines, parse_issues, Issue};
use crate::prompts;
use crate::services::StageServices;
use crate::{ResearchError, ResearchResult};
use deepcite_core::{ParseMode, ResearchConfig, ResearchState};

#[derive(Debug, Clone)]
pub struct FactChecker {
    max_sources: usize,
    char_limit: usize,
    parse_mode: ParseMode,
}

impl FactChecker {
    pub fn new(max_sources: usize, char_limit: usize, parse_mode: ParseMode) -> Self {
        Self {
            max_sources,
            char_limit,
            parse_mode,
        }
    }

    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(
            config.max_sources_in_prompt,
            config.char_limits.fact_check,
            config.issue_parse_mode,
        )
    }

    /// Store the report lines in `fact_checks` and return the parsed issues
    pub async fn run(
        &self,
        services: &StageServices,
        state: &mut ResearchState,
        audit: &mut AuditLog,
    ) -> ResearchResult<Vec<Issue>> {
        audit.info(Stage::FactChecker, "Verifying claims against sources...");

        let selected = state.selected_sources(self.max_sources);
        let sources = prompts::check_sources(selected, self.char_limit);
        let answer = state.answer.as_deref().unwrap_or_default();
        let prompt = prompts::fact_check_prompt(answer, &sources);

        let response = services
            .complete(Stage::FactChecker, &prompt)
            .await
            .map_err(|e| ResearchError::stage(Stage::FactChecker, &state.original_query, e))?;

        let lines: Vec<String> = response.split('\n').map(str::to_string).collect();
        let issues = parse_issues(&lines, self.parse_mode);

        audit.warning(
            Stage::FactChecker,
            format!("Identified {} resolvable issues", count_marked_lines(&lines)),
        );
        state.fact_checks = Some(lines);
        Ok(issues)
    }
}
