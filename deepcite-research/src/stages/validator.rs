//! Validator: last audit of the draft before the report is written

use crate::audit::{AuditLog, Stage};
use crate::issues::{count_marked_lines, parse_issues, Issue};
use crate::prompts;
use crate::services::StageServices;
use crate::{ResearchError, ResearchResult};
use deepcite_core::{ParseMode, ResearchConfig, ResearchState};

#[derive(Debug, Clone)]
pub struct Validator {
    max_sources: usize,
    char_limit: usize,
    parse_mode: ParseMode,
}

impl Validator {
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
            config.char_limits.validation,
            config.issue_parse_mode,
        )
    }

    /// Store findings in `final_checks`. The returned issues are informational only.
    pub async fn run(
        &self,
        services: &StageServices,
        state: &mut ResearchState,
        audit: &mut AuditLog,
    ) -> ResearchResult<Vec<Issue>> {
        audit.info(Stage::Validator, "Final validation...");

        let selected = state.selected_sources(self.max_sources);
        let sources = prompts::check_sources(selected, self.char_limit);
        let answer = state.answer.as_deref().unwrap_or_default();
        let prompt = prompts::validation_prompt(answer, &sources);

        let response = services
            .complete(Stage::Validator, &prompt)
            .await
            .map_err(|e| ResearchError::stage(Stage::Validator, &state.original_query, e))?;

        let lines: Vec<String> = response.split('\n').map(str::to_string).collect();
        let issues = parse_issues(&lines, self.parse_mode);

        audit.info(
            Stage::Validator,
            format!("Validation found {} remaining issues", count_marked_lines(&lines)),
        );
        state.final_checks = Some(lines);
        Ok(issues)
    }
}
