//! Report Compiler: the long-form report plus a deterministic source appendix

use crate::audit::{AuditLog, Stage};
use crate::prompts;
use crate::services::StageServices;
use crate::{ResearchError, ResearchResult};
use deepcite_core::{ResearchConfig, ResearchState};

#[derive(Debug, Clone)]
pub struct ReportCompiler {
    max_sources: usize,
    char_limit: usize,
    include_final_checks: bool,
}

impl ReportCompiler {
    pub fn new(max_sources: usize, char_limit: usize, include_final_checks: bool) -> Self {
        Self {
            max_sources,
            char_limit,
            include_final_checks,
        }
    }

    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(
            config.max_sources_in_prompt,
            config.char_limits.report,
            config.include_final_checks_in_report,
        )
    }

    pub async fn run(
        &self,
        services: &StageServices,
        state: &mut ResearchState,
        audit: &mut AuditLog,
    ) -> ResearchResult<()> {
        audit.info(Stage::ReportCompiler, "Compiling professional report...");

        let selected = state.selected_sources(self.max_sources);
        let sources = prompts::report_sources(selected, self.char_limit);
        let final_checks = if self.include_final_checks {
            state.final_checks.as_deref()
        } else {
            None
        };
        let prompt = prompts::report_prompt(
            state.answer.as_deref().unwrap_or_default(),
            &sources,
            state.fact_checks.as_deref(),
            final_checks,
        );

        let response = services
            .complete(Stage::ReportCompiler, &prompt)
            .await
            .map_err(|e| ResearchError::stage(Stage::ReportCompiler, &state.original_query, e))?;

        let appendix = prompts::report_appendix(selected, self.char_limit);
        state.professional_report = Some(format!("{}{}", response, appendix));

        audit.success(Stage::ReportCompiler, "Professional report compiled");
        Ok(())
    }
}
