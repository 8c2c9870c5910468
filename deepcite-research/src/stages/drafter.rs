//! Drafter: writes the cited answer and strips unsupported lines

use crate::audit::{AuditLog, Stage};
use crate::prompts;
use crate::services::StageServices;
use crate::{ResearchError, ResearchResult};
use deepcite_core::{ResearchConfig, ResearchState};

#[derive(Debug, Clone)]
pub struct Drafter {
    max_sources: usize,
    char_limit: usize,
    hedge_words: Vec<String>,
}

impl Drafter {
    pub fn new(max_sources: usize, char_limit: usize, hedge_words: Vec<String>) -> Self {
        Self {
            max_sources,
            char_limit,
            hedge_words,
        }
    }

    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(
            config.max_sources_in_prompt,
            config.char_limits.draft,
            config.hedge_words.clone(),
        )
    }

    pub async fn run(
        &self,
        services: &StageServices,
        state: &mut ResearchState,
        audit: &mut AuditLog,
    ) -> ResearchResult<()> {
        audit.info(Stage::Drafter, "Creating final draft...");

        let selected = state.selected_sources(self.max_sources);
        let sources = prompts::draft_sources(selected, self.char_limit);
        let prompt = prompts::draft_prompt(&state.query, state.fact_checks.as_deref(), &sources);

        let response = services
            .complete(Stage::Drafter, &prompt)
            .await
            .map_err(|e| ResearchError::stage(Stage::Drafter, &state.original_query, e))?;

        state.answer = Some(heuristic_filter(&response, &self.hedge_words));
        audit.success(Stage::Drafter, "Draft created with source verification");
        Ok(())
    }
}

/// Keep a line when it cites a source, is flagged for verification, or
/// contains none of the hedge words.
///
/// This is a textual heuristic: it drops legitimate sentences that happen to
/// contain a hedge word and keeps unsupported prose that avoids them.
pub fn heuristic_filter(text: &str, hedge_words: &[String]) -> String {
    text.split('\n')
        .filter(|line| {
            line.contains("[Source")
                || line.contains("Needs Verification")
                || !hedge_words.iter().any(|word| line.contains(word.as_str()))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_words() -> Vec<String> {
        ResearchConfig::default().hedge_words
    }

    #[test]
    fn keeps_cited_lines_and_drops_hedged_prose() {
        let draft = "RSA was invented in 1977. [Source 1]\nSome people claim it is unbreakable.";
        assert_eq!(
            heuristic_filter(draft, &default_words()),
            "RSA was invented in 1977. [Source 1]"
        );
    }

    #[test]
    fn verification_markers_survive() {
        let draft = "Reports state 2048-bit keys are standard. [Needs Verification]";
        assert_eq!(heuristic_filter(draft, &default_words()), draft);
    }

    #[test]
    fn matching_is_case_sensitive_substring() {
        let words = default_words();
        // "statement" contains "state"
        assert_eq!(heuristic_filter("A bold statement.", &words), "");
        assert_eq!(heuristic_filter("Claims vary.", &words), "Claims vary.");
    }

    #[test]
    fn plain_lines_and_blank_lines_are_kept() {
        let draft = "## History\n\nRivest, Shamir and Adleman published RSA.";
        assert_eq!(heuristic_filter(draft, &default_words()), draft);
    }
}
