//! Configuration management

use crate::async_utils::RetryConfig;
use crate::error::{DeepciteError, DeepciteResult, ErrorContext};
use crate::types::ResearchDepth;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepciteConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub ui: UiConfig,
}

/// Completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider type (groq, openai, anthropic, ollama)
    pub provider: String,
    /// Model name
    pub model: String,
    /// API key (optional, can be set via environment)
    pub api_key: Option<String>,
    /// Base URL for custom providers
    pub base_url: Option<String>,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

impl LlmConfig {
    /// Environment variable holding the API key for the configured provider
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "groq" => Some("GROQ_API_KEY"),
            "openai" => Some("OPENAI_API_KEY"),
            "anthropic" => Some("ANTHROPIC_API_KEY"),
            _ => None,
        }
    }
}

/// Web search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: String,
    /// Results requested for Overview and Detailed research
    pub max_results: usize,
    /// Results requested for Deep Dive research
    pub deep_dive_max_results: usize,
    /// HTTP request timeout
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: "tavily".to_string(),
            api_key: None,
            base_url: "https://api.tavily.com".to_string(),
            max_results: 10,
            deep_dive_max_results: 15,
            timeout_secs: 30,
        }
    }
}

impl SearchConfig {
    pub fn max_results_for(&self, depth: ResearchDepth) -> usize {
        match depth {
            ResearchDepth::DeepDive => self.deep_dive_max_results,
            ResearchDepth::Overview | ResearchDepth::Detailed => self.max_results,
        }
    }
}

/// Per-stage character limits applied to document content in prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceCharLimits {
    pub draft: usize,
    pub fact_check: usize,
    pub validation: usize,
    pub report: usize,
}

impl Default for SourceCharLimits {
    fn default() -> Self {
        Self {
            draft: 200,
            fact_check: 200,
            validation: 150,
            report: 300,
        }
    }
}

/// Decides whether the pipeline loops back after fact checking.
///
/// The loop is always bounded by the iteration budget; the policy can only
/// end it earlier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum ContinuationPolicy {
    /// Loop whenever iteration budget remains
    #[default]
    UntilBudget,
    /// Loop only while at least `min_issues` issues were found
    WhileIssues { min_issues: usize },
}

impl ContinuationPolicy {
    pub fn should_continue(&self, issue_count: usize) -> bool {
        match self {
            ContinuationPolicy::UntilBudget => true,
            ContinuationPolicy::WhileIssues { min_issues } => issue_count >= (*min_issues).max(1),
        }
    }
}

/// How strictly fact-check output is parsed into issues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Only marker lines with a recognised issue type count
    Strict,
    /// Any marker line counts; unknown types become unclassified issues
    #[default]
    Lenient,
}

/// Research pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Most recent documents placed in any prompt
    pub max_sources_in_prompt: usize,
    pub char_limits: SourceCharLimits,
    pub default_iterations: usize,
    pub min_iterations: usize,
    pub max_iterations: usize,
    pub default_depth: ResearchDepth,
    pub continuation: ContinuationPolicy,
    pub issue_parse_mode: ParseMode,
    /// Feed validator findings into the report prompt
    pub include_final_checks_in_report: bool,
    /// Timeout applied to every completion and search call
    pub call_timeout_secs: u64,
    /// Substrings that mark a draft line as unsupported when it has no citation
    pub hedge_words: Vec<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_sources_in_prompt: 5,
            char_limits: SourceCharLimits::default(),
            default_iterations: 5,
            min_iterations: 1,
            max_iterations: 10,
            default_depth: ResearchDepth::Detailed,
            continuation: ContinuationPolicy::UntilBudget,
            issue_parse_mode: ParseMode::Lenient,
            include_final_checks_in_report: false,
            call_timeout_secs: 120,
            hedge_words: vec![
                "claim".to_string(),
                "state".to_string(),
                "report".to_string(),
            ],
        }
    }
}

impl ResearchConfig {
    /// Check a requested iteration budget against the configured bounds
    pub fn validate_iterations(&self, iterations: usize) -> DeepciteResult<()> {
        if iterations < self.min_iterations || iterations > self.max_iterations {
            return Err(DeepciteError::Validation {
                message: format!(
                    "Iterations must be between {} and {}, got {}",
                    self.min_iterations, self.max_iterations, iterations
                ),
                field: Some("iterations".to_string()),
                context: ErrorContext::new("config")
                    .with_operation("validate_iterations")
                    .with_suggestion("Pick an iteration count within the configured bounds"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding completed run records
    pub history_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_dir: "~/.deepcite/history".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Records per page when listing history
    pub page_size: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { page_size: 10 }
    }
}

fn invalid(message: &str, suggestion: &str) -> DeepciteError {
    DeepciteError::Config {
        message: message.to_string(),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_suggestion(suggestion),
    }
}

impl DeepciteConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> DeepciteResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DeepciteError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> DeepciteResult<Self> {
        toml::from_str(content).map_err(|e| DeepciteError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DeepciteResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| DeepciteError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| DeepciteError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Fill missing API keys from the environment
    pub fn apply_env_overrides(&mut self) {
        if self.llm.api_key.is_none() {
            if let Some(var) = self.llm.api_key_env_var() {
                self.llm.api_key = std::env::var(var).ok();
            }
        }

        if self.search.api_key.is_none() {
            self.search.api_key = std::env::var("TAVILY_API_KEY").ok();
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> DeepciteResult<()> {
        let research = &self.research;

        if research.max_sources_in_prompt == 0 {
            return Err(invalid(
                "research.max_sources_in_prompt must be greater than 0",
                "Set research.max_sources_in_prompt to a positive value",
            ));
        }

        let limits = &research.char_limits;
        if [limits.draft, limits.fact_check, limits.validation, limits.report].contains(&0) {
            return Err(invalid(
                "All research.char_limits must be greater than 0",
                "Set each of draft, fact_check, validation and report to a positive value",
            ));
        }

        if research.min_iterations == 0
            || research.min_iterations > research.default_iterations
            || research.default_iterations > research.max_iterations
        {
            return Err(invalid(
                "Iteration bounds must satisfy 1 <= min <= default <= max",
                "Adjust research.min_iterations, default_iterations and max_iterations",
            ));
        }

        if research.call_timeout_secs == 0 {
            return Err(invalid(
                "research.call_timeout_secs must be greater than 0",
                "Set research.call_timeout_secs to a positive value",
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid(
                "llm.temperature must be between 0.0 and 2.0",
                "Set llm.temperature to a value between 0.0 and 2.0",
            ));
        }

        if self.search.max_results == 0 || self.search.deep_dive_max_results == 0 {
            return Err(invalid(
                "search result counts must be greater than 0",
                "Set search.max_results and search.deep_dive_max_results to positive values",
            ));
        }

        if self.ui.page_size == 0 {
            return Err(invalid(
                "ui.page_size must be greater than 0",
                "Set ui.page_size to a positive value",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DeepciteConfig::default();
        config.validate().unwrap();
        assert_eq!(config.research.max_sources_in_prompt, 5);
        assert_eq!(config.research.char_limits.validation, 150);
        assert_eq!(config.search.max_results_for(ResearchDepth::DeepDive), 15);
        assert_eq!(config.search.max_results_for(ResearchDepth::Overview), 10);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = DeepciteConfig::from_toml_str(
            r#"
            [research]
            max_sources_in_prompt = 3

            [research.continuation]
            policy = "while-issues"
            min_issues = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.research.max_sources_in_prompt, 3);
        assert_eq!(config.research.char_limits.report, 300);
        assert_eq!(
            config.research.continuation,
            ContinuationPolicy::WhileIssues { min_issues: 2 }
        );
        assert_eq!(config.llm.provider, "groq");
    }

    #[test]
    fn rejects_inverted_iteration_bounds() {
        let mut config = DeepciteConfig::default();
        config.research.default_iterations = 20;
        assert!(matches!(
            config.validate(),
            Err(DeepciteError::Config { .. })
        ));
    }

    #[test]
    fn iteration_requests_are_bounded() {
        let research = ResearchConfig::default();
        assert!(research.validate_iterations(1).is_ok());
        assert!(research.validate_iterations(10).is_ok());
        assert!(matches!(
            research.validate_iterations(11),
            Err(DeepciteError::Validation { .. })
        ));
        assert!(research.validate_iterations(0).is_err());
    }

    #[test]
    fn continuation_policies() {
        assert!(ContinuationPolicy::UntilBudget.should_continue(0));
        let policy = ContinuationPolicy::WhileIssues { min_issues: 2 };
        assert!(!policy.should_continue(1));
        assert!(policy.should_continue(2));
    }

    #[test]
    fn config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = DeepciteConfig::default();
        config.research.default_depth = ResearchDepth::DeepDive;
        config.save_to_file(&path).unwrap();

        let loaded = DeepciteConfig::from_file(&path).unwrap();
        assert_eq!(loaded.research.default_depth, ResearchDepth::DeepDive);
    }
}
