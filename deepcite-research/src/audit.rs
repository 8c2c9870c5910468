//! Append-only audit trail of a research run
//!
//! Every entry is also emitted as a `tracing` event so that a run can be
//! followed live in the logs as well as inspected afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

/// Pipeline component that produced an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    QueryRefiner,
    Researcher,
    Drafter,
    FactChecker,
    Corrector,
    Validator,
    ReportCompiler,
    Orchestrator,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::QueryRefiner => "Query Refiner",
            Stage::Researcher => "Researcher",
            Stage::Drafter => "Drafter",
            Stage::FactChecker => "Fact Checker",
            Stage::Corrector => "Corrector",
            Stage::Validator => "Validator",
            Stage::ReportCompiler => "Report Compiler",
            Stage::Orchestrator => "Orchestrator",
        }
    }

    /// Icon shown for informational entries of this stage
    fn icon(self) -> &'static str {
        match self {
            Stage::QueryRefiner => "🔄",
            Stage::Researcher => "🔍",
            Stage::Drafter => "📝",
            Stage::FactChecker => "🔎",
            Stage::Corrector => "🔧",
            Stage::Validator => "🛡️",
            Stage::ReportCompiler => "📑",
            Stage::Orchestrator => "⏹️",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub stage: Stage,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn icon(&self) -> &'static str {
        match (self.severity, self.stage) {
            (Severity::Error, _) => "❌",
            (Severity::Warning, Stage::FactChecker) => "⚠️",
            (Severity::Warning, Stage::Researcher | Stage::Orchestrator) => "⏹️",
            (Severity::Warning, _) => "⚠️",
            (Severity::Success, Stage::Researcher) => "📚",
            (Severity::Success, Stage::Corrector) => "📌",
            (Severity::Success, _) => "✅",
            (Severity::Info, stage) => stage.icon(),
        }
    }

    /// One-line rendering used by the CLI
    pub fn render(&self) -> String {
        format!("{} {}: {}", self.icon(), self.stage, self.message)
    }
}

/// Ordered, append-only list of audit entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: Stage, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info | Severity::Success => {
                info!(stage = %stage, severity = ?severity, "{}", message)
            }
            Severity::Warning => warn!(stage = %stage, "{}", message),
            Severity::Error => error!(stage = %stage, "{}", message),
        }

        self.entries.push(AuditEntry {
            stage,
            message,
            severity,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(stage, Severity::Info, message);
    }

    pub fn success(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(stage, Severity::Success, message);
    }

    pub fn warning(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(stage, Severity::Warning, message);
    }

    pub fn error(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(stage, Severity::Error, message);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries produced by a given stage, in order
    pub fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter().filter(move |e| e.stage == stage)
    }

    pub fn last(&self) -> Option<&AuditEntry> {
        self.entries.last()
    }
}

impl<'a> IntoIterator for &'a AuditLog {
    type Item = &'a AuditEntry;
    type IntoIter = std::slice::Iter<'a, AuditEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
