//! Unified error handling system
//!
//! Provides structured error types with context, recovery suggestions, and proper error chaining

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type DeepciteResult<T> = Result<T, DeepciteError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the deepcite system
#[derive(Error, Debug)]
pub enum DeepciteError {
    #[error("Search error: {message}")]
    Search {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Completion error: {message}")]
    Completion {
        message: String,
        provider: Option<String>,
        model: Option<String>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after_ms: Option<u64>,
        context: ErrorContext,
    },

    #[error("Operation cancelled: {operation}")]
    Cancelled {
        operation: String,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl DeepciteError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            DeepciteError::Search { context, .. }
            | DeepciteError::Completion { context, .. }
            | DeepciteError::Config { context, .. }
            | DeepciteError::Network { context, .. }
            | DeepciteError::Validation { context, .. }
            | DeepciteError::Timeout { context, .. }
            | DeepciteError::RateLimit { context, .. }
            | DeepciteError::Cancelled { context, .. }
            | DeepciteError::Internal { context, .. } => Some(context),
            DeepciteError::Io(_) | DeepciteError::Serialization(_) => None,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DeepciteError::Network { .. }
                | DeepciteError::Timeout { .. }
                | DeepciteError::RateLimit { .. }
        )
    }

    /// Whether the error came from a cancelled operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeepciteError::Cancelled { .. })
    }

    /// Get retry delay in milliseconds for recoverable errors
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            DeepciteError::Network { .. } => Some(1000),
            DeepciteError::Timeout { .. } => Some(2000),
            DeepciteError::RateLimit { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            DeepciteError::Internal { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Internal error occurred"
                );
            }
            DeepciteError::Config { .. } | DeepciteError::Validation { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration or validation error"
                );
            }
            DeepciteError::Network { .. }
            | DeepciteError::Timeout { .. }
            | DeepciteError::RateLimit { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Network or timeout error (may be recoverable)"
                );
            }
            DeepciteError::Cancelled { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Operation cancelled"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! search_error {
    ($msg:expr, $component:expr) => {
        $crate::DeepciteError::Search {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::DeepciteError::Search {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! completion_error {
    ($msg:expr, $component:expr) => {
        $crate::DeepciteError::Completion {
            message: $msg.to_string(),
            provider: None,
            model: None,
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::DeepciteError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'deepcite config --init' to create default config"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::DeepciteError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}
