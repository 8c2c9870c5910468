//! Core trait definitions
//!
//! The pipeline only ever talks to the outside world through these two
//! boundaries, so tests and alternative providers can swap them freely.

use crate::error::DeepciteResult;
use crate::types::{Document, SearchRequest};
use async_trait::async_trait;

/// Text-generation capability
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete a single prompt and return the generated text
    async fn complete(&self, prompt: &str) -> DeepciteResult<String>;

    /// Human readable provider/model description
    fn describe(&self) -> String {
        "completion".to_string()
    }
}

/// Web-search capability
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Run one search and return the result documents in ranking order
    async fn search(&self, request: &SearchRequest) -> DeepciteResult<Vec<Document>>;

    fn describe(&self) -> String {
        "search".to_string()
    }
}
