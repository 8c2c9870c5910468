//! Core data type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single search result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub url: Option<String>,
    pub content: String,
}

impl Document {
    pub fn new(title: impl Into<String>, url: Option<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url,
            content: content.into(),
        }
    }

    /// URL for display, `N/A` when the result carried none
    pub fn display_url(&self) -> &str {
        self.url.as_deref().unwrap_or("N/A")
    }

    /// First `limit` characters of the content
    pub fn truncated_content(&self, limit: usize) -> String {
        self.content.chars().take(limit).collect()
    }
}

/// Ordered, de-duplicated accumulator of search results.
///
/// Documents are compared structurally; arrival order is preserved and
/// nothing is ever removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentStore {
    documents: Vec<Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every document not already stored, returning how many were added
    pub fn merge<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = Document>,
    {
        let before = self.documents.len();
        for document in batch {
            if !self.documents.contains(&document) {
                self.documents.push(document);
            }
        }
        self.documents.len() - before
    }

    /// The `min(k, len)` most recent documents, oldest first
    pub fn recent(&self, k: usize) -> &[Document] {
        let start = self.documents.len().saturating_sub(k);
        &self.documents[start..]
    }

    pub fn contains(&self, document: &Document) -> bool {
        self.documents.contains(document)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub fn as_slice(&self) -> &[Document] {
        &self.documents
    }
}

impl<'a> IntoIterator for &'a DocumentStore {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

/// Coarse control over search breadth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResearchDepth {
    Overview,
    #[default]
    Detailed,
    DeepDive,
}

impl ResearchDepth {
    /// Search depth sent to the search service
    pub fn search_depth(self) -> SearchDepth {
        match self {
            ResearchDepth::Overview => SearchDepth::Basic,
            ResearchDepth::Detailed | ResearchDepth::DeepDive => SearchDepth::Advanced,
        }
    }

    pub fn all() -> [ResearchDepth; 3] {
        [
            ResearchDepth::Overview,
            ResearchDepth::Detailed,
            ResearchDepth::DeepDive,
        ]
    }
}

impl fmt::Display for ResearchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchDepth::Overview => write!(f, "Overview"),
            ResearchDepth::Detailed => write!(f, "Detailed"),
            ResearchDepth::DeepDive => write!(f, "Deep Dive"),
        }
    }
}

impl FromStr for ResearchDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(&['_', ' '][..], "-").as_str() {
            "overview" => Ok(ResearchDepth::Overview),
            "detailed" => Ok(ResearchDepth::Detailed),
            "deep-dive" | "deepdive" => Ok(ResearchDepth::DeepDive),
            other => Err(format!(
                "unknown research depth '{}', expected overview, detailed or deep-dive",
                other
            )),
        }
    }
}

/// Depth parameter understood by the search service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    Advanced,
}

impl SearchDepth {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

/// One call to the search service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub depth: SearchDepth,
    pub max_results: usize,
}

/// The record threaded through every pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    /// Query as the user submitted it
    pub original_query: String,
    /// Current query, augmented by correction passes
    pub query: String,
    pub research_data: DocumentStore,
    pub current_iteration: usize,
    pub max_iterations: usize,
    pub research_depth: ResearchDepth,
    pub answer: Option<String>,
    pub fact_checks: Option<Vec<String>>,
    pub final_checks: Option<Vec<String>>,
    pub professional_report: Option<String>,
}

impl ResearchState {
    pub fn new(query: impl Into<String>, max_iterations: usize, depth: ResearchDepth) -> Self {
        let query = query.into();
        Self {
            original_query: query.clone(),
            query,
            research_data: DocumentStore::new(),
            current_iteration: 0,
            max_iterations,
            research_depth: depth,
            answer: None,
            fact_checks: None,
            final_checks: None,
            professional_report: None,
        }
    }

    /// Whether another research iteration may run
    pub fn has_budget(&self) -> bool {
        self.current_iteration < self.max_iterations
    }

    /// Documents a stage may place in its prompt
    pub fn selected_sources(&self, k: usize) -> &[Document] {
        self.research_data.recent(k)
    }
}
