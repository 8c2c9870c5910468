//! Tavily web search adapter

use deepcite_core::{
    async_trait, retry_async, DeepciteError, DeepciteResult, Document, ErrorContext, RetryConfig,
    SearchConfig, SearchRequest, SearchService,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct TavilySearch {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    retry: RetryConfig,
}

#[derive(Debug, Serialize)]
struct TavilySearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: Option<String>,
    #[serde(default)]
    content: String,
}

impl TavilySearch {
    pub fn new(
        api_key: String,
        base_url: String,
        client: reqwest::Client,
        retry: RetryConfig,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry,
        }
    }

    /// Build a client from configuration, requiring an API key
    pub fn from_config(config: &SearchConfig, retry: RetryConfig) -> DeepciteResult<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| DeepciteError::Config {
            message: "Tavily API key not found".to_string(),
            source: None,
            context: ErrorContext::new("search_client")
                .with_operation("from_config")
                .with_suggestion("Set TAVILY_API_KEY or search.api_key in the config file"),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DeepciteError::Config {
                message: format!("Failed to build HTTP client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("search_client").with_operation("from_config"),
            })?;

        Ok(Self::new(api_key, config.base_url.clone(), client, retry))
    }

    fn transport_error(error: reqwest::Error) -> DeepciteError {
        let message = format!("Search request failed: {}", error);
        let context = ErrorContext::new("search_client").with_operation("search");
        if error.is_timeout() || error.is_connect() {
            DeepciteError::Network {
                message,
                source: Some(Box::new(error)),
                context,
            }
        } else {
            DeepciteError::Search {
                message,
                source: Some(Box::new(error)),
                context,
            }
        }
    }

    fn status_error(status: StatusCode, body: String) -> DeepciteError {
        let context = ErrorContext::new("search_client")
            .with_operation("search")
            .with_metadata("status", status.as_str());

        if status == StatusCode::TOO_MANY_REQUESTS {
            DeepciteError::RateLimit {
                message: format!("Search quota exceeded: {}", body),
                retry_after_ms: None,
                context,
            }
        } else if status.is_server_error() {
            DeepciteError::Network {
                message: format!("Search service error {}: {}", status, body),
                source: None,
                context,
            }
        } else {
            DeepciteError::Search {
                message: format!("Search rejected with {}: {}", status, body),
                source: None,
                context: context.with_suggestion("Check the Tavily API key and request parameters"),
            }
        }
    }

    async fn search_once(&self, request: &SearchRequest) -> DeepciteResult<Vec<Document>> {
        let payload = TavilySearchRequest {
            api_key: &self.api_key,
            query: &request.query,
            search_depth: request.depth.as_str(),
            max_results: request.max_results,
            include_answer: false,
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, body));
        }

        let body = response.text().await.map_err(Self::transport_error)?;
        let parsed: TavilySearchResponse =
            serde_json::from_str(&body).map_err(|e| DeepciteError::Search {
                message: format!("Malformed search response: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("search_client").with_operation("parse_response"),
            })?;

        debug!(
            query = %request.query,
            results = parsed.results.len(),
            "Search completed"
        );

        Ok(parsed
            .results
            .into_iter()
            .map(|r| Document::new(r.title, r.url, r.content))
            .collect())
    }
}

#[async_trait]
impl SearchService for TavilySearch {
    async fn search(&self, request: &SearchRequest) -> DeepciteResult<Vec<Document>> {
        retry_async(|| self.search_once(request), &self.retry, "tavily_search").await
    }

    fn describe(&self) -> String {
        format!("tavily ({})", self.base_url)
    }
}
