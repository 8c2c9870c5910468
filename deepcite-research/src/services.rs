//! External services shared by the stages of one run

use crate::audit::Stage;
use deepcite_core::{
    with_timeout, CompletionService, DeepciteError, DeepciteResult, Document, ErrorContext,
    SearchRequest, SearchService,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Completion and search services guarded by a per-call timeout and the
/// run's cancellation token
#[derive(Clone)]
pub struct StageServices {
    completion: Arc<dyn CompletionService>,
    search: Arc<dyn SearchService>,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl StageServices {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        search: Arc<dyn SearchService>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            completion,
            search,
            call_timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ask the completion service on behalf of `stage`
    pub async fn complete(&self, stage: Stage, prompt: &str) -> DeepciteResult<String> {
        debug!(stage = %stage, prompt_chars = prompt.chars().count(), "Requesting completion");
        self.guarded(stage.name(), self.completion.complete(prompt)).await
    }

    pub async fn search(&self, request: &SearchRequest) -> DeepciteResult<Vec<Document>> {
        debug!(
            query = %request.query,
            depth = request.depth.as_str(),
            max_results = request.max_results,
            "Searching"
        );
        self.guarded("search", self.search.search(request)).await
    }

    async fn guarded<T, F>(&self, operation: &str, call: F) -> DeepciteResult<T>
    where
        F: Future<Output = DeepciteResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(cancelled(operation));
        }

        let timeout_ms = self.call_timeout.as_millis() as u64;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(cancelled(operation)),
            result = with_timeout(call, timeout_ms, operation) => result?,
        }
    }
}

fn cancelled(operation: &str) -> DeepciteError {
    DeepciteError::Cancelled {
        operation: operation.to_string(),
        context: ErrorContext::new("stage_services").with_operation(operation),
    }
}
