//! Scripted service doubles shared by the pipeline tests

#![allow(dead_code)]

use deepcite_core::{
    async_trait, completion_error, search_error, CompletionService, DeepciteConfig,
    DeepciteResult, Document, SearchRequest, SearchService,
};
use deepcite_research::{ResearchEngine, StageServices};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Which stage a prompt belongs to, recognised by its opening words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Refine,
    Draft,
    FactCheck,
    Correction,
    Validation,
    Report,
}

impl PromptKind {
    pub fn of(prompt: &str) -> Self {
        if prompt.starts_with("Based on the research query") {
            PromptKind::Refine
        } else if prompt.starts_with("Strict Requirements") {
            PromptKind::Draft
        } else if prompt.starts_with("Verify the document") {
            PromptKind::FactCheck
        } else if prompt.starts_with("For each of the issues below") {
            PromptKind::Correction
        } else if prompt.starts_with("Final Report:") {
            PromptKind::Validation
        } else if prompt.starts_with("Write a professional academic report") {
            PromptKind::Report
        } else {
            panic!("Unrecognised prompt: {}", prompt)
        }
    }
}

pub const DRAFT_RESPONSE: &str =
    "## History\nRSA was invented in 1977. [Source 1]\nSome people claim it is unbreakable.";
pub const FACT_CHECK_RESPONSE: &str =
    "- [❌] [Unsupported]: \"RSA is unbreakable\"\n  Sources: [2]\n  Action: Research Needed";
pub const CORRECTION_RESPONSE: &str =
    "- Issue: unbreakable claim\n  Resolution Query: \"RSA security proofs\"";
pub const REPORT_RESPONSE: &str = "# RSA: A Professional Report\nExecutive summary. [Source 1]";

enum Behaviour {
    Respond(String),
    Fail,
    CancelAndHang(CancellationToken),
}

/// Completion double that answers by prompt kind and records every prompt
pub struct ScriptedCompletion {
    behaviours: Mutex<HashMap<PromptKind, Behaviour>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        let mut behaviours = HashMap::new();
        behaviours.insert(
            PromptKind::Refine,
            Behaviour::Respond("  RSA encryption milestones \n".to_string()),
        );
        behaviours.insert(PromptKind::Draft, Behaviour::Respond(DRAFT_RESPONSE.to_string()));
        behaviours.insert(
            PromptKind::FactCheck,
            Behaviour::Respond(FACT_CHECK_RESPONSE.to_string()),
        );
        behaviours.insert(
            PromptKind::Correction,
            Behaviour::Respond(CORRECTION_RESPONSE.to_string()),
        );
        behaviours.insert(
            PromptKind::Validation,
            Behaviour::Respond("No remaining issues.".to_string()),
        );
        behaviours.insert(PromptKind::Report, Behaviour::Respond(REPORT_RESPONSE.to_string()));

        Self {
            behaviours: Mutex::new(behaviours),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(self, kind: PromptKind, text: &str) -> Self {
        self.set(kind, Behaviour::Respond(text.to_string()))
    }

    pub fn fail_on(self, kind: PromptKind) -> Self {
        self.set(kind, Behaviour::Fail)
    }

    /// Cancel `token` when a prompt of `kind` arrives, then never answer
    pub fn cancel_on(self, kind: PromptKind, token: CancellationToken) -> Self {
        self.set(kind, Behaviour::CancelAndHang(token))
    }

    fn set(self, kind: PromptKind, behaviour: Behaviour) -> Self {
        self.behaviours.lock().unwrap().insert(kind, behaviour);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn prompts_of(&self, kind: PromptKind) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| PromptKind::of(p) == kind)
            .collect()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> DeepciteResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let kind = PromptKind::of(prompt);

        let outcome = match self.behaviours.lock().unwrap().get(&kind) {
            Some(Behaviour::Respond(text)) => Ok(text.clone()),
            Some(Behaviour::Fail) => Err(None),
            Some(Behaviour::CancelAndHang(token)) => Err(Some(token.clone())),
            None => Ok(String::new()),
        };

        match outcome {
            Ok(text) => Ok(text),
            Err(None) => Err(completion_error!(
                format!("{:?} completion unavailable", kind),
                "scripted_completion"
            )),
            Err(Some(token)) => {
                token.cancel();
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    fn describe(&self) -> String {
        "scripted completion".to_string()
    }
}

/// One scripted search response
pub enum SearchStep {
    Results(Vec<Document>),
    Fail(&'static str),
}

/// Search double that plays back scripted responses, then returns nothing
pub struct ScriptedSearch {
    steps: Mutex<VecDeque<SearchStep>>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl ScriptedSearch {
    pub fn new(steps: Vec<SearchStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchService for ScriptedSearch {
    async fn search(&self, request: &SearchRequest) -> DeepciteResult<Vec<Document>> {
        self.requests.lock().unwrap().push(request.clone());
        match self.steps.lock().unwrap().pop_front() {
            Some(SearchStep::Results(documents)) => Ok(documents),
            Some(SearchStep::Fail(message)) => Err(search_error!(message, "scripted_search")),
            None => Ok(Vec::new()),
        }
    }

    fn describe(&self) -> String {
        "scripted search".to_string()
    }
}

pub fn doc(n: usize) -> Document {
    Document::new(
        format!("RSA source {}", n),
        Some(format!("https://example.org/rsa/{}", n)),
        format!("Content of source {} about the RSA cryptosystem.", n),
    )
}

pub fn docs(range: std::ops::RangeInclusive<usize>) -> Vec<Document> {
    range.map(doc).collect()
}

pub fn engine(
    config: &DeepciteConfig,
    completion: &Arc<ScriptedCompletion>,
    search: &Arc<ScriptedSearch>,
) -> ResearchEngine {
    ResearchEngine::new(config, completion.clone(), search.clone())
}

pub fn services(
    completion: &Arc<ScriptedCompletion>,
    search: &Arc<ScriptedSearch>,
) -> StageServices {
    StageServices::new(completion.clone(), search.clone(), Duration::from_secs(5))
}
