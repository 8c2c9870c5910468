//! Deepcite Providers - production implementations of the service boundaries
//!
//! `SiumaiCompletion` talks to an LLM through the siumai framework and
//! `TavilySearch` queries the Tavily search API.

pub mod llm_client;
pub mod search_client;

pub use llm_client::SiumaiCompletion;
pub use search_client::TavilySearch;
