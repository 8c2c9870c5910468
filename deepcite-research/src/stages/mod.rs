//! The seven pipeline stages
//!
//! Each stage reads and updates a [`ResearchState`](deepcite_core::ResearchState)
//! and appends to the run's [`AuditLog`](crate::AuditLog). Stages never
//! decide control flow; the engine does.

pub mod corrector;
pub mod drafter;
pub mod fact_checker;
pub mod refiner;
pub mod reporter;
pub mod researcher;
pub mod validator;

pub use corrector::{augment_query, Corrector};
pub use drafter::{heuristic_filter, Drafter};
pub use fact_checker::FactChecker;
pub use refiner::QueryRefiner;
pub use reporter::ReportCompiler;
pub use researcher::{IterationOutcome, Researcher};
pub use validator::Validator;
