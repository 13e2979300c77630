//! The retrieval pipeline: context assembly, prompting, citations and the
//! orchestrator tying them to the caches and collaborators.

pub mod citation;
pub mod context;
mod orchestrator;
pub mod prompt;
mod stream;

pub use citation::extract_citations;
pub use context::{ContextPassage, ContextWindow, build_context};
pub use orchestrator::{Retrieval, RetrievalOrchestrator, RetrievalOrchestratorBuilder};
pub use prompt::build_request;
pub use stream::QueryStream;
