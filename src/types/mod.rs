//! Public types for the Mimir API.

mod citation;
mod embedding;
mod generate;
mod query;
mod search;

pub use citation::Citation;
pub use embedding::Embedding;
pub use generate::{GenerateEvent, GenerateResponse, GenerationRequest};
pub use query::{CacheUsage, QueryEvent, QueryRequest, QueryResponse};
pub use search::{FilterConditions, PassageMetadata, SearchQuery, SearchResult, rank_results};
