pub mod api_types;
pub mod chunk;
pub mod config;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod ingest;

pub use chunk::{Chunk, ChunkRef};
pub use config::{AppConfig, GraphBackend, IngestConfig};
pub use error::{DocGraphError, Result};
pub use extraction::EntityExtractor;
pub use graph::{GraphStatistics, GraphStore};
pub use ingest::{ChunkFailure, IngestionOutcome, IngestionSummary};
