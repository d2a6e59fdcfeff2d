use std::sync::Arc;

use docgraph_core::AppConfig;
use docgraph_graph::GraphWriter;
use docgraph_pipeline::{CancellationToken, IngestionCoordinator};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub writer: Arc<GraphWriter>,
    pub coordinator: Arc<IngestionCoordinator>,
    /// Cancelled on shutdown; running ingestions stop scheduling new chunks.
    pub shutdown: CancellationToken,
}
