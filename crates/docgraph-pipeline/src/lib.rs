mod coordinator;
mod retry;

pub use coordinator::IngestionCoordinator;
pub use retry::RetryPolicy;
pub use tokio_util::sync::CancellationToken;
