mod memory;
mod store;
mod writer;

pub use memory::InMemoryGraphStore;
pub use store::Neo4jGraphStore;
pub use writer::GraphWriter;
