mod capitalized;
mod chunker;

pub use capitalized::CapitalizedWordExtractor;
pub use chunker::Chunker;
