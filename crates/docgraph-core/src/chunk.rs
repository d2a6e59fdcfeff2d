use serde::{Deserialize, Serialize};

/// One ordered slice of a document's text. `(document_id, chunk_index)` is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub chunk_index: u64,
    pub text: String,
}

impl Chunk {
    pub fn new(document_id: impl Into<String>, chunk_index: u64, text: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            chunk_index,
            text: text.into(),
        }
    }

    pub fn chunk_ref(&self) -> ChunkRef {
        ChunkRef {
            document_id: self.document_id.clone(),
            chunk_index: self.chunk_index,
        }
    }
}

/// Identity of a persisted chunk, handed back by the writer so mentions can target it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkRef {
    pub document_id: String,
    pub chunk_index: u64,
}

impl std::fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.document_id, self.chunk_index)
    }
}
