use std::collections::BTreeSet;

use crate::error::Result;

/// Derives candidate entity names from a single chunk of text.
///
/// Implementations must be pure: the same text always yields the same set.
/// Duplicate surface forms within a chunk collapse to one entry.
pub trait EntityExtractor: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, text: &str) -> Result<BTreeSet<String>>;
}

/// Any plain function `text -> set` works as an extractor.
impl<F> EntityExtractor for F
where
    F: Fn(&str) -> BTreeSet<String> + Send + Sync,
{
    fn name(&self) -> &str {
        "fn"
    }

    fn extract(&self, text: &str) -> Result<BTreeSet<String>> {
        Ok(self(text))
    }
}
