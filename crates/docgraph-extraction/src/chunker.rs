use docgraph_core::config::validate_chunking;
use docgraph_core::error::Result;

/// Boundary snapping only looks at the last `chunk_size / SNAP_WINDOW_DIVISOR`
/// characters of a window.
const SNAP_WINDOW_DIVISOR: usize = 5;

/// Splits text into overlapping, bounded windows measured in characters.
///
/// Each window holds at most `chunk_size` characters. When a window would cut
/// through a word, its end is pulled back to the nearest paragraph, sentence
/// or word boundary inside the snap window; if there is none, the cut is hard.
/// The next window always starts `chunk_overlap` characters before the end of
/// the previous one, so adjacent chunks share exactly `chunk_overlap`
/// characters.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_chunking(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        if n == 0 {
            return Vec::new();
        }

        // Byte offset of every char position, plus one past the end.
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        let mut chunks = Vec::with_capacity(n / (self.chunk_size - self.chunk_overlap) + 1);
        let mut start = 0;

        loop {
            let hard_end = (start + self.chunk_size).min(n);
            let end = if hard_end == n {
                n
            } else {
                self.snap_end(&chars, start, hard_end)
            };

            chunks.push(&text[offsets[start]..offsets[end]]);

            if end == n {
                break;
            }
            start = end - self.chunk_overlap;
        }

        tracing::trace!(
            chars = n,
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            "Split text"
        );

        chunks
    }

    /// Pick where the window `[start, hard_end)` should end. Never returns a
    /// position that would stop the cursor from advancing.
    fn snap_end(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let window = (self.chunk_size / SNAP_WINDOW_DIVISOR).max(1);
        let floor = (start + self.chunk_overlap + 1).max(hard_end.saturating_sub(window));
        if floor > hard_end {
            return hard_end;
        }

        for kind in [Boundary::Paragraph, Boundary::Sentence, Boundary::Word] {
            if let Some(p) = (floor..=hard_end).rev().find(|&p| is_boundary(chars, start, p, kind)) {
                return p;
            }
        }

        hard_end
    }
}

/// Whether a chunk ending just before `chars[p]` ends on a boundary of `kind`.
fn is_boundary(chars: &[char], start: usize, p: usize, kind: Boundary) -> bool {
    if p <= start || p >= chars.len() {
        return false;
    }
    let prev = chars[p - 1];
    match kind {
        Boundary::Paragraph => prev == '\n' && p >= start + 2 && chars[p - 2] == '\n',
        Boundary::Sentence => {
            prev == '\n'
                || (prev.is_whitespace() && p >= start + 2 && matches!(chars[p - 2], '.' | '!' | '?'))
        }
        Boundary::Word => prev.is_whitespace() || chars[p].is_whitespace(),
    }
}
