//! Structure-aware chunk planning.
//!
//! [`plan`] splits a document into overlapping chunks of at most
//! `target_chunk_size` bytes. Each cut is snapped back to the strongest
//! structural boundary inside a tolerance window before the size limit:
//! a Markdown heading beats a blank line, which beats a sentence end, which
//! beats a plain newline. With no boundary in the window the chunk is cut
//! hard at the limit. The next chunk starts `overlap` bytes before the
//! previous end.
//!
//! All offsets are byte offsets that fall on UTF-8 character boundaries, so
//! [`ChunkPlan::slice`] never splits a character.

use crate::error::PlanError;
use serde::{Deserialize, Serialize};

/// Structural boundary a chunk ends on. Ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    LineBreak,
    SentenceEnd,
    ParagraphBreak,
    SectionHeader,
    /// The chunk runs to the end of the document.
    EndOfText,
}

/// A contiguous byte range of the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    /// `None` when the chunk was hard-cut at the size limit.
    pub boundary: Option<BoundaryKind>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Ordered chunks covering a text, plus the parameters that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    pub target_chunk_size: usize,
    pub overlap: usize,
    pub text_len: usize,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The text of `chunk`. Empty if the plan was built for another text.
    pub fn slice<'t>(&self, text: &'t str, chunk: &Chunk) -> &'t str {
        text.get(chunk.start..chunk.end).unwrap_or_default()
    }

    /// Check the coverage invariants: the first chunk starts at 0, the last
    /// ends at `text_len`, every chunk starts after its predecessor, and
    /// consecutive chunks overlap by at most `overlap` bytes without a gap.
    pub fn validate(&self) -> Result<(), PlanError> {
        let invalid = |index: usize, message: String| PlanError::Coverage { index, message };

        let (Some(first), Some(last)) = (self.chunks.first(), self.chunks.last()) else {
            return Err(invalid(0, "plan has no chunks".into()));
        };
        if first.start != 0 {
            return Err(invalid(0, format!("starts at {} instead of 0", first.start)));
        }
        if last.end != self.text_len {
            return Err(invalid(
                last.index,
                format!("ends at {} instead of {}", last.end, self.text_len),
            ));
        }

        for (i, chunk) in self.chunks.iter().enumerate() {
            if chunk.index != i {
                return Err(invalid(i, format!("has index {}", chunk.index)));
            }
            if chunk.start > chunk.end || chunk.end > self.text_len {
                return Err(invalid(
                    i,
                    format!("range {}..{} is out of bounds", chunk.start, chunk.end),
                ));
            }
        }

        for pair in self.chunks.windows(2) {
            let [prev, next] = pair else { continue };
            if next.start <= prev.start {
                return Err(invalid(next.index, "does not advance".into()));
            }
            if next.start > prev.end {
                return Err(invalid(
                    next.index,
                    format!("leaves a gap {}..{}", prev.end, next.start),
                ));
            }
            if prev.end.saturating_sub(self.overlap) > next.start {
                return Err(invalid(
                    next.index,
                    format!(
                        "overlaps its predecessor by {} bytes (max {})",
                        prev.end - next.start,
                        self.overlap
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Plan `text` with the default tolerance window (a fifth of the target).
///
/// ```
/// use stride::longctx::planner::plan;
///
/// let text = "First paragraph.\n\nSecond paragraph is a little longer.";
/// let plan = plan(text, 30, 5).unwrap();
/// assert_eq!(plan.chunks[0].start, 0);
/// assert_eq!(plan.chunks.last().unwrap().end, text.len());
/// ```
pub fn plan(text: &str, target_chunk_size: usize, overlap: usize) -> Result<ChunkPlan, PlanError> {
    ChunkPlanner::new(target_chunk_size, overlap)?.plan(text)
}

/// Chunk planner with an explicit tolerance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlanner {
    target_chunk_size: usize,
    overlap: usize,
    tolerance: usize,
}

impl ChunkPlanner {
    pub fn new(target_chunk_size: usize, overlap: usize) -> Result<Self, PlanError> {
        if target_chunk_size == 0 {
            return Err(PlanError::ZeroChunkSize);
        }
        if overlap >= target_chunk_size {
            return Err(PlanError::OverlapTooLarge {
                overlap,
                target: target_chunk_size,
            });
        }
        Ok(Self {
            target_chunk_size,
            overlap,
            tolerance: target_chunk_size / 5,
        })
    }

    /// How far before the size limit a boundary may be taken.
    pub fn with_tolerance(mut self, tolerance: usize) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn plan(&self, text: &str) -> Result<ChunkPlan, PlanError> {
        let text_len = text.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let index = chunks.len();
            if text_len - start <= self.target_chunk_size {
                chunks.push(Chunk {
                    index,
                    start,
                    end: text_len,
                    boundary: Some(BoundaryKind::EndOfText),
                });
                break;
            }

            let limit = start + self.target_chunk_size;
            let (end, boundary) = match self.best_boundary(text.as_bytes(), start, limit) {
                Some((pos, kind)) => (pos, Some(kind)),
                None => (self.hard_cut(text, start, limit), None),
            };
            chunks.push(Chunk {
                index,
                start,
                end,
                boundary,
            });
            start = ceil_char_boundary(text, end - self.overlap);
        }

        let plan = ChunkPlan {
            chunks,
            target_chunk_size: self.target_chunk_size,
            overlap: self.overlap,
            text_len,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Strongest boundary in `(start + overlap, limit]` that is no more than
    /// `tolerance` bytes before `limit`; the latest one among equals.
    fn best_boundary(&self, bytes: &[u8], start: usize, limit: usize) -> Option<(usize, BoundaryKind)> {
        let low = (start + self.overlap + 1).max(limit.saturating_sub(self.tolerance));
        let mut best: Option<(usize, BoundaryKind)> = None;
        for pos in (low..=limit).rev() {
            if let Some(kind) = boundary_at(bytes, pos)
                && best.is_none_or(|(_, b)| kind > b)
            {
                best = Some((pos, kind));
            }
        }
        best
    }

    /// Cut after the last whitespace in the tolerance window, else at the
    /// last char boundary not past `limit`. Always past `start + overlap` so
    /// the next chunk advances.
    fn hard_cut(&self, text: &str, start: usize, limit: usize) -> usize {
        let bytes = text.as_bytes();
        let low = (start + self.overlap + 1).max(limit.saturating_sub(self.tolerance));
        let word_break = (low..=limit)
            .rev()
            .find(|&pos| bytes.get(pos - 1).is_some_and(u8::is_ascii_whitespace));
        if let Some(pos) = word_break {
            return pos;
        }

        let end = floor_char_boundary(text, limit);
        if end > start + self.overlap {
            end
        } else {
            ceil_char_boundary(text, start + self.overlap + 1)
        }
    }
}

/// Boundary kind for a chunk ending at `pos`, if any.
fn boundary_at(bytes: &[u8], pos: usize) -> Option<BoundaryKind> {
    let prev = *bytes.get(pos.checked_sub(1)?)?;
    let before = pos.checked_sub(2).and_then(|i| bytes.get(i)).copied();
    let sentence_end = matches!(before, Some(b'.' | b'!' | b'?'));

    if prev == b'\n' {
        if bytes.get(pos..).is_some_and(is_heading) {
            return Some(BoundaryKind::SectionHeader);
        }
        let blank_line = match before {
            Some(b'\n') => true,
            Some(b'\r') => pos >= 3 && bytes.get(pos - 3) == Some(&b'\n'),
            _ => false,
        };
        if blank_line {
            return Some(BoundaryKind::ParagraphBreak);
        }
        if sentence_end {
            return Some(BoundaryKind::SentenceEnd);
        }
        return Some(BoundaryKind::LineBreak);
    }

    if prev.is_ascii_whitespace() && sentence_end {
        return Some(BoundaryKind::SentenceEnd);
    }
    None
}

/// A Markdown ATX heading: one to six `#` followed by a space or tab.
fn is_heading(line: &[u8]) -> bool {
    let hashes = line.iter().take_while(|&&b| b == b'#').count();
    (1..=6).contains(&hashes) && matches!(line.get(hashes), Some(b' ' | b'\t'))
}

fn floor_char_boundary(text: &str, mut pos: usize) -> usize {
    pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn ceil_char_boundary(text: &str, mut pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

// ── Document statistics ────────────────────────────────────────────

/// Size figures for a document, used to report on long inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub chars: usize,
    pub bytes: usize,
    pub lines: usize,
    pub words: usize,
    /// Rough token count at four characters per token.
    pub estimated_tokens: usize,
}

impl DocumentStats {
    pub fn of(text: &str) -> Self {
        let chars = text.chars().count();
        Self {
            chars,
            bytes: text.len(),
            lines: text.lines().count(),
            words: text.split_whitespace().count(),
            estimated_tokens: chars.div_ceil(4),
        }
    }
}
