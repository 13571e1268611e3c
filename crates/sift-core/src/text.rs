//! Text utilities: spans, line indexing, and identifier checks.
//!
//! Line and column numbers are 1-indexed throughout; byte offsets are
//! 0-indexed and measured against the normalized (`\n`-only) source text.

use serde::{Deserialize, Serialize};

// ============================================================================
// Span
// ============================================================================

/// A byte range in source text, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span is empty.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `offset` falls within this span (end exclusive).
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

// ============================================================================
// Line Index
// ============================================================================

/// Mapping between byte offsets and 1-indexed line/column positions.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    /// Byte offset of the start of each line. `line_starts[0]` is always 0.
    line_starts: Vec<usize>,
    /// Total length of the indexed text.
    len: usize,
}

impl LineIndex {
    /// Build an index over the given text.
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex {
            line_starts,
            len: text.len(),
        }
    }

    /// Number of lines in the indexed text.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// 1-indexed line number containing `offset`.
    ///
    /// Offsets past the end of the text clamp to the last line.
    pub fn line_of(&self, offset: usize) -> u32 {
        match self.line_starts.binary_search(&offset) {
            Ok(i) => (i + 1) as u32,
            Err(i) => i as u32,
        }
    }

    /// 1-indexed (line, column) of `offset`.
    pub fn position_of(&self, offset: usize) -> (u32, u32) {
        let line = self.line_of(offset);
        let line_start = self.line_starts[(line - 1) as usize];
        (line, (offset - line_start + 1) as u32)
    }

    /// Byte offset of a 1-indexed (line, column) position.
    ///
    /// Returns `None` if the line does not exist. Columns past the end of a
    /// line clamp to the end of the text.
    pub fn offset_of(&self, line: u32, col: u32) -> Option<usize> {
        if line == 0 || col == 0 {
            return None;
        }
        let start = *self.line_starts.get((line - 1) as usize)?;
        Some((start + (col - 1) as usize).min(self.len))
    }

    /// Byte offset of the start of a 1-indexed line.
    pub fn line_start(&self, line: u32) -> Option<usize> {
        self.line_starts.get((line - 1) as usize).copied()
    }
}

// ============================================================================
// Identifier Checks
// ============================================================================

/// Whether `ch` can start a Python identifier.
pub fn is_identifier_start(ch: char) -> bool {
    ch == '_' || ch.is_alphabetic()
}

/// Whether `ch` can continue a Python identifier.
pub fn is_identifier_char(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

/// Whether `text` is a well-formed Python identifier.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if is_identifier_start(c) => chars.all(is_identifier_char),
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod line_index {
        use super::*;

        #[test]
        fn positions_round_trip() {
            let text = "a = 1\nbb = 2\n\nc = 3\n";
            let index = LineIndex::new(text);
            assert_eq!(index.position_of(0), (1, 1));
            assert_eq!(index.position_of(6), (2, 1));
            assert_eq!(index.position_of(7), (2, 2));
            assert_eq!(index.position_of(14), (4, 1));
            assert_eq!(index.offset_of(2, 2), Some(7));
            assert_eq!(index.offset_of(4, 1), Some(14));
        }

        #[test]
        fn missing_line_is_none() {
            let index = LineIndex::new("x = 1\n");
            assert_eq!(index.offset_of(99, 1), None);
            assert_eq!(index.offset_of(0, 1), None);
        }

        #[test]
        fn offset_past_end_clamps() {
            let text = "x = 1\n";
            let index = LineIndex::new(text);
            assert_eq!(index.line_of(text.len() + 10), index.line_of(text.len()));
        }
    }

    mod spans {
        use super::*;

        #[test]
        fn contains_is_end_exclusive() {
            let span = Span::new(4, 7);
            assert!(span.contains(4));
            assert!(span.contains(6));
            assert!(!span.contains(7));
            assert_eq!(span.len(), 3);
        }
    }

    mod identifiers {
        use super::*;

        #[test]
        fn accepts_plain_names() {
            assert!(is_identifier("foo"));
            assert!(is_identifier("_private"));
            assert!(is_identifier("name2"));
        }

        #[test]
        fn rejects_non_names() {
            assert!(!is_identifier(""));
            assert!(!is_identifier("2fast"));
            assert!(!is_identifier("a.b"));
            assert!(!is_identifier("a b"));
        }
    }
}
