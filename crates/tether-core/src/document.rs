//! Rope-backed source documents with edit-surviving anchors.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use ropey::Rope;

use crate::error::DocumentError;

/// Global counter for generating unique anchor IDs.
static NEXT_ANCHOR_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a position in a [`TextDocument`] that moves with edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Anchor(pub u64);

impl Anchor {
    fn next() -> Self {
        Self(NEXT_ANCHOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Coarse classification of a source line for breakpoint placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Executable code.
    Code,
    /// Comment or docstring line.
    Comment,
    /// Whitespace-only line.
    Blank,
}

/// Read access to line-structured source text.
///
/// Breakpoint placement only needs lines and their kinds, so validation
/// logic is written against this trait and tested with in-memory fakes.
pub trait DocumentModel {
    /// Number of lines in the document.
    fn line_count(&self) -> usize;

    /// Text of the given 0-based line, without guarantees about the
    /// trailing newline. `None` when out of range.
    fn line_text(&self, line: usize) -> Option<String>;

    /// Kind of the given 0-based line. Out-of-range lines are blank.
    fn line_kind(&self, line: usize) -> LineKind {
        let Some(text) = self.line_text(line) else {
            return LineKind::Blank;
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            LineKind::Blank
        } else if trimmed.starts_with('#')
            || trimmed.starts_with("'''")
            || trimmed.starts_with("\"\"\"")
        {
            LineKind::Comment
        } else {
            LineKind::Code
        }
    }
}

/// A source document backed by a rope, with anchors that survive edits.
#[derive(Debug, Default)]
pub struct TextDocument {
    rope: Rope,
    anchors: HashMap<Anchor, usize>,
}

impl TextDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document from a text string.
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            anchors: HashMap::new(),
        }
    }

    /// Create a document by reading a file from disk.
    pub fn from_file(path: &Path) -> Result<Self, DocumentError> {
        if !path.exists() {
            return Err(DocumentError::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_text(&text))
    }

    /// Place an anchor at the start of the given 0-based line.
    /// `None` when the line is out of range.
    pub fn create_anchor(&mut self, line: usize) -> Option<Anchor> {
        if line >= self.rope.len_lines() {
            return None;
        }
        let offset = self.rope.line_to_char(line);
        let anchor = Anchor::next();
        self.anchors.insert(anchor, offset);
        Some(anchor)
    }

    /// Current 0-based line of an anchor. `None` for unknown anchors.
    pub fn anchor_line(&self, anchor: Anchor) -> Option<usize> {
        let offset = *self.anchors.get(&anchor)?;
        let offset = offset.min(self.rope.len_chars());
        Some(self.rope.char_to_line(offset))
    }

    /// Discard an anchor.
    pub fn remove_anchor(&mut self, anchor: Anchor) {
        self.anchors.remove(&anchor);
    }

    /// Insert text at a char offset, shifting anchors at or after it.
    pub fn insert(&mut self, char_idx: usize, text: &str) {
        self.rope.insert(char_idx, text);
        let inserted = text.chars().count();
        for offset in self.anchors.values_mut() {
            if *offset >= char_idx {
                *offset += inserted;
            }
        }
    }

    /// Remove a char range. Anchors after the range shift left; anchors
    /// inside it collapse to its start.
    pub fn remove(&mut self, range: std::ops::Range<usize>) {
        let removed = range.end - range.start;
        self.rope.remove(range.clone());
        for offset in self.anchors.values_mut() {
            if *offset >= range.end {
                *offset -= removed;
            } else if *offset > range.start {
                *offset = range.start;
            }
        }
    }

    /// Char offset of the start of a 0-based line.
    pub fn line_to_char(&self, line: usize) -> Result<usize, DocumentError> {
        if line >= self.rope.len_lines() {
            return Err(DocumentError::LineOutOfRange(line));
        }
        Ok(self.rope.line_to_char(line))
    }

    /// Full document text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }
}

impl DocumentModel for TextDocument {
    fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    fn line_text(&self, line: usize) -> Option<String> {
        if line >= self.rope.len_lines() {
            return None;
        }
        Some(self.rope.line(line).to_string())
    }
}
