//! Breakpoint identity, placement validation, and per-file bookkeeping.
//!
//! A breakpoint has no stored line number. It owns an [`Anchor`] into its
//! document and recomputes its line on demand, so breakpoints ride along
//! with edits and are resolved to wire line numbers only when a session
//! launches.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::document::{Anchor, DocumentModel, LineKind, TextDocument};
use crate::error::PlacementError;

/// How many lines below an invalid location to search for executable code
/// before giving up.
pub const LOOKAHEAD: usize = 8;

/// Global counter for generating unique gutter marker IDs.
static NEXT_MARKER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier tying a breakpoint to its gutter marker in the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerId(pub u64);

impl MarkerId {
    /// Generate a fresh, unique `MarkerId`.
    pub fn next() -> Self {
        Self(NEXT_MARKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A breakpoint resolved to concrete wire coordinates: absolute file path
/// and 1-based line number, as the debugger expects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSpec {
    pub file: PathBuf,
    pub line: u32,
}

/// A live breakpoint in an open document.
#[derive(Debug)]
pub struct Breakpoint {
    file: PathBuf,
    anchor: Anchor,
    marker: MarkerId,
}

impl Breakpoint {
    pub fn new(file: PathBuf, anchor: Anchor, marker: MarkerId) -> Self {
        Self {
            file,
            anchor,
            marker,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn marker(&self) -> MarkerId {
        self.marker
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    /// Current 0-based line, recomputed from the anchor.
    pub fn line_number(&self, doc: &TextDocument) -> Option<usize> {
        doc.anchor_line(self.anchor)
    }

    /// Whether the breakpoint still sits on executable code.
    pub fn is_valid(&self, doc: &TextDocument) -> bool {
        self.line_number(doc)
            .is_some_and(|line| doc.line_kind(line) == LineKind::Code)
    }

    /// Resolve to wire coordinates (1-based line).
    pub fn resolve(&self, doc: &TextDocument) -> Option<BreakpointSpec> {
        let line = self.line_number(doc)?;
        Some(BreakpointSpec {
            file: self.file.clone(),
            line: line as u32 + 1,
        })
    }
}

/// Pick the line a breakpoint requested at `line` should actually land on.
///
/// A request on executable code lands where it was made. A request on a
/// blank or comment line slides down up to [`LOOKAHEAD`] lines to the next
/// executable line; if the window holds none, placement fails.
pub fn find_breakpoint_line(
    doc: &impl DocumentModel,
    line: usize,
) -> Result<usize, PlacementError> {
    let kind = doc.line_kind(line);
    if kind == LineKind::Code {
        return Ok(line);
    }
    for candidate in line + 1..=line + LOOKAHEAD {
        if candidate >= doc.line_count() {
            break;
        }
        if doc.line_kind(candidate) == LineKind::Code {
            return Ok(candidate);
        }
    }
    Err(match kind {
        LineKind::Blank => PlacementError::EmptyLine(line),
        LineKind::Comment => PlacementError::CommentLine(line),
        LineKind::Code => unreachable!("code lines are accepted above"),
    })
}

/// Outcome of a toggle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    /// A breakpoint was added on the given 0-based line (possibly below
    /// the requested line after relocation).
    Added { marker: MarkerId, line: usize },
    /// An existing breakpoint on the requested line was removed.
    Removed { marker: MarkerId },
}

/// All breakpoints across open files, keyed by file path.
#[derive(Debug, Default)]
pub struct BreakpointSet {
    by_file: HashMap<PathBuf, Vec<Breakpoint>>,
}

impl BreakpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle a breakpoint at a 0-based line of `file`.
    ///
    /// Removes an existing breakpoint on that line; otherwise validates
    /// the location (sliding down past blank and comment lines) and adds
    /// one. The relocated line may already hold a breakpoint, in which
    /// case that one is removed instead of doubling up.
    pub fn toggle(
        &mut self,
        file: &Path,
        doc: &mut TextDocument,
        line: usize,
    ) -> Result<Toggle, PlacementError> {
        if let Some(marker) = self.remove_at_line(file, doc, line) {
            return Ok(Toggle::Removed { marker });
        }
        let target = find_breakpoint_line(doc, line)?;
        if target != line {
            if let Some(marker) = self.remove_at_line(file, doc, target) {
                return Ok(Toggle::Removed { marker });
            }
        }
        let anchor = doc
            .create_anchor(target)
            .ok_or(PlacementError::NoExecutableLine {
                line,
                lookahead: LOOKAHEAD,
            })?;
        let marker = MarkerId::next();
        self.by_file
            .entry(file.to_path_buf())
            .or_default()
            .push(Breakpoint::new(file.to_path_buf(), anchor, marker));
        tracing::debug!(file = %file.display(), line = target, "breakpoint added");
        Ok(Toggle::Added { marker, line: target })
    }

    /// Breakpoints currently set in `file`.
    pub fn for_file(&self, file: &Path) -> &[Breakpoint] {
        self.by_file.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All breakpoints across all files.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.by_file.values().flatten()
    }

    /// Total number of breakpoints.
    pub fn len(&self) -> usize {
        self.by_file.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve every breakpoint in `file` that still points at executable
    /// code to wire coordinates.
    pub fn resolve_file(&self, file: &Path, doc: &TextDocument) -> Vec<BreakpointSpec> {
        self.for_file(file)
            .iter()
            .filter(|bp| bp.is_valid(doc))
            .filter_map(|bp| bp.resolve(doc))
            .collect()
    }

    /// Drop breakpoints in `file` whose line no longer holds executable
    /// code (edits commented it out or deleted it). Returns the marker IDs
    /// of dropped breakpoints so the front end can clear its gutter.
    pub fn sweep_invalid(&mut self, file: &Path, doc: &mut TextDocument) -> Vec<MarkerId> {
        let Some(breakpoints) = self.by_file.get_mut(file) else {
            return Vec::new();
        };
        let mut dropped = Vec::new();
        breakpoints.retain(|bp| {
            if bp.is_valid(doc) {
                true
            } else {
                doc.remove_anchor(bp.anchor);
                dropped.push(bp.marker);
                false
            }
        });
        if !dropped.is_empty() {
            tracing::debug!(file = %file.display(), count = dropped.len(), "invalid breakpoints dropped");
        }
        dropped
    }

    /// Remove every breakpoint in `file`, returning their marker IDs.
    pub fn clear_file(&mut self, file: &Path, doc: &mut TextDocument) -> Vec<MarkerId> {
        let Some(breakpoints) = self.by_file.remove(file) else {
            return Vec::new();
        };
        breakpoints
            .into_iter()
            .map(|bp| {
                doc.remove_anchor(bp.anchor);
                bp.marker
            })
            .collect()
    }

    fn remove_at_line(&mut self, file: &Path, doc: &mut TextDocument, line: usize) -> Option<MarkerId> {
        let breakpoints = self.by_file.get_mut(file)?;
        let index = breakpoints
            .iter()
            .position(|bp| bp.line_number(doc) == Some(line))?;
        let removed = breakpoints.remove(index);
        doc.remove_anchor(removed.anchor);
        tracing::debug!(file = %file.display(), line, "breakpoint removed");
        Some(removed.marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> TextDocument {
        TextDocument::from_text(text)
    }

    #[test]
    fn find_line_accepts_code() {
        let d = doc("x = 1\ny = 2\n");
        assert_eq!(find_breakpoint_line(&d, 1), Ok(1));
    }

    #[test]
    fn find_line_slides_past_blank_and_comments() {
        let d = doc("x = 1\n\n# setup\n# more\ny = 2\n");
        assert_eq!(find_breakpoint_line(&d, 1), Ok(4));
        assert_eq!(find_breakpoint_line(&d, 2), Ok(4));
    }

    #[test]
    fn find_line_slides_past_docstrings() {
        let d = doc("\"\"\"Module docstring.\"\"\"\nx = 1\n");
        assert_eq!(find_breakpoint_line(&d, 0), Ok(1));
        let d = doc("'''one\n");
        assert_eq!(
            find_breakpoint_line(&d, 0),
            Err(PlacementError::CommentLine(0))
        );
    }

    #[test]
    fn find_line_fails_beyond_lookahead() {
        let mut text = String::from("x = 1\n");
        for _ in 0..LOOKAHEAD + 1 {
            text.push('\n');
        }
        text.push_str("y = 2\n");
        let d = doc(&text);
        assert_eq!(find_breakpoint_line(&d, 1), Err(PlacementError::EmptyLine(1)));
    }

    #[test]
    fn find_line_reports_comment_reason() {
        let d = doc("# only a comment\n");
        assert_eq!(
            find_breakpoint_line(&d, 0),
            Err(PlacementError::CommentLine(0))
        );
    }

    #[test]
    fn toggle_adds_then_removes() {
        let mut d = doc("x = 1\ny = 2\n");
        let mut set = BreakpointSet::new();
        let file = Path::new("/tmp/t.py");

        let added = set.toggle(file, &mut d, 1).unwrap();
        let Toggle::Added { marker, line } = added else {
            panic!("expected Added");
        };
        assert_eq!(line, 1);
        assert_eq!(set.len(), 1);

        let removed = set.toggle(file, &mut d, 1).unwrap();
        assert_eq!(removed, Toggle::Removed { marker });
        assert!(set.is_empty());
    }

    #[test]
    fn toggle_on_comment_relocates_below() {
        let mut d = doc("# header\nx = 1\n");
        let mut set = BreakpointSet::new();
        let file = Path::new("/tmp/t.py");

        let added = set.toggle(file, &mut d, 0).unwrap();
        assert!(matches!(added, Toggle::Added { line: 1, .. }));
    }

    #[test]
    fn toggle_on_relocated_duplicate_removes_existing() {
        let mut d = doc("# header\nx = 1\n");
        let mut set = BreakpointSet::new();
        let file = Path::new("/tmp/t.py");

        let Toggle::Added { marker, .. } = set.toggle(file, &mut d, 1).unwrap() else {
            panic!("expected Added");
        };
        // Toggling the comment line relocates onto line 1, which already
        // has a breakpoint, so the request removes it.
        let second = set.toggle(file, &mut d, 0).unwrap();
        assert_eq!(second, Toggle::Removed { marker });
        assert!(set.is_empty());
    }

    #[test]
    fn toggle_rejects_invalid_location() {
        let mut d = doc("# c1\n# c2\n");
        let mut set = BreakpointSet::new();
        let file = Path::new("/tmp/t.py");
        assert_eq!(
            set.toggle(file, &mut d, 0),
            Err(PlacementError::CommentLine(0))
        );
    }

    #[test]
    fn breakpoint_line_survives_edit_above() {
        let mut d = doc("x = 1\ny = 2\n");
        let mut set = BreakpointSet::new();
        let file = Path::new("/tmp/t.py");
        set.toggle(file, &mut d, 1).unwrap();

        d.insert(0, "import sys\n");
        let bp = &set.for_file(file)[0];
        assert_eq!(bp.line_number(&d), Some(2));
        let spec = bp.resolve(&d).unwrap();
        assert_eq!(spec.line, 3);
        assert_eq!(spec.file, PathBuf::from("/tmp/t.py"));
    }

    #[test]
    fn sweep_drops_breakpoints_on_edited_out_lines() {
        let mut d = doc("x = 1\ny = 2\n");
        let mut set = BreakpointSet::new();
        let file = Path::new("/tmp/t.py");
        let Toggle::Added { marker, .. } = set.toggle(file, &mut d, 1).unwrap() else {
            panic!("expected Added");
        };

        // Comment out the breakpoint's line.
        let offset = d.line_to_char(1).unwrap();
        d.insert(offset, "# ");
        let dropped = set.sweep_invalid(file, &mut d);
        assert_eq!(dropped, vec![marker]);
        assert!(set.is_empty());
    }

    #[test]
    fn resolve_file_skips_invalid() {
        let mut d = doc("x = 1\ny = 2\n");
        let mut set = BreakpointSet::new();
        let file = Path::new("/tmp/t.py");
        set.toggle(file, &mut d, 0).unwrap();
        set.toggle(file, &mut d, 1).unwrap();

        let offset = d.line_to_char(0).unwrap();
        d.insert(offset, "# ");
        let specs = set.resolve_file(file, &d);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].line, 2);
    }

    #[test]
    fn clear_file_removes_all_and_reports_markers() {
        let mut d = doc("x = 1\ny = 2\n");
        let mut set = BreakpointSet::new();
        let file = Path::new("/tmp/t.py");
        set.toggle(file, &mut d, 0).unwrap();
        set.toggle(file, &mut d, 1).unwrap();

        let markers = set.clear_file(file, &mut d);
        assert_eq!(markers.len(), 2);
        assert!(set.is_empty());
        assert!(set.for_file(file).is_empty());
    }
}
