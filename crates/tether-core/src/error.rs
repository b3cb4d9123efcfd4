//! Document and breakpoint error types.

use std::path::PathBuf;

/// Errors from document operations.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// File to open was not found.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// Line index past the end of the document.
    #[error("line {0} is out of range")]
    LineOutOfRange(usize),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a breakpoint cannot be placed at a requested location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// The requested line is empty.
    #[error("cannot set a breakpoint on empty line {0}")]
    EmptyLine(usize),

    /// The requested line holds only a comment.
    #[error("cannot set a breakpoint on comment line {0}")]
    CommentLine(usize),

    /// Neither the requested line nor any line in the lookahead window
    /// holds executable code.
    #[error("no executable line within {lookahead} lines of line {line}")]
    NoExecutableLine {
        /// Requested 0-based line.
        line: usize,
        /// Size of the search window that was exhausted.
        lookahead: usize,
    },
}
