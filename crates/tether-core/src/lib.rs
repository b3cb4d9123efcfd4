//! Editor-side document model and breakpoint bookkeeping.
//!
//! Breakpoints are owned by the front end, not the debugger: they are
//! anchored into a rope-backed document so that edits above a breakpoint
//! move it rather than invalidate it, and they are only resolved to
//! concrete line numbers at the moment a debug session needs them.

pub mod breakpoint;
pub mod document;
pub mod error;
pub mod logging;

pub use breakpoint::{Breakpoint, BreakpointSet, BreakpointSpec, MarkerId, Toggle, LOOKAHEAD};
pub use document::{Anchor, DocumentModel, LineKind, TextDocument};
pub use error::{DocumentError, PlacementError};
