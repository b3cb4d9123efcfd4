//! Wire protocol spoken by the `tetherpdb` companion module.
//!
//! The debug subprocess interleaves two streams on stdout: the debugged
//! program's own output, and protocol lines emitted by the wrapped pdb.
//! Protocol lines carry a sentinel prefix that ordinary programs will not
//! produce. This crate classifies byte-at-a-time fragments of that stream,
//! parses source positions out of stack marker lines, and parses the
//! variable-dump grammar produced by the `tethervars` helper.

pub mod classify;
pub mod position;
pub mod variables;

pub use classify::SENTINEL;
pub use position::CodePosition;
pub use variables::{ComplexVariable, PrimitiveVariable, Variable};
