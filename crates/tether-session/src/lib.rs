//! Debug session engine.
//!
//! Drives a `tetherpdb` subprocess over pipes: a reader task classifies
//! stdout byte by byte, a writer task owns stdin, and callers interact
//! through an async API that enqueues debugger commands and subscribes to
//! session events. All state transitions happen on the reader task; the
//! one exception is [`DebugSession::stop`], which force-terminates.

mod command;
pub mod config;
pub mod error;
pub mod session;
pub mod state;

pub use config::LaunchConfig;
pub use error::SessionError;
pub use session::{DebugSession, SessionEvent};
pub use state::DebuggerState;
