//! Session error types.

/// Errors from debug session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Debugger process failed to start.
    #[error("debugger failed to start: {0}")]
    SpawnFailed(String),

    /// The operation needs the debugger paused at a prompt.
    #[error("debugger is not paused at a prompt")]
    NotReady,

    /// The operation needs the debugged program to be running.
    #[error("debugged program is not running")]
    NotRunning,

    /// The session has ended.
    #[error("session has ended")]
    Stopped,

    /// Launch configuration could not be read.
    #[error("invalid launch configuration: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
