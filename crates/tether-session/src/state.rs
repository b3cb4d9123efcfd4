//! Debug session lifecycle states.

use std::fmt;

/// Where the debugger is in its lifecycle.
///
/// Transitions are driven by the reader loop: dispatching a command moves
/// to that command's result state, and a prompt with an empty queue moves
/// to `Ready`. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerState {
    /// Process spawned, first prompt not yet seen.
    Start,
    /// Paused at a prompt with nothing queued; commands are accepted.
    Ready,
    /// Executing debugged code after a step or continue.
    Running,
    /// A breakpoint add was dispatched; awaiting its confirmation.
    BreakpointSet,
    /// A response-carrying command was dispatched; output is being
    /// captured instead of streamed.
    AwaitingResponse,
    /// An internal bookkeeping command was dispatched; not surfaced to
    /// subscribers.
    HiddenRunning,
    /// The debugged program finished or the session was stopped.
    Done,
}

impl DebuggerState {
    /// Whether the session has ended for good.
    pub fn is_terminal(self) -> bool {
        self == DebuggerState::Done
    }

    /// Whether this transition should be announced to subscribers.
    /// Response capture and hidden bookkeeping stay invisible.
    pub fn is_visible(self) -> bool {
        !matches!(
            self,
            DebuggerState::AwaitingResponse | DebuggerState::HiddenRunning
        )
    }
}

impl fmt::Display for DebuggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DebuggerState::Start => "starting",
            DebuggerState::Ready => "ready",
            DebuggerState::Running => "running",
            DebuggerState::BreakpointSet => "setting breakpoint",
            DebuggerState::AwaitingResponse => "awaiting response",
            DebuggerState::HiddenRunning => "running (internal)",
            DebuggerState::Done => "done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_only_done_is_terminal() {
        assert!(DebuggerState::Done.is_terminal());
        assert!(!DebuggerState::Ready.is_terminal());
        assert!(!DebuggerState::Running.is_terminal());
        assert!(!DebuggerState::Start.is_terminal());
    }

    #[test]
    fn state_internal_states_are_invisible() {
        assert!(!DebuggerState::AwaitingResponse.is_visible());
        assert!(!DebuggerState::HiddenRunning.is_visible());
        assert!(DebuggerState::Ready.is_visible());
        assert!(DebuggerState::Done.is_visible());
    }

    #[test]
    fn state_display_names() {
        assert_eq!(DebuggerState::Ready.to_string(), "ready");
        assert_eq!(DebuggerState::BreakpointSet.to_string(), "setting breakpoint");
    }
}
