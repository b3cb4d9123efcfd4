//! Debugger commands and the FIFO they wait in.
//!
//! Commands are enqueued by API callers and dequeued by the reader loop,
//! one per prompt. A command that expects captured output carries a
//! oneshot sender; dropping the queue drops the senders, which unblocks
//! any caller awaiting a response.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::{oneshot, Notify};

use crate::state::DebuggerState;

/// One line of input for the debugger, plus what dispatching it means.
#[derive(Debug)]
pub(crate) struct Command {
    /// Bytes written to the subprocess stdin, newline included.
    pub payload: Vec<u8>,
    /// State the session enters when this command is dispatched.
    pub result_state: DebuggerState,
    /// Present when the command's output is captured and handed back.
    pub response: Option<oneshot::Sender<String>>,
}

impl Command {
    pub fn new(payload: impl Into<Vec<u8>>, result_state: DebuggerState) -> Self {
        Self {
            payload: payload.into(),
            result_state,
            response: None,
        }
    }

    /// A command whose output (everything up to the next prompt) is
    /// delivered through the returned receiver.
    pub fn with_response(payload: impl Into<Vec<u8>>) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        let command = Self {
            payload: payload.into(),
            result_state: DebuggerState::AwaitingResponse,
            response: Some(tx),
        };
        (command, rx)
    }
}

/// FIFO of pending commands shared between API callers and the reader
/// loop.
///
/// `Notify` carries at most one stored permit, which is enough here: the
/// reader drains the queue before parking, so a wakeup only needs to
/// signal "something was pushed since you last looked".
#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    inner: Mutex<VecDeque<Command>>,
    notify: Notify,
}

impl CommandQueue {
    pub fn push(&self, command: Command) {
        self.inner
            .lock()
            .expect("command queue lock poisoned")
            .push_back(command);
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<Command> {
        self.inner
            .lock()
            .expect("command queue lock poisoned")
            .pop_front()
    }

    /// Drop every pending command. Waiters on response channels observe
    /// the drop as a closed channel.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock().expect("command queue lock poisoned");
        let dropped = inner.len();
        inner.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("command queue lock poisoned")
            .len()
    }

    /// Wait until a push has happened since the last `pop` check.
    pub async fn wait_for_command(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_fifo() {
        let queue = CommandQueue::default();
        queue.push(Command::new(b"n\n".to_vec(), DebuggerState::Running));
        queue.push(Command::new(b"c\n".to_vec(), DebuggerState::Running));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().payload, b"n\n");
        assert_eq!(queue.pop().unwrap().payload, b"c\n");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn clear_drops_response_senders() {
        let queue = CommandQueue::default();
        let (command, mut rx) = Command::with_response(b"w\n".to_vec());
        queue.push(command);

        assert_eq!(queue.clear(), 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn push_wakes_waiter() {
        let queue = std::sync::Arc::new(CommandQueue::default());
        let waiter = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move {
                queue.wait_for_command().await;
                queue.pop()
            })
        };
        queue.push(Command::new(b"s\n".to_vec(), DebuggerState::Running));

        let popped = waiter.await.unwrap();
        assert_eq!(popped.unwrap().payload, b"s\n");
    }

    #[tokio::test]
    async fn permit_survives_push_before_wait() {
        let queue = CommandQueue::default();
        queue.push(Command::new(b"n\n".to_vec(), DebuggerState::Running));
        // The stored permit makes this return immediately even though the
        // push happened before anyone was waiting.
        queue.wait_for_command().await;
        assert!(queue.pop().is_some());
    }

    #[test]
    fn with_response_wires_the_channel() {
        let (mut command, mut rx) = Command::with_response(b"w\n".to_vec());
        assert_eq!(command.result_state, DebuggerState::AwaitingResponse);
        command
            .response
            .take()
            .unwrap()
            .send("stack".to_string())
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), "stack");
    }
}
