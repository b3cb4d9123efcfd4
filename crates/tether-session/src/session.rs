//! The debug session engine.
//!
//! Layout mirrors the subprocess protocol clients elsewhere in this
//! workspace: the child's stdin is owned by a writer task fed through a
//! channel, and a reader task consumes stdout one byte at a time, because
//! the prompt that signals "debugger is listening" carries no newline.
//! The reader task owns all state transitions; callers talk to it through
//! the command queue and hear back through a broadcast channel.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use tether_core::breakpoint::BreakpointSpec;
use tether_protocol::classify;
use tether_protocol::position::CodePosition;
use tether_protocol::variables::Variable;
use tether_protocol::SENTINEL;

use crate::command::{Command, CommandQueue};
use crate::config::LaunchConfig;
use crate::error::SessionError;
use crate::state::DebuggerState;

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

const IMPORT_HELPER: &[u8] = b"import tethervars as __tether_vars__\n";
const LOCALS_EXPR: &str = "__tether_vars__.dump_environment(locals(), globals())";
const GLOBALS_EXPR: &str =
    "__tether_vars__.dump_environment(__tether_vars__.subtract(globals(), locals()), globals())";

/// What subscribers hear about a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session entered a new visible state, with the position it is
    /// paused at when one is known.
    StateChanged {
        state: DebuggerState,
        position: Option<CodePosition>,
    },
    /// Raw output from the debugged program.
    Output { data: Vec<u8>, stderr: bool },
    /// A breakpoint the debugger refused to set, with pdb's diagnostic.
    BreakpointError { detail: String },
}

struct Shared {
    state: Mutex<DebuggerState>,
    position: Mutex<Option<CodePosition>>,
    queue: CommandQueue,
    events: broadcast::Sender<SessionEvent>,
    writer_tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Whether the current stdout line could still be a protocol line.
    /// Reset at every newline; also reset when the caller forwards a
    /// newline-terminated chunk to the program's stdin, since echoed
    /// input restarts the line.
    line_could_be_protocol: AtomicBool,
}

impl Shared {
    fn state(&self) -> DebuggerState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Returns whether the state actually changed.
    fn set_state(&self, new: DebuggerState) -> bool {
        let mut state = self.state.lock().expect("state lock poisoned");
        let changed = *state != new;
        *state = new;
        changed
    }

    fn position(&self) -> Option<CodePosition> {
        self.position.lock().expect("position lock poisoned").clone()
    }

    fn set_position(&self, position: CodePosition) {
        *self.position.lock().expect("position lock poisoned") = Some(position);
    }

    fn publish_state(&self) {
        let _ = self.events.send(SessionEvent::StateChanged {
            state: self.state(),
            position: self.position(),
        });
    }

    fn emit_output(&self, data: Vec<u8>, stderr: bool) {
        if !data.is_empty() {
            let _ = self.events.send(SessionEvent::Output { data, stderr });
        }
    }
}

/// A live debug session over a `tetherpdb` subprocess.
pub struct DebugSession {
    shared: Arc<Shared>,
    child: Mutex<Option<Child>>,
    stop_tx: watch::Sender<bool>,
}

impl DebugSession {
    /// Spawn the debugger subprocess and start driving it.
    ///
    /// `breakpoints` are installed at the first prompt; unless the
    /// program is already paused exactly on one of them, a continue is
    /// queued behind them so execution runs to the first breakpoint.
    pub fn spawn(
        config: &LaunchConfig,
        breakpoints: Vec<BreakpointSpec>,
    ) -> Result<Self, SessionError> {
        tracing::info!(
            file = %config.file.display(),
            python = %config.python,
            "launching debugger"
        );
        let mut child = ProcessCommand::new(&config.python)
            .args(config.interpreter_args())
            .env("PYTHONPATH", config.python_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::SpawnFailed(format!("{}: {e}", config.python)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("could not capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("could not capture stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("could not capture stderr".into()))?;

        let session = Self::from_streams(stdout, stdin, breakpoints);

        let events = session.shared.events.clone();
        tokio::spawn(async move {
            let mut stderr = stderr;
            let mut buf = [0u8; 1024];
            loop {
                match stderr.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let _ = events.send(SessionEvent::Output {
                            data: buf[..n].to_vec(),
                            stderr: true,
                        });
                    }
                }
            }
        });

        *session.child.lock().expect("child lock poisoned") = Some(child);
        Ok(session)
    }

    /// Start a session over arbitrary byte streams standing in for the
    /// subprocess pipes. Used directly by tests; `spawn` goes through
    /// here too.
    pub fn from_streams<R, W>(stdout: R, stdin: W, breakpoints: Vec<BreakpointSpec>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (stop_tx, stop_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            state: Mutex::new(DebuggerState::Start),
            position: Mutex::new(None),
            queue: CommandQueue::default(),
            events,
            writer_tx,
            line_could_be_protocol: AtomicBool::new(true),
        });

        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(payload) = writer_rx.recv().await {
                if stdin.write_all(&payload).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let reader = ReaderLoop {
            shared: Arc::clone(&shared),
            initial_breakpoints: breakpoints,
            setup_done: false,
            buffer: Vec::new(),
            pending: None,
        };
        tokio::spawn(reader.run(BufReader::new(stdout), stop_rx));

        Self {
            shared,
            child: Mutex::new(None),
            stop_tx,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DebuggerState {
        self.shared.state()
    }

    /// Position the debugger last reported stopping at.
    pub fn current_position(&self) -> Option<CodePosition> {
        self.shared.position()
    }

    /// Whether the debugger is paused at a prompt and accepting commands.
    pub fn is_ready(&self) -> bool {
        self.state() == DebuggerState::Ready
    }

    /// Whether the session has ended.
    pub fn is_terminated(&self) -> bool {
        self.state().is_terminal()
    }

    /// Number of commands queued but not yet dispatched.
    pub fn pending_commands(&self) -> usize {
        self.shared.queue.len()
    }

    /// Subscribe to session events. Each receiver sees every event sent
    /// after it subscribes.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Step over the current line.
    pub fn step_over(&self) -> Result<(), SessionError> {
        self.enqueue_step(b"n\n")
    }

    /// Step into the call on the current line.
    pub fn step_into(&self) -> Result<(), SessionError> {
        self.enqueue_step(b"s\n")
    }

    /// Resume execution until the next breakpoint or program exit.
    pub fn continue_run(&self) -> Result<(), SessionError> {
        self.enqueue_step(b"c\n")
    }

    /// Queue a breakpoint add. Takes effect at the next prompt; a refusal
    /// surfaces as [`SessionEvent::BreakpointError`].
    pub fn set_breakpoint(&self, spec: &BreakpointSpec) -> Result<(), SessionError> {
        if self.state().is_terminal() {
            return Err(SessionError::Stopped);
        }
        let payload = format!("b {}:{}\n", spec.file.display(), spec.line);
        self.shared
            .queue
            .push(Command::new(payload.into_bytes(), DebuggerState::BreakpointSet));
        Ok(())
    }

    /// Queue a breakpoint removal. Takes effect at the next prompt.
    pub fn clear_breakpoint(&self, spec: &BreakpointSpec) -> Result<(), SessionError> {
        if self.state().is_terminal() {
            return Err(SessionError::Stopped);
        }
        let payload = format!("cl {}:{}\n", spec.file.display(), spec.line);
        self.shared
            .queue
            .push(Command::new(payload.into_bytes(), DebuggerState::Running));
        Ok(())
    }

    /// Fetch the current stack trace, raw as pdb prints it.
    ///
    /// Completes at the prompt that follows the queued `w` command, so
    /// this must not be awaited from inside an event handler that the
    /// session itself is blocked on.
    pub async fn get_stack_trace(&self) -> Result<String, SessionError> {
        self.require_ready()?;
        let (command, rx) = Command::with_response(b"w\n".to_vec());
        self.shared.queue.push(command);
        rx.await.map_err(|_| SessionError::Stopped)
    }

    /// Fetch the local and global variable trees for the current frame.
    ///
    /// Queues a hidden helper import before each dump request; the
    /// import is invisible to subscribers. Globals are reported with the
    /// locals subtracted so module scope is not repeated inside a
    /// function frame.
    pub async fn get_variables(&self) -> Result<(Variable, Variable), SessionError> {
        self.require_ready()?;
        let locals_rx = self.enqueue_environment_request(LOCALS_EXPR);
        let globals_rx = self.enqueue_environment_request(GLOBALS_EXPR);
        let locals = locals_rx.await.map_err(|_| SessionError::Stopped)?;
        let globals = globals_rx.await.map_err(|_| SessionError::Stopped)?;
        Ok((
            Variable::parse(locals.trim()),
            Variable::parse(globals.trim()),
        ))
    }

    /// Forward input to the debugged program's stdin while it runs.
    pub fn write_stdin(&self, input: &str) -> Result<(), SessionError> {
        if self.state() != DebuggerState::Running {
            return Err(SessionError::NotRunning);
        }
        self.shared
            .writer_tx
            .send(input.as_bytes().to_vec())
            .map_err(|_| SessionError::Stopped)?;
        if input.ends_with('\n') {
            // The program will usually echo the input; the next stdout
            // line starts fresh.
            self.shared
                .line_could_be_protocol
                .store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Kill the subprocess and end the session. Idempotent; any caller
    /// blocked on a response is unblocked with [`SessionError::Stopped`].
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let child = self.child.lock().expect("child lock poisoned").take();
        if let Some(mut child) = child {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        self.shared.queue.clear();
        if self.shared.set_state(DebuggerState::Done) {
            tracing::info!("session stopped");
            self.shared.publish_state();
        }
    }

    fn require_ready(&self) -> Result<(), SessionError> {
        match self.state() {
            DebuggerState::Ready => Ok(()),
            DebuggerState::Done => Err(SessionError::Stopped),
            _ => Err(SessionError::NotReady),
        }
    }

    fn enqueue_step(&self, payload: &[u8]) -> Result<(), SessionError> {
        self.require_ready()?;
        self.shared
            .queue
            .push(Command::new(payload.to_vec(), DebuggerState::Running));
        Ok(())
    }

    fn enqueue_environment_request(&self, expr: &str) -> oneshot::Receiver<String> {
        self.shared.queue.push(Command::new(
            IMPORT_HELPER.to_vec(),
            DebuggerState::HiddenRunning,
        ));
        let (command, rx) = Command::with_response(format!("print({expr})\n").into_bytes());
        self.shared.queue.push(command);
        rx
    }
}

struct PendingResponse {
    text: String,
    sender: oneshot::Sender<String>,
}

/// State owned by the reader task.
struct ReaderLoop {
    shared: Arc<Shared>,
    initial_breakpoints: Vec<BreakpointSpec>,
    setup_done: bool,
    buffer: Vec<u8>,
    pending: Option<PendingResponse>,
}

impl ReaderLoop {
    async fn run<R>(mut self, mut reader: BufReader<R>, mut stop_rx: watch::Receiver<bool>)
    where
        R: AsyncRead + Unpin,
    {
        'read: loop {
            if *stop_rx.borrow() {
                self.abandon();
                return;
            }
            // Reads happen a burst at a time; bytes are still classified
            // one by one so chunk boundaries cannot change behavior, but
            // output is flushed per burst rather than per byte, keeping
            // one read's worth of program output to a single event.
            let chunk: Vec<u8> = tokio::select! {
                result = reader.fill_buf() => match result {
                    Ok([]) | Err(_) => {
                        tracing::debug!("debugger stdout closed");
                        self.finish();
                        break;
                    }
                    Ok(bytes) => bytes.to_vec(),
                },
                _ = stop_rx.changed() => {
                    self.abandon();
                    return;
                }
            };
            reader.consume(chunk.len());

            for &byte in &chunk {
                self.buffer.push(byte);
                if byte == b'\n' {
                    self.complete_line();
                } else if self.protocol_possible() {
                    let fragment = String::from_utf8_lossy(&self.buffer).into_owned();
                    if classify::is_prompt(&fragment) {
                        if !self.on_prompt(&mut stop_rx).await {
                            self.abandon();
                            return;
                        }
                    } else {
                        self.classify_fragment(&fragment);
                    }
                }
                if self.shared.state().is_terminal() {
                    break 'read;
                }
            }
            self.flush_output();
        }
        // Session over: make sure the debugger itself goes away even if
        // it is sitting at a post-mortem prompt.
        let _ = self.shared.writer_tx.send(b"quit\n".to_vec());
    }

    fn state(&self) -> DebuggerState {
        self.shared.state()
    }

    fn protocol_possible(&self) -> bool {
        self.shared.line_could_be_protocol.load(Ordering::SeqCst)
    }

    fn set_protocol_possible(&self, value: bool) {
        self.shared
            .line_could_be_protocol
            .store(value, Ordering::SeqCst);
    }

    /// A byte arrived mid-line: decide whether the line is still possibly
    /// protocol. Once it is not, the line streams through as program
    /// output: complete lines via [`Self::complete_line`], dangling
    /// fragments (an `input()` prompt, say) via [`Self::flush_output`] at
    /// the end of the read burst.
    fn classify_fragment(&mut self, fragment: &str) {
        if !classify::is_partial_protocol(fragment) {
            self.set_protocol_possible(false);
        }
    }

    /// Pass accumulated non-protocol bytes to subscribers without waiting
    /// for a newline that may never come.
    fn flush_output(&mut self) {
        if !self.protocol_possible()
            && self.state() != DebuggerState::AwaitingResponse
            && !self.buffer.is_empty()
        {
            let data = std::mem::take(&mut self.buffer);
            self.shared.emit_output(data, false);
        }
    }

    /// A full line arrived: dispatch on its protocol kind.
    fn complete_line(&mut self) {
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        let could = self.protocol_possible();
        let state = self.state();

        if state == DebuggerState::AwaitingResponse {
            if let Some(pending) = &mut self.pending {
                pending.text.push_str(&line);
            }
        } else if could
            && state == DebuggerState::BreakpointSet
            && (classify::is_partial_diagnostic(&line)
                || classify::is_partial_blank_or_comment(&line))
        {
            let detail = line
                .strip_prefix(SENTINEL)
                .unwrap_or(&line)
                .trim_end()
                .to_string();
            tracing::warn!(%detail, "breakpoint was not set");
            let _ = self
                .shared
                .events
                .send(SessionEvent::BreakpointError { detail });
        } else if could && classify::is_ignorable(&line) {
            // Call/return markers, source echoes, stray partial prompts.
        } else if could && classify::is_partial_code_position(&line) {
            let stripped = line.strip_prefix(SENTINEL).unwrap_or(&line);
            if let Some(position) = CodePosition::parse(stripped) {
                tracing::trace!(%position, "stopped");
                self.shared.set_position(position);
            }
        } else if could && classify::is_partial_breakpoint(&line) {
            // Clean confirmation; the prompt that follows carries the
            // real signal.
        } else if could && classify::is_partial_exception(&line) {
            // An exception surfaced mid-step. Pending steps no longer
            // make sense against the unwinding stack; let the program
            // run to its post-mortem report.
            tracing::debug!(line = line.trim_end(), "exception raised; continuing");
            self.shared.queue.clear();
            self.shared
                .queue
                .push(Command::new(b"c\n".to_vec(), DebuggerState::Running));
            let report = line.strip_prefix(SENTINEL).unwrap_or(&line);
            self.shared.emit_output(report.as_bytes().to_vec(), false);
        } else if could && classify::is_partial_post_mortem(&line) {
            tracing::warn!("debugged program raised an uncaught exception");
            let _ = self.shared.writer_tx.send(b"quit\n".to_vec());
            self.finish();
        } else if could && classify::is_partial_done(&line) {
            self.finish();
        } else {
            let data = std::mem::take(&mut self.buffer);
            self.shared.emit_output(data, false);
        }

        self.buffer.clear();
        self.set_protocol_possible(true);
    }

    /// The prompt arrived: complete any captured response, dispatch the
    /// next queued command, or go `Ready` and park until one shows up.
    /// Returns `false` when a stop request interrupted the wait.
    async fn on_prompt(&mut self, stop_rx: &mut watch::Receiver<bool>) -> bool {
        if !self.setup_done {
            self.enqueue_setup();
        }
        if self.state() == DebuggerState::AwaitingResponse {
            if let Some(pending) = self.pending.take() {
                let _ = pending.sender.send(pending.text);
            }
        }

        let mut announced = false;
        let command = loop {
            if let Some(command) = self.shared.queue.pop() {
                break command;
            }
            if self.position_is_phantom() {
                // Paused inside generated or builtin code the editor
                // cannot show; step until we surface in a real file.
                tracing::debug!("stopped outside any real file; stepping");
                self.shared
                    .queue
                    .push(Command::new(b"n\n".to_vec(), DebuggerState::Running));
                continue;
            }
            if !announced {
                self.shared.set_state(DebuggerState::Ready);
                self.shared.publish_state();
                announced = true;
            }
            tokio::select! {
                _ = self.shared.queue.wait_for_command() => {}
                _ = stop_rx.changed() => return false,
            }
        };

        if let Some(sender) = command.response {
            self.pending = Some(PendingResponse {
                text: String::new(),
                sender,
            });
        }
        if self.shared.writer_tx.send(command.payload).is_err() {
            tracing::warn!("stdin writer is gone");
        }
        self.shared.set_state(command.result_state);
        if command.result_state.is_visible() {
            self.shared.publish_state();
        }
        self.buffer.clear();
        self.set_protocol_possible(true);
        true
    }

    /// Install initial breakpoints at the first prompt. Unless the
    /// program happens to be paused exactly on one of them, run on.
    fn enqueue_setup(&mut self) {
        self.setup_done = true;
        let position = self.shared.position();
        let mut paused_on_breakpoint = false;
        for bp in &self.initial_breakpoints {
            let payload = format!("b {}:{}\n", bp.file.display(), bp.line);
            self.shared
                .queue
                .push(Command::new(payload.into_bytes(), DebuggerState::BreakpointSet));
            if let Some(position) = &position {
                if position.line == bp.line && Path::new(&position.file) == bp.file {
                    paused_on_breakpoint = true;
                }
            }
        }
        if !paused_on_breakpoint {
            self.shared
                .queue
                .push(Command::new(b"c\n".to_vec(), DebuggerState::Running));
        }
    }

    fn position_is_phantom(&self) -> bool {
        match self.shared.position() {
            Some(position) => !Path::new(&position.file).is_file(),
            None => true,
        }
    }

    /// Normal end of session: the program finished or stdout closed.
    fn finish(&mut self) {
        self.abandon();
        if self.shared.set_state(DebuggerState::Done) {
            self.shared.publish_state();
        }
    }

    /// Drop anything a caller could still be waiting on.
    fn abandon(&mut self) {
        if let Some(pending) = self.pending.take() {
            drop(pending.sender);
        }
        self.shared.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_expressions_reference_helper_module() {
        assert!(LOCALS_EXPR.starts_with("__tether_vars__."));
        assert!(GLOBALS_EXPR.contains("subtract"));
        assert!(IMPORT_HELPER.starts_with(b"import tethervars"));
    }
}
