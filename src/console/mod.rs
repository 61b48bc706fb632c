//! Callback bridge
//!
//! Turns the engine's output and input requests into console operations.
//! Output is written verbatim and flushed before the callback returns; input
//! is read one line at a time with a prompt. End of input is either turned
//! into the shutdown sentence (non-interactive) or into a cancellation request
//! on the current session (interactive).
//!
//! The engine reaches a bridge through the `extern "system"` trampolines in
//! [`routes`], keyed by instance handle.

use std::ffi::{c_char, CString};
use std::io::{self, BufRead, BufReader, IsTerminal, Read, Write};
use std::sync::OnceLock;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::OutputKind;
use crate::interrupt::CancelCounter;

pub mod routes;

/// Longest line handed to the engine in one input request.
pub const MAX_INPUT: usize = 30000;

/// Sentence that makes the engine shut down cleanly.
pub const SHUTDOWN_SENTENCE: &str = "2!:55''";

/// Prompt used by the read loop.
pub const DEFAULT_PROMPT: &str = "   ";

/// One output notification from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent<'a> {
    /// The engine asks the host to terminate with this status.
    Exit(i32),
    /// Text to show on the console.
    Text { kind: OutputKind, payload: &'a [u8] },
}

/// Called with the status of an `Exit` event.
pub type ExitHook = Box<dyn Fn(i32) + Send + Sync>;

/// Console configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Prompt written before each read
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Maximum bytes delivered per input request
    #[serde(default = "default_max_input")]
    pub max_input: usize,
    /// Sentence returned once input is exhausted
    #[serde(default = "default_shutdown_sentence")]
    pub shutdown_sentence: String,
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

fn default_max_input() -> usize {
    MAX_INPUT
}

fn default_shutdown_sentence() -> String {
    SHUTDOWN_SENTENCE.to_string()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            max_input: default_max_input(),
            shutdown_sentence: default_shutdown_sentence(),
        }
    }
}

struct InputState {
    reader: Box<dyn BufRead + Send>,
    /// Last line handed out through the raw input path.
    line: CString,
    exhausted: bool,
}

/// Console side of the engine callbacks.
pub struct CallbackBridge {
    input: Mutex<InputState>,
    output: Mutex<Box<dyn Write + Send>>,
    interactive: bool,
    max_input: usize,
    shutdown: CString,
    cancel: Mutex<Option<CancelCounter>>,
    exit_status: OnceLock<i32>,
    on_exit: ExitHook,
}

impl std::fmt::Debug for CallbackBridge {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CallbackBridge")
            .field("interactive", &self.interactive)
            .field("max_input", &self.max_input)
            .field("exit_status", &self.exit_status.get())
            .finish_non_exhaustive()
    }
}

impl CallbackBridge {
    /// Bridge over arbitrary streams. The exit hook defaults to recording the
    /// status only.
    pub fn new(
        reader: impl BufRead + Send + 'static,
        writer: impl Write + Send + 'static,
        interactive: bool,
        config: &ConsoleConfig,
    ) -> Self {
        // Interior NULs cannot reach the engine; cut the sentence there.
        let shutdown = config.shutdown_sentence.split('\0').next().unwrap_or_default();
        Self {
            input: Mutex::new(InputState {
                reader: Box::new(reader),
                line: CString::default(),
                exhausted: false,
            }),
            output: Mutex::new(Box::new(writer)),
            interactive,
            max_input: config.max_input.max(1),
            shutdown: CString::new(shutdown).unwrap_or_default(),
            cancel: Mutex::new(None),
            exit_status: OnceLock::new(),
            on_exit: Box::new(|_| {}),
        }
    }

    /// Bridge over the process's standard streams; interactive when standard
    /// input is a terminal.
    pub fn stdio(config: &ConsoleConfig) -> Self {
        let stdin = io::stdin();
        let interactive = stdin.is_terminal();
        debug!(interactive, "console attached to standard streams");
        Self::new(BufReader::new(stdin), io::stdout(), interactive, config)
    }

    /// Replace the action taken on an `Exit` event.
    pub fn with_exit_hook(
        mut self,
        hook: impl Fn(i32) + Send + Sync + 'static,
    ) -> Self {
        self.on_exit = Box::new(hook);
        self
    }

    /// Session whose break cell receives end-of-input cancellation requests.
    pub fn set_cancel_target(&self, counter: Option<CancelCounter>) {
        *self.cancel.lock() = counter;
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Status recorded by the first `Exit` event, if any.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status.get().copied()
    }

    /// Handle one output event.
    pub fn on_output(&self, event: OutputEvent<'_>) {
        match event {
            OutputEvent::Exit(status) => {
                if let Err(e) = self.output.lock().flush() {
                    warn!("failed to flush console output: {}", e);
                }
                if self.exit_status.set(status).is_err() {
                    debug!(status, "exit already recorded");
                }
                info!(status, "engine requested exit");
                (self.on_exit)(status);
            }
            OutputEvent::Text { kind, payload } => {
                let mut output = self.output.lock();
                let written = output.write_all(payload).and_then(|_| output.flush());
                if let Err(e) = written {
                    warn!(?kind, "failed to write engine output: {}", e);
                }
            }
        }
    }

    /// Prompt for and return the next line of input.
    pub fn on_input(&self, prompt: &str) -> String {
        String::from_utf8_lossy(&self.on_input_bytes(prompt.as_bytes())).into_owned()
    }

    /// As [`on_input`](Self::on_input), without assuming the console is UTF-8.
    pub fn on_input_bytes(&self, prompt: &[u8]) -> Vec<u8> {
        let mut state = self.input.lock();
        self.next_line(&mut state, prompt)
    }

    /// Input path used by the engine: the returned pointer stays valid until
    /// the next input request on this bridge.
    pub(crate) fn on_input_raw(&self, prompt: &[u8]) -> *const c_char {
        let mut state = self.input.lock();
        let line = self.next_line(&mut state, prompt);
        state.line = CString::new(line).unwrap_or_default();
        state.line.as_ptr()
    }

    fn next_line(
        &self,
        state: &mut InputState,
        prompt: &[u8],
    ) -> Vec<u8> {
        if state.exhausted {
            return self.shutdown.as_bytes().to_vec();
        }
        self.write_console(prompt);
        loop {
            if let Some(line) = self.read_line(state) {
                return line;
            }
            if !self.interactive {
                debug!("input exhausted, requesting shutdown");
                state.exhausted = true;
                return self.shutdown.as_bytes().to_vec();
            }
            self.write_console(b"\n");
            if let Some(counter) = self.cancel.lock().as_ref() {
                let value = counter.request_cancel();
                debug!(value, "end of interactive input, break requested");
            }
        }
    }

    /// One line without its terminator, cut at the first NUL. `None` at end
    /// of input; read errors count as end of input.
    fn read_line(&self, state: &mut InputState) -> Option<Vec<u8>> {
        let mut line = Vec::new();
        let limit = self.max_input as u64;
        match (&mut state.reader).take(limit).read_until(b'\n', &mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                }
                if let Some(nul) = line.iter().position(|&b| b == 0) {
                    line.truncate(nul);
                }
                Some(line)
            }
            Err(e) => {
                warn!("failed to read console input: {}", e);
                None
            }
        }
    }

    fn write_console(&self, bytes: &[u8]) {
        let mut output = self.output.lock();
        if let Err(e) = output.write_all(bytes).and_then(|_| output.flush()) {
            warn!("failed to write to console: {}", e);
        }
    }
}

#[cfg(test)]
mod tests;
