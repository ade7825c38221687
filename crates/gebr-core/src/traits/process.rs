//! Process launching traits
//!
//! ssh and server binaries are started through a [`ProcessLauncher`], so the
//! communication layer never touches the OS directly and tests can replace
//! real processes with scripted ones.

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CommError;

/// Program plus arguments, never passed through a local shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whether any argument equals `arg`
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Something a running process reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of terminal output, usually one line including its line ending
    Output(String),
    /// The process ended; `None` when the exit status is unknown
    Exited(Option<i32>),
}

/// Caller side handle for writing to and killing a process
#[derive(Debug, Clone)]
pub struct ProcessControl {
    input: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl ProcessControl {
    /// Write raw text to the process's terminal
    pub fn write(&self, data: impl Into<String>) -> Result<(), CommError> {
        self.input
            .send(data.into())
            .map_err(|_| CommError::ProcessGone)
    }

    /// Write a line followed by `\n`
    pub fn write_line(&self, line: &str) -> Result<(), CommError> {
        self.write(format!("{}\n", line))
    }

    /// Ask the launcher to terminate the process
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    pub fn is_killed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A started process
#[derive(Debug)]
pub struct SpawnedProcess {
    pub pid: Option<u32>,
    pub control: ProcessControl,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
}

/// Launcher side of a started process
#[derive(Debug)]
pub struct ProcessIo {
    /// Text written by the caller
    pub input: mpsc::UnboundedReceiver<String>,
    /// Where output and the exit status go
    pub events: mpsc::UnboundedSender<ProcessEvent>,
    /// Cancelled when the caller kills the process
    pub cancel: CancellationToken,
}

/// Create the two halves connecting a caller with a launched process
pub fn process_channel(pid: Option<u32>) -> (SpawnedProcess, ProcessIo) {
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let spawned = SpawnedProcess {
        pid,
        control: ProcessControl {
            input: input_tx,
            cancel: cancel.clone(),
        },
        events: events_rx,
    };
    let io = ProcessIo {
        input: input_rx,
        events: events_tx,
        cancel,
    };
    (spawned, io)
}

/// Starts processes
pub trait ProcessLauncher: Send + Sync {
    /// Start `command`. Must be called from within a tokio runtime.
    fn spawn(&self, command: &CommandLine) -> Result<SpawnedProcess, CommError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_spaced_args() {
        let cmd = CommandLine::new("ssh")
            .arg("-x")
            .arg("node1")
            .arg("kill -TERM -- -1");
        assert_eq!(cmd.to_string(), "ssh -x node1 'kill -TERM -- -1'");
        assert!(cmd.has_arg("-x"));
    }

    #[tokio::test]
    async fn test_channel_halves() {
        let (mut spawned, mut io) = process_channel(Some(7));

        spawned.control.write_line("secret").unwrap();
        assert_eq!(io.input.recv().await.unwrap(), "secret\n");

        io.events.send(ProcessEvent::Output("hi\n".into())).unwrap();
        assert_eq!(
            spawned.events.recv().await.unwrap(),
            ProcessEvent::Output("hi\n".into())
        );

        spawned.control.kill();
        assert!(io.cancel.is_cancelled());
    }

    #[test]
    fn test_write_after_launcher_gone() {
        let (spawned, io) = process_channel(None);
        drop(io);
        assert!(matches!(
            spawned.control.write("x"),
            Err(CommError::ProcessGone)
        ));
    }
}
