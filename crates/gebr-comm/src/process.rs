//! Processes running on a pseudo-terminal
//!
//! ssh only prints password prompts and host-key questions when it talks to
//! a terminal, so every ssh run goes through a PTY from portable-pty.

use std::io::{Read, Write};
use std::time::Duration;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio_util::sync::CancellationToken;

use gebr_core::error::CommError;
use gebr_core::traits::{
    process_channel, CommandLine, ProcessEvent, ProcessIo, ProcessLauncher, SpawnedProcess,
};

/// How long to wait for trailing output once the child has exited
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

const READ_BUFFER_SIZE: usize = 4096;

/// Launches processes attached to a fresh PTY
#[derive(Debug, Clone)]
pub struct PtyLauncher {
    env: Vec<(String, String)>,
}

impl Default for PtyLauncher {
    fn default() -> Self {
        // Prompts are matched on their English text
        Self {
            env: vec![
                ("LC_ALL".to_string(), "C".to_string()),
                ("TERM".to_string(), "dumb".to_string()),
            ],
        }
    }
}

impl PtyLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment variable for every launched process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl ProcessLauncher for PtyLauncher {
    fn spawn(&self, command: &CommandLine) -> Result<SpawnedProcess, CommError> {
        tracing::debug!("Launching on PTY: {}", command);

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: 24,
                cols: 512,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| CommError::SpawnFailed(format!("Failed to open PTY: {}", e)))?;

        let mut builder = CommandBuilder::new(&command.program);
        builder.args(&command.args);
        for (key, value) in &self.env {
            builder.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| CommError::SpawnFailed(format!("{}: {}", command.program, e)))?;
        // Only the child keeps the slave side open, so EOF follows its exit
        drop(pair.slave);

        let pid = child.process_id();
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| CommError::SpawnFailed(format!("Failed to clone PTY reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| CommError::SpawnFailed(format!("Failed to take PTY writer: {}", e)))?;

        let (spawned, io) = process_channel(pid);
        let ProcessIo {
            mut input,
            events,
            cancel,
        } = io;

        let output_events = events.clone();
        let reader_task = tokio::task::spawn_blocking(move || read_output(reader, output_events));

        let mut writer = writer;
        tokio::task::spawn_blocking(move || {
            while let Some(data) = input.blocking_recv() {
                if writer
                    .write_all(data.as_bytes())
                    .and_then(|_| writer.flush())
                    .is_err()
                {
                    break;
                }
            }
        });

        let mut killer = child.clone_killer();
        let exited = CancellationToken::new();
        let exited_guard = exited.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = killer.kill() {
                        tracing::debug!("Kill failed: {}", e);
                    }
                }
                _ = exited.cancelled() => {}
            }
        });

        let master = pair.master;
        let program = command.program.clone();
        tokio::spawn(async move {
            let status = tokio::task::spawn_blocking(move || child.wait()).await;
            exited_guard.cancel();

            let code = match status {
                Ok(Ok(status)) => Some(status.exit_code() as i32),
                _ => None,
            };
            tracing::debug!("Process {} (pid {:?}) exited with {:?}", program, pid, code);

            if tokio::time::timeout(DRAIN_TIMEOUT, reader_task).await.is_err() {
                tracing::debug!("Output of {} still open after exit", program);
            }
            drop(master);
            let _ = events.send(ProcessEvent::Exited(code));
        });

        Ok(spawned)
    }
}

fn read_output(
    mut reader: Box<dyn Read + Send>,
    events: tokio::sync::mpsc::UnboundedSender<ProcessEvent>,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if events.send(ProcessEvent::Output(chunk)).is_err() {
                    break;
                }
            }
        }
    }
}
