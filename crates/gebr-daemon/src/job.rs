//! Jobs and how they are run

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;

/// Daemon-wide job number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// A submitted command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    /// Queue the job was submitted to; empty for immediate execution
    pub queue: String,
    pub command: String,
}

impl Job {
    pub fn is_immediate(&self) -> bool {
        self.queue.is_empty()
    }
}

/// How a job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    /// Exit code, `None` when killed or never started
    pub code: Option<i32>,
}

impl JobOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes jobs
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &Job) -> JobOutcome;
}

/// Runs each job as `<shell> -c <command>`
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

#[async_trait]
impl JobRunner for ShellRunner {
    async fn run(&self, job: &Job) -> JobOutcome {
        tracing::info!("{}: running '{}'", job.id, job.command);

        let status = tokio::process::Command::new(&self.shell)
            .arg("-c")
            .arg(&job.command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) => {
                tracing::info!("{}: finished with {}", job.id, status);
                JobOutcome {
                    code: status.code(),
                }
            }
            Err(e) => {
                tracing::error!("{}: failed to start {}: {}", job.id, self.shell, e);
                JobOutcome { code: None }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(command: &str) -> Job {
        Job {
            id: JobId(1),
            queue: String::new(),
            command: command.to_string(),
        }
    }

    #[tokio::test]
    async fn test_shell_exit_code() {
        let runner = ShellRunner::new("sh");

        assert!(runner.run(&job("true")).await.success());
        assert_eq!(runner.run(&job("exit 3")).await.code, Some(3));
    }

    #[tokio::test]
    async fn test_missing_shell() {
        let runner = ShellRunner::new("/nonexistent/shell");
        assert_eq!(runner.run(&job("true")).await, JobOutcome { code: None });
    }

    #[test]
    fn test_immediate() {
        assert!(job("true").is_immediate());
        assert_eq!(JobId(7).to_string(), "job-7");
    }
}
