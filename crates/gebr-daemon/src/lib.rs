//! gebr-daemon: the GeBR worker daemon
//!
//! Jobs are submitted to named queues. Jobs of one queue run one after the
//! other, different queues run side by side, and a job submitted without a
//! queue name runs right away. A single scheduler loop owns all queue state;
//! control channel connections reach it through a [`SchedulerHandle`].

pub mod commands;
pub mod connection;
pub mod error;
pub mod instance;
pub mod job;
pub mod queue;
pub mod registry;
pub mod scheduler;

pub use commands::{QueueCommand, QueueReply};
pub use connection::serve;
pub use error::DaemonError;
pub use instance::{running_port, Instance};
pub use job::{Job, JobId, JobOutcome, JobRunner, ShellRunner};
pub use queue::JobQueue;
pub use registry::QueueRegistry;
pub use scheduler::{spawn_scheduler, Finished, Scheduler, SchedulerHandle, SchedulerRequest};
