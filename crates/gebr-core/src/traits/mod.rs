//! Core trait definitions

mod cache;
mod host;
mod process;

pub use cache::{MemoryQuestionCache, QuestionCache};
pub use host::{kill_group_script, HostShell};
pub use process::{
    process_channel, CommandLine, ProcessControl, ProcessEvent, ProcessIo, ProcessLauncher,
    SpawnedProcess,
};
