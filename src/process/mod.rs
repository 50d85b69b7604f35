//! Control of the OS processes behind scheduled jobs.
//!
//! The engine never touches processes directly. Everything goes through the
//! [`JobController`] trait:
//! - **launch**: create the process already suspended
//! - **resume / pause**: start or stop a quantum, both idempotent
//! - **poll_exit**: non-blocking exit check
//! - **terminate**: forced kill, shutdown cleanup only
//!
//! [`ProcessController`] is the Unix implementation built on process groups
//! and `SIGSTOP`/`SIGCONT`.

pub mod signal;

use serde::Serialize;

use crate::error::Result;

pub use signal::ProcessController;

/// Identity of a launched job process. For [`ProcessController`] this is the pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobHandle(pub u32);

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a job process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ExitStatus {
    /// Normal exit with the given code.
    Exited(i32),
    /// Killed by the given signal.
    Signaled(i32),
    /// The process is gone but its status could not be collected.
    Unknown,
}

impl ExitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => ExitStatus::Exited(code),
            (None, Some(signal)) => ExitStatus::Signaled(signal),
            (None, None) => ExitStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit {}", code),
            ExitStatus::Signaled(signal) => write!(f, "signal {}", signal),
            ExitStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Bridge between job records and their execution contexts.
pub trait JobController {
    /// Create a process for `command` that is suspended before the command
    /// runs. The engine decides when it first gets the CPU.
    fn launch(&mut self, command: &[String]) -> Result<JobHandle>;

    /// Let a suspended job run. Resuming a running job is a no-op.
    fn resume(&mut self, handle: JobHandle) -> Result<()>;

    /// Suspend a running job. Pausing a suspended job is a no-op.
    fn pause(&mut self, handle: JobHandle) -> Result<()>;

    /// Report the exit status if the job has finished. Never blocks.
    ///
    /// Once a status is returned the handle is forgotten.
    fn poll_exit(&mut self, handle: JobHandle) -> Result<Option<ExitStatus>>;

    /// Kill the job outright.
    fn terminate(&mut self, handle: JobHandle) -> Result<()>;
}
