use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::process::Stdio;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use crate::error::{Result, SchedError};
use crate::process::{ExitStatus, JobController, JobHandle};

/// Stops the shell before it execs the job, so the job command itself has
/// not run a single instruction until the first `SIGCONT`.
const SUSPEND_TRAMPOLINE: &str = r#"kill -STOP $$; exec "$@""#;

/// `$0` of the trampoline shell.
const TRAMPOLINE_NAME: &str = "jobsched-job";

#[derive(Debug)]
struct TrackedProcess {
    child: Child,
    suspended: bool,
}

/// Runs jobs as real processes, one process group per job.
///
/// Pause and resume signal the whole group, so pipelines and helper
/// processes spawned by a job stop and start together with it. Because every
/// job leads its own group, a terminal interrupt aimed at the scheduler does
/// not reach the jobs.
#[derive(Debug, Default)]
pub struct ProcessController {
    processes: HashMap<JobHandle, TrackedProcess>,
    silence_output: bool,
}

impl ProcessController {
    /// Jobs inherit the scheduler's stdout and stderr.
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs write to `/dev/null`.
    pub fn silenced() -> Self {
        Self {
            processes: HashMap::new(),
            silence_output: true,
        }
    }

    /// Number of processes launched and not yet reaped or terminated.
    pub fn tracked(&self) -> usize {
        self.processes.len()
    }

    /// Whether the controller currently holds `handle` suspended.
    pub fn is_suspended(&self, handle: JobHandle) -> Option<bool> {
        self.processes.get(&handle).map(|p| p.suspended)
    }

    fn tracked_mut(&mut self, handle: JobHandle) -> Result<&mut TrackedProcess> {
        self.processes
            .get_mut(&handle)
            .ok_or(SchedError::UnknownHandle(handle.0))
    }
}

fn process_group(handle: JobHandle) -> Pid {
    Pid::from_raw(handle.0 as i32)
}

fn launch_error(command: &[String], reason: impl Into<String>) -> SchedError {
    SchedError::Launch {
        command: command.join(" "),
        reason: reason.into(),
    }
}

/// Deliver `signal` to the job's group. A group that no longer exists means
/// the job already finished; that is left for `poll_exit` to report.
fn signal_group(handle: JobHandle, signal: Signal) -> Result<()> {
    match killpg(process_group(handle), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            tracing::debug!(pid = handle.0, ?signal, "Process group already gone");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Block until the freshly spawned trampoline has stopped itself.
fn wait_until_stopped(pid: Pid) -> std::result::Result<WaitStatus, Errno> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

impl JobController for ProcessController {
    fn launch(&mut self, command: &[String]) -> Result<JobHandle> {
        if command.is_empty() {
            return Err(launch_error(command, "empty command"));
        }

        let mut std_cmd = std::process::Command::new("/bin/sh");
        std_cmd
            .arg("-c")
            .arg(SUSPEND_TRAMPOLINE)
            .arg(TRAMPOLINE_NAME)
            .args(command)
            .stdin(Stdio::null())
            .process_group(0);
        if self.silence_output {
            std_cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let mut cmd = Command::from(std_cmd);
        cmd.kill_on_drop(false);

        let child = cmd
            .spawn()
            .map_err(|e| launch_error(command, e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| launch_error(command, "process exited before it was tracked"))?;
        let handle = JobHandle(pid);

        match wait_until_stopped(process_group(handle)) {
            Ok(WaitStatus::Stopped(_, _)) => {}
            Ok(status) => {
                return Err(launch_error(
                    command,
                    format!("process ended before suspension: {:?}", status),
                ));
            }
            Err(errno) => {
                let _ = killpg(process_group(handle), Signal::SIGKILL);
                return Err(launch_error(command, errno.to_string()));
            }
        }

        tracing::debug!(pid, command = %command.join(" "), "Job process launched suspended");
        self.processes.insert(
            handle,
            TrackedProcess {
                child,
                suspended: true,
            },
        );
        Ok(handle)
    }

    fn resume(&mut self, handle: JobHandle) -> Result<()> {
        let tracked = self.tracked_mut(handle)?;
        if !tracked.suspended {
            return Ok(());
        }
        signal_group(handle, Signal::SIGCONT)?;
        tracked.suspended = false;
        Ok(())
    }

    fn pause(&mut self, handle: JobHandle) -> Result<()> {
        let tracked = self.tracked_mut(handle)?;
        if tracked.suspended {
            return Ok(());
        }
        signal_group(handle, Signal::SIGSTOP)?;
        tracked.suspended = true;
        Ok(())
    }

    fn poll_exit(&mut self, handle: JobHandle) -> Result<Option<ExitStatus>> {
        let tracked = self.tracked_mut(handle)?;
        match tracked.child.try_wait() {
            Ok(None) => Ok(None),
            Ok(Some(status)) => {
                self.processes.remove(&handle);
                Ok(Some(status.into()))
            }
            Err(e) => {
                self.processes.remove(&handle);
                Err(e.into())
            }
        }
    }

    fn terminate(&mut self, handle: JobHandle) -> Result<()> {
        let mut tracked = self
            .processes
            .remove(&handle)
            .ok_or(SchedError::UnknownHandle(handle.0))?;
        signal_group(handle, Signal::SIGKILL)?;
        // Reap now if the kill already landed; otherwise the runtime reaps it.
        let _ = tracked.child.try_wait();
        Ok(())
    }
}
