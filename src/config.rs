use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SchedError};

/// Default ready queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default location of the submission socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/jobsched.sock";

/// Scheduling parameters, fixed for the lifetime of the scheduler process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of jobs running at the same time.
    pub ncpu: usize,
    /// Length of one quantum.
    pub tslice: Duration,
    /// Maximum number of admitted jobs (queued plus running).
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ncpu: 1,
            tslice: Duration::from_millis(100),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    /// Build a validated config from the two startup parameters.
    ///
    /// NCPU must be at least 1 and TSLICE must be a positive number of
    /// milliseconds.
    pub fn new(ncpu: u64, tslice_ms: u64) -> Result<Self> {
        if ncpu == 0 {
            return Err(SchedError::Configuration(
                "NCPU must be at least 1".to_string(),
            ));
        }
        if tslice_ms == 0 {
            return Err(SchedError::Configuration(
                "TSLICE must be greater than 0 ms".to_string(),
            ));
        }
        let ncpu = usize::try_from(ncpu)
            .map_err(|_| SchedError::Configuration(format!("NCPU {} is too large", ncpu)))?;

        Ok(Self {
            ncpu,
            tslice: Duration::from_millis(tslice_ms),
            ..Default::default()
        })
    }

    pub fn with_capacity(mut self, queue_capacity: usize) -> Result<Self> {
        if queue_capacity == 0 {
            return Err(SchedError::Configuration(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        self.queue_capacity = queue_capacity;
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub scheduler: SchedulerConfig,
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

impl ServerConfig {
    pub fn new(scheduler: SchedulerConfig) -> Self {
        Self {
            scheduler,
            ..Default::default()
        }
    }

    pub fn with_socket_path(mut self, socket_path: PathBuf) -> Self {
        self.socket_path = socket_path;
        self
    }
}
