use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::process::{ExitStatus, JobHandle};

/// Most urgent priority. Lower values are scheduled sooner.
pub const MIN_PRIORITY: u32 = 1;
/// Least urgent priority.
pub const MAX_PRIORITY: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Queued,
    Running,
    Preempted,
    Completed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Preempted => write!(f, "preempted"),
            JobState::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub handle: JobHandle,
    pub command: Vec<String>,
    pub priority: u32,
    /// Admission order. Equal priorities run in this order until preempted.
    pub arrival_seq: u64,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    /// Set on the first dispatch and never moved afterwards.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub wait_time: Duration,
    pub dispatches: u32,
    /// Exit noticed while the quantum was still running.
    pub observed_exit: Option<(ExitStatus, DateTime<Utc>)>,
}

impl Job {
    pub fn new(
        handle: JobHandle,
        command: Vec<String>,
        priority: u32,
        arrival_seq: u64,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            handle,
            command,
            priority,
            arrival_seq,
            state: JobState::Queued,
            submitted_at,
            start_time: None,
            end_time: None,
            wait_time: Duration::ZERO,
            dispatches: 0,
            observed_exit: None,
        }
    }

    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Mark the job Running for a new quantum.
    pub fn dispatch(&mut self, now: DateTime<Utc>) {
        if self.start_time.is_none() {
            self.start_time = Some(now);
        }
        self.state = JobState::Running;
        self.dispatches += 1;
    }

    /// Mark the job Preempted after its quantum ran out.
    pub fn preempt(&mut self) {
        self.state = JobState::Preempted;
    }

    pub fn complete(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.state = JobState::Completed;
    }

    /// Charge one quantum spent waiting in the ready queue.
    pub fn accrue_wait(&mut self, quantum: Duration) {
        self.wait_time += quantum;
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.state, JobState::Queued | JobState::Preempted)
    }
}
