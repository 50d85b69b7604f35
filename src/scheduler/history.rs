use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::process::{ExitStatus, JobHandle};
use crate::scheduler::job::Job;

const RULE: &str = "-------------------------------";

fn millis(d: &Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(millis(d))
}

fn as_opt_millis<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&millis(d)),
        None => s.serialize_none(),
    }
}

/// Record of one completed job. Written once, never modified.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub job_id: Uuid,
    pub pid: JobHandle,
    pub command: String,
    pub priority: u32,
    pub exit_status: ExitStatus,
    pub submitted_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(rename = "wait_time_ms", serialize_with = "as_millis")]
    pub wait_time: Duration,
}

impl HistoryEntry {
    pub fn from_job(job: &Job, exit_status: ExitStatus, end_time: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id,
            pid: job.handle,
            command: job.command_line(),
            priority: job.priority,
            exit_status,
            submitted_at: job.submitted_at,
            start_time: job.start_time.unwrap_or(end_time),
            end_time,
            wait_time: job.wait_time,
        }
    }

    /// Time from first dispatch to completion.
    pub fn turnaround(&self) -> Duration {
        (self.end_time - self.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Aggregate statistics over the history. Means are `None` when nothing
/// has completed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub completed: usize,
    #[serde(rename = "mean_turnaround_ms", serialize_with = "as_opt_millis")]
    pub mean_turnaround: Option<Duration>,
    #[serde(rename = "mean_wait_ms", serialize_with = "as_opt_millis")]
    pub mean_wait: Option<Duration>,
}

impl std::fmt::Display for HistorySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ms = |d: Option<Duration>| match d {
            Some(d) => format!("{} ms", d.as_millis()),
            None => "n/a".to_string(),
        };
        writeln!(f, "Completed jobs: {}", self.completed)?;
        writeln!(f, "Mean turnaround: {}", ms(self.mean_turnaround))?;
        write!(f, "Mean wait: {}", ms(self.mean_wait))
    }
}

fn mean(total: Duration, count: usize) -> Option<Duration> {
    if count == 0 {
        return None;
    }
    let nanos = total.as_nanos() / count as u128;
    Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
}

/// Append-only log of completed jobs.
#[derive(Debug, Default)]
pub struct HistoryRecorder {
    entries: Vec<HistoryEntry>,
}

impl HistoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> HistorySummary {
        let count = self.entries.len();
        let turnaround: Duration = self.entries.iter().map(HistoryEntry::turnaround).sum();
        let wait: Duration = self.entries.iter().map(|e| e.wait_time).sum();
        HistorySummary {
            completed: count,
            mean_turnaround: mean(turnaround, count),
            mean_wait: mean(wait, count),
        }
    }

    /// Human-readable dump of every entry followed by the summary.
    pub fn render(&self) -> String {
        let ts = |t: &DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut out = String::new();
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, " Command History:");
        let _ = writeln!(out, "{}", RULE);
        for entry in &self.entries {
            let _ = writeln!(out, "Command: {}", entry.command);
            let _ = writeln!(out, "PID: {}", entry.pid);
            let _ = writeln!(out, "Priority: {}", entry.priority);
            let _ = writeln!(out, "Exit: {}", entry.exit_status);
            let _ = writeln!(out, "Start_Time: {}", ts(&entry.start_time));
            let _ = writeln!(out, "End_Time: {}", ts(&entry.end_time));
            let _ = writeln!(out, "Wait_Time: {} ms", entry.wait_time.as_millis());
            let _ = writeln!(out, "{}", RULE);
        }
        let _ = writeln!(out, "{}", self.summary());
        out
    }
}
