use chrono::{DateTime, Utc};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedError};
use crate::ingest::{SubmitRequest, Submission};
use crate::process::{ExitStatus, JobController, JobHandle};
use crate::scheduler::history::{HistoryEntry, HistoryRecorder};
use crate::scheduler::job::Job;
use crate::scheduler::queue::ReadyQueue;
use crate::scheduler::timer::QuantumTimer;

/// Outcome of an accepted submission, reported back to the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub job_id: Uuid,
    pub handle: JobHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing is running and the timer is disarmed.
    Idle,
    /// Picking the next batch from the sorted queue.
    Dispatching,
    /// A batch is running and the quantum timer is armed.
    Running,
    /// The quantum expired; reaping finished jobs and preempting the rest.
    Reclaiming,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Dispatching => write!(f, "dispatching"),
            EngineState::Running => write!(f, "running"),
            EngineState::Reclaiming => write!(f, "reclaiming"),
        }
    }
}

/// Priority round-robin scheduler over a [`JobController`].
///
/// The engine owns the ready queue, the running batch and the history. All
/// of them are mutated from the single task that drives [`run`](Self::run),
/// one event at a time.
#[derive(Debug)]
pub struct SchedulerEngine<C: JobController> {
    config: SchedulerConfig,
    controller: C,
    queue: ReadyQueue,
    running: Vec<Job>,
    history: HistoryRecorder,
    state: EngineState,
    next_seq: u64,
    cycles: u64,
}

impl<C: JobController> SchedulerEngine<C> {
    pub fn new(config: SchedulerConfig, controller: C) -> Self {
        Self {
            queue: ReadyQueue::with_capacity(config.queue_capacity),
            config,
            controller,
            running: Vec::new(),
            history: HistoryRecorder::new(),
            state: EngineState::Idle,
            next_seq: 0,
            cycles: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn queue(&self) -> &ReadyQueue {
        &self.queue
    }

    /// Jobs of the current batch, in dispatch order.
    pub fn running(&self) -> &[Job] {
        &self.running
    }

    pub fn history(&self) -> &HistoryRecorder {
        &self.history
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Number of dispatch cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Jobs currently admitted: queued, preempted or running.
    pub fn admitted(&self) -> usize {
        self.queue.len() + self.running.len()
    }

    /// Launch a submission suspended and append it to the ready queue.
    ///
    /// Capacity is checked before launching, so a rejected submission never
    /// leaves a stray process behind.
    pub fn submit(&mut self, submission: Submission, now: DateTime<Utc>) -> Result<Admission> {
        if self.admitted() >= self.config.queue_capacity {
            return Err(SchedError::CapacityExceeded {
                capacity: self.config.queue_capacity,
            });
        }

        let handle = self.controller.launch(&submission.command)?;
        let job = Job::new(
            handle,
            submission.command,
            submission.priority,
            self.next_seq,
            now,
        );
        self.next_seq += 1;
        let admission = Admission {
            job_id: job.id,
            handle,
        };

        tracing::info!(
            job_id = %job.id,
            pid = handle.0,
            priority = job.priority,
            command = %job.command_line(),
            "Job queued"
        );
        if let Err(e) = self.queue.enqueue(job) {
            if let Err(kill_err) = self.controller.terminate(handle) {
                tracing::warn!(pid = handle.0, error = %kill_err, "Failed to discard rejected job");
            }
            return Err(e);
        }
        Ok(admission)
    }

    /// Sort the queue and start up to NCPU jobs.
    ///
    /// Jobs left behind in the queue are charged one quantum of wait time
    /// for this cycle. Returns the size of the running batch.
    pub fn dispatch(&mut self, now: DateTime<Utc>) -> usize {
        self.state = EngineState::Dispatching;
        let slots = self.config.ncpu.saturating_sub(self.running.len());

        for mut job in self.queue.dequeue_batch(slots) {
            job.dispatch(now);
            if let Err(e) = self.controller.resume(job.handle) {
                tracing::warn!(job_id = %job.id, pid = job.handle.0, error = %e, "Failed to resume job");
            }
            self.running.push(job);
        }
        self.queue.accrue_wait(self.config.tslice);
        self.cycles += 1;

        tracing::debug!(
            cycle = self.cycles,
            running = self.running.len(),
            queued = self.queue.len(),
            "Dispatched batch"
        );
        self.state = if self.running.is_empty() {
            EngineState::Idle
        } else {
            EngineState::Running
        };
        self.running.len()
    }

    /// Poll the running batch for exits that happened mid-quantum and stamp
    /// them with `now`. They are moved to history at the next reclaim.
    pub fn observe_exits(&mut self, now: DateTime<Utc>) -> usize {
        let mut observed = 0;
        for job in self.running.iter_mut().filter(|j| j.observed_exit.is_none()) {
            match self.controller.poll_exit(job.handle) {
                Ok(Some(status)) => {
                    job.observed_exit = Some((status, now));
                    observed += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Exit poll failed");
                    job.observed_exit = Some((ExitStatus::Unknown, now));
                    observed += 1;
                }
            }
        }
        observed
    }

    /// End of quantum: record finished jobs, pause and requeue the rest,
    /// in dispatch order.
    pub fn reclaim(&mut self, now: DateTime<Utc>) {
        self.state = EngineState::Reclaiming;

        for mut job in std::mem::take(&mut self.running) {
            let exit = match job.observed_exit.take() {
                Some(observed) => Some(observed),
                None => match self.controller.poll_exit(job.handle) {
                    Ok(status) => status.map(|s| (s, now)),
                    Err(e) => {
                        tracing::warn!(job_id = %job.id, error = %e, "Exit poll failed");
                        Some((ExitStatus::Unknown, now))
                    }
                },
            };

            match exit {
                Some((status, end_time)) => self.complete(job, status, end_time),
                None => {
                    if let Err(e) = self.controller.pause(job.handle) {
                        tracing::warn!(job_id = %job.id, error = %e, "Failed to pause job");
                    }
                    job.preempt();
                    self.queue.requeue(job);
                }
            }
        }

        self.state = if self.queue.is_empty() {
            EngineState::Idle
        } else {
            EngineState::Dispatching
        };
    }

    fn complete(&mut self, mut job: Job, status: ExitStatus, end_time: DateTime<Utc>) {
        job.complete(end_time);
        if status.is_success() {
            tracing::info!(job_id = %job.id, pid = job.handle.0, "Job completed");
        } else {
            tracing::warn!(job_id = %job.id, pid = job.handle.0, status = %status, "Job exited abnormally");
        }
        self.history.append(HistoryEntry::from_job(&job, status, end_time));
    }

    /// Kill jobs that are still suspended in the queue. Jobs running at this
    /// instant are left alone.
    pub fn shutdown(&mut self) {
        let suspended = self.queue.drain();
        for job in &suspended {
            if let Err(e) = self.controller.terminate(job.handle) {
                tracing::warn!(job_id = %job.id, error = %e, "Failed to terminate suspended job");
            }
        }
        tracing::info!(
            terminated = suspended.len(),
            left_running = self.running.len(),
            completed = self.history.len(),
            "Scheduler stopped"
        );
        self.state = EngineState::Idle;
    }

    pub fn into_history(self) -> HistoryRecorder {
        self.history
    }

    fn handle_request(&mut self, request: SubmitRequest) {
        let SubmitRequest {
            submission,
            response_tx,
        } = request;
        let result = self.submit(submission, Utc::now());
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Submission rejected");
        }
        let _ = response_tx.send(result);
    }

    /// Drive the dispatch cycle until `shutdown` is cancelled.
    ///
    /// Each loop iteration is one cycle: sort, dispatch, arm the quantum,
    /// wait for expiry while still admitting submissions, reclaim. An empty
    /// queue parks the loop until the next submission arrives.
    ///
    /// # Errors
    ///
    /// Fails only when the quantum timer cannot be armed, since preemption
    /// could no longer be guaranteed.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<SubmitRequest>,
        shutdown: CancellationToken,
    ) -> Result<HistoryRecorder> {
        let mut timer = QuantumTimer::new(self.config.tslice)?;
        let mut child_exits = match signal(SignalKind::child()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                tracing::warn!(error = %e, "SIGCHLD unavailable, exits are stamped at quantum end");
                None
            }
        };
        let mut accepting = true;

        tracing::info!(
            ncpu = self.config.ncpu,
            tslice_ms = self.config.tslice.as_millis() as u64,
            capacity = self.config.queue_capacity,
            "Scheduler started"
        );

        loop {
            if self.queue.is_empty() {
                self.state = EngineState::Idle;
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    request = requests.recv(), if accepting => match request {
                        Some(request) => self.handle_request(request),
                        None => {
                            tracing::warn!("Submission channel closed");
                            accepting = false;
                        }
                    },
                }
                continue;
            }

            self.dispatch(Utc::now());
            if let Err(e) = timer.arm() {
                self.shutdown();
                return Err(e);
            }

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        self.shutdown();
                        return Ok(self.into_history());
                    }
                    _ = timer.expired() => break,
                    Some(()) = child_exited(&mut child_exits) => {
                        self.observe_exits(Utc::now());
                    }
                    request = requests.recv(), if accepting => match request {
                        Some(request) => self.handle_request(request),
                        None => {
                            tracing::warn!("Submission channel closed");
                            accepting = false;
                        }
                    },
                }
            }

            self.reclaim(Utc::now());
        }

        self.shutdown();
        Ok(self.into_history())
    }
}

async fn child_exited(sig: &mut Option<Signal>) -> Option<()> {
    match sig {
        Some(sig) => sig.recv().await,
        None => std::future::pending().await,
    }
}
