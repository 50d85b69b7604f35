use std::collections::VecDeque;
use std::time::Duration;

use crate::config::DEFAULT_QUEUE_CAPACITY;
use crate::error::{Result, SchedError};
use crate::scheduler::job::Job;

/// Bounded ready queue of jobs waiting for a CPU slot.
///
/// Jobs are appended at the rear and taken from the front after a priority
/// sort, so round robin within a priority level falls out of the rear
/// requeue of preempted jobs.
#[derive(Debug)]
pub struct ReadyQueue {
    jobs: VecDeque<Job>,
    capacity: usize,
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a newly admitted job at the rear.
    pub fn enqueue(&mut self, job: Job) -> Result<()> {
        if self.is_full() {
            return Err(SchedError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.jobs.push_back(job);
        Ok(())
    }

    /// Return a preempted job to the rear. It was admitted before, so the
    /// capacity check does not apply again.
    pub fn requeue(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    /// Stable sort by ascending priority.
    ///
    /// Equal priorities keep their queue order: arrival order for jobs that
    /// never ran, behind them for jobs requeued after preemption.
    pub fn sort(&mut self) {
        self.jobs.make_contiguous().sort_by_key(|job| job.priority);
    }

    /// Sort, then remove up to `k` jobs from the front.
    pub fn dequeue_batch(&mut self, k: usize) -> Vec<Job> {
        self.sort();
        let take = k.min(self.jobs.len());
        self.jobs.drain(..take).collect()
    }

    /// Charge one quantum of waiting to every job still in the queue.
    pub fn accrue_wait(&mut self, quantum: Duration) {
        for job in self.jobs.iter_mut() {
            job.accrue_wait(quantum);
        }
    }

    /// Remove every job, front to rear.
    pub fn drain(&mut self) -> Vec<Job> {
        self.jobs.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn front(&self) -> Option<&Job> {
        self.jobs.front()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
