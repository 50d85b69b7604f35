use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Result, SchedError};

/// One-shot quantum timer.
///
/// `arm` starts a single countdown of one quantum; `expired` resolves once
/// when it runs out and leaves the timer disarmed. Nothing repeats on its
/// own, and awaiting a disarmed timer never resolves.
#[derive(Debug)]
pub struct QuantumTimer {
    quantum: Duration,
    deadline: Option<Instant>,
}

impl QuantumTimer {
    pub fn new(quantum: Duration) -> Result<Self> {
        if quantum.is_zero() {
            return Err(SchedError::Timer("quantum must be non-zero".to_string()));
        }
        Ok(Self {
            quantum,
            deadline: None,
        })
    }

    pub fn quantum(&self) -> Duration {
        self.quantum
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn arm(&mut self) -> Result<()> {
        if self.deadline.is_some() {
            return Err(SchedError::Timer(
                "timer armed while a quantum is still running".to_string(),
            ));
        }
        let deadline = Instant::now()
            .checked_add(self.quantum)
            .ok_or_else(|| SchedError::Timer("quantum deadline overflows".to_string()))?;
        self.deadline = Some(deadline);
        Ok(())
    }

    /// Wait for the armed quantum to run out.
    ///
    /// Cancel safe: dropping the future keeps the deadline, so a later call
    /// waits for the same expiry.
    pub async fn expired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
