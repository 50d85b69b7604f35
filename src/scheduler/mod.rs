pub mod engine;
pub mod history;
pub mod job;
pub mod queue;
pub mod timer;

pub use engine::{Admission, EngineState, SchedulerEngine};
pub use history::{HistoryEntry, HistoryRecorder, HistorySummary};
pub use job::{Job, JobState, MAX_PRIORITY, MIN_PRIORITY};
pub use queue::ReadyQueue;
pub use timer::QuantumTimer;
