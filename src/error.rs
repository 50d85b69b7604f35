use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Ready queue is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("Failed to launch `{command}`: {reason}")]
    Launch { command: String, reason: String },

    #[error("Malformed submission: {0}")]
    Decode(String),

    #[error("No process for handle {0}")]
    UnknownHandle(u32),

    #[error("Signal delivery failed: {0}")]
    Signal(#[from] nix::errno::Errno),

    #[error("Quantum timer error: {0}")]
    Timer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scheduler is no longer accepting submissions")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, SchedError>;
