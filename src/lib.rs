pub mod config;
pub mod error;
pub mod ingest;
pub mod process;
pub mod scheduler;
pub mod shutdown;
