//! Submission channel between front-ends and the scheduler.
//!
//! Front-ends connect to a well-known Unix socket and write lines of the form
//! `submit <command...> [priority]`. The [`SubmissionIngestor`] decodes each
//! line and forwards it to the engine as a [`SubmitRequest`]; the request
//! itself wakes an idle engine. Lines are handled strictly one after another.

pub mod client;
pub mod listener;
pub mod message;

use tokio::sync::oneshot;

use crate::error::Result;
use crate::scheduler::engine::Admission;

pub use listener::SubmissionIngestor;
pub use message::Submission;

/// A decoded submission waiting for the engine, with the channel the
/// outcome is reported on.
#[derive(Debug)]
pub struct SubmitRequest {
    pub submission: Submission,
    pub response_tx: oneshot::Sender<Result<Admission>>,
}
