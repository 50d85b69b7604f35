use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SchedError};
use crate::ingest::message::{Reply, Submission};
use crate::ingest::SubmitRequest;

/// Accepts submissions on a Unix socket and forwards them to the engine.
pub struct SubmissionIngestor {
    path: PathBuf,
    listener: UnixListener,
    requests: mpsc::Sender<SubmitRequest>,
}

impl SubmissionIngestor {
    /// Bind the socket at `path`, replacing a stale socket file left by an
    /// earlier run.
    pub fn bind(path: impl AsRef<Path>, requests: mpsc::Sender<SubmitRequest>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale socket"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&path)?;
        tracing::info!(path = %path.display(), "Listening for submissions");
        Ok(Self {
            path,
            listener,
            requests,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve connections one at a time until `shutdown` is cancelled, then
    /// remove the socket file.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            let stream = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept submission connection");
                        continue;
                    }
                },
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.serve(stream) => {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Submission connection failed");
                    }
                }
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "Socket cleanup failed");
        }
    }

    async fn serve(&self, stream: UnixStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            let submission = match Submission::decode(&line) {
                Ok(submission) => submission,
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping malformed submission");
                    continue;
                }
            };

            let reply = self.forward(submission).await;
            writer
                .write_all(format!("{}\n", reply.encode()).as_bytes())
                .await?;
        }
        Ok(())
    }

    /// Hand one submission to the engine and wait for its verdict.
    async fn forward(&self, submission: Submission) -> Reply {
        let (response_tx, response_rx) = oneshot::channel();
        let request = SubmitRequest {
            submission,
            response_tx,
        };
        if self.requests.send(request).await.is_err() {
            return Reply::Rejected(SchedError::ChannelClosed.to_string());
        }

        match response_rx.await {
            Ok(Ok(admission)) => Reply::Accepted {
                job_id: admission.job_id,
                pid: admission.handle.0,
            },
            Ok(Err(e)) => Reply::Rejected(e.to_string()),
            Err(_) => Reply::Rejected(SchedError::ChannelClosed.to_string()),
        }
    }
}
