use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::Result;
use crate::ingest::message::{Reply, Submission};

/// Send one submission to the scheduler at `socket_path`.
///
/// Returns `None` when the scheduler closed the connection without a reply.
pub async fn submit(socket_path: &Path, submission: &Submission) -> Result<Option<Reply>> {
    let mut stream = UnixStream::connect(socket_path).await?;
    stream
        .write_all(format!("{}\n", submission.encode()).as_bytes())
        .await?;
    stream.shutdown().await?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response.lines().next().and_then(Reply::parse))
}
