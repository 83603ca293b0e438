//! Transport layer for judge ↔ agent communication.
//!
//! Both directions carry exactly one JSON object per TCP connection: the
//! writer sends the object and closes, the reader decodes the first
//! complete value. No length prefix is used, so the reader parses
//! incrementally and stops as soon as a full object has arrived.

pub mod control;
pub mod protocol;

pub use control::ControlClient;
pub use protocol::{CommandRequest, CompletionRecord, Mode};

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum message size (1 MB). Safety valve against malformed peers.
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Write one JSON message and half-close the writer.
pub async fn send_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize + Sync,
{
    let payload = serde_json::to_vec(message)?;
    anyhow::ensure!(
        payload.len() <= MAX_MESSAGE_SIZE,
        "Message exceeds max size: {} > {MAX_MESSAGE_SIZE}",
        payload.len()
    );

    writer.write_all(&payload).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

/// Read one JSON message.
///
/// Returns as soon as the first complete value decodes; trailing bytes are
/// ignored. Enforces `MAX_MESSAGE_SIZE`.
pub async fn recv_message<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            anyhow::ensure!(!buf.is_empty(), "Connection closed before any message");
        } else {
            buf.extend_from_slice(&chunk[..n]);
            anyhow::ensure!(
                buf.len() <= MAX_MESSAGE_SIZE,
                "Message exceeds max size: {} > {MAX_MESSAGE_SIZE}",
                buf.len()
            );
        }

        match serde_json::Deserializer::from_slice(&buf).into_iter::<T>().next() {
            Some(Ok(message)) => return Ok(message),
            Some(Err(e)) if e.is_eof() && n > 0 => {}
            Some(Err(e)) => return Err(e.into()),
            None if n > 0 => {}
            None => anyhow::bail!("Connection closed before a complete message"),
        }
    }
}
