//! Wire types and framing for the status beacon.

use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::scope::ScopeIdentity;

/// Longest accepted frame, newline included
pub const MAX_FRAME_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BeaconRequest {
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BeaconResponse {
    Pong(BeaconStatus),
    Error { message: String },
}

/// Identity of a running installer, as reported by its beacon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconStatus {
    pub scope: ScopeIdentity,
    pub pid: u32,
    /// Fresh per beacon start; ties published info to this run
    pub session: Uuid,
    pub started_at: DateTime<Utc>,
}

/// Read one newline-terminated frame; `None` on clean EOF.
pub(crate) async fn read_frame<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = (&mut *reader)
        .take(MAX_FRAME_BYTES)
        .read_line(&mut line)
        .await?;

    if read == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') && read as u64 >= MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame exceeds {MAX_FRAME_BYTES} bytes"),
        ));
    }

    Ok(Some(line))
}

pub(crate) async fn write_frame<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut body = serde_json::to_vec(message)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    body.push(b'\n');
    writer.write_all(&body).await?;
    writer.flush().await
}
