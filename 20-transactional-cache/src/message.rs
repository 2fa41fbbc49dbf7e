//! Newline-delimited JSON framing for store calls.
//!
//! A connection carries strictly alternating `Request` / `Response` lines.

use std::io;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CacheError;
use crate::item::{CacheItem, LogEntry};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    Get { key: String },
    Set { item: CacheItem },
    Unset { key: String },
    GetCount { value: String },
    ExecuteLog { entries: Vec<LogEntry> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Item { item: CacheItem },
    Ack { ok: bool },
    Count { count: u64 },
    Error { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Invalid,
}

impl Response {
    /// Encodes a store failure for the wire.
    pub fn from_error(err: &CacheError) -> Self {
        match err {
            CacheError::NotFound(key) => Response::Error {
                kind: ErrorKind::NotFound,
                message: key.clone(),
            },
            other => Response::Error {
                kind: ErrorKind::Invalid,
                message: other.to_string(),
            },
        }
    }

    /// Decodes an `Error` response back into the failure it carries.
    pub fn into_error(kind: ErrorKind, message: String) -> CacheError {
        match kind {
            ErrorKind::NotFound => CacheError::NotFound(message),
            ErrorKind::Invalid => CacheError::Remote(message),
        }
    }
}

/// Reads the next message, or `None` once the peer has closed the stream.
///
/// Blank lines between messages are ignored and a trailing `\r` is accepted.
/// A final message without a newline before EOF still counts.
pub async fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if let Some(message) = decode_line(&line)? {
            return Ok(Some(message));
        }
    }
}

/// Writes `message` as one JSON line and flushes it.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    writer.write_all(&encode_line(message)?).await?;
    writer.flush().await
}

fn decode_line<T: DeserializeOwned>(line: &str) -> io::Result<Option<T>> {
    let payload = line.trim_end_matches(LINE_ENDINGS);
    if payload.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(payload).map(Some).map_err(invalid_data)
}

fn encode_line<T: Serialize>(message: &T) -> io::Result<Vec<u8>> {
    let mut encoded = serde_json::to_vec(message).map_err(invalid_data)?;
    encoded.push(b'\n');
    Ok(encoded)
}

fn invalid_data(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
