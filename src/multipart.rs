//! Streamed `multipart/form-data` bodies for file uploads.
//!
//! Files are never buffered whole. A producer future reads each file in
//! chunks and pushes the framed parts into a bounded pipe that the transport
//! drains while sending.

use std::{
    io,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use futures_channel::mpsc;
use futures_util::{AsyncReadExt, SinkExt};

use crate::{FileField, request::Body};

/// Chunks buffered between the producer and the transport.
const PIPE_CAPACITY: usize = 8;

/// Size of a single file read.
const CHUNK_SIZE: usize = 32 * 1024;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A fresh boundary string.
pub(crate) fn boundary() -> String {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_micros());
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("chainwave-{micros:x}{seq:04x}")
}

/// `Content-Type` header value for `boundary`.
pub(crate) fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn part_header(boundary: &str, file: &FileField) -> String {
    format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        escape_quotes(file.field_name()),
        escape_quotes(&file.effective_file_name()),
    )
}

fn closing(boundary: &str) -> String {
    format!("--{boundary}--\r\n")
}

/// Build a streamed body uploading `files`, framed with `boundary`.
pub(crate) fn stream(files: Vec<FileField>, boundary: String) -> Body {
    let (tx, rx) = mpsc::channel(PIPE_CAPACITY);
    Body::pipe(rx, Box::pin(produce(files, boundary, tx)))
}

async fn produce(
    files: Vec<FileField>,
    boundary: String,
    mut tx: mpsc::Sender<io::Result<Bytes>>,
) -> io::Result<()> {
    match write_parts(&files, &boundary, &mut tx).await {
        Ok(()) => Ok(()),
        // The transport stopped reading; it reports its own failure.
        Err(Failure::Closed) => Ok(()),
        Err(Failure::Io(err)) => {
            // Abort the reader so the transfer fails instead of sending a
            // truncated body.
            let _ = tx.try_send(Err(io::Error::new(err.kind(), err.to_string())));
            Err(err)
        }
    }
}

enum Failure {
    Closed,
    Io(io::Error),
}

impl From<io::Error> for Failure {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

async fn send(tx: &mut mpsc::Sender<io::Result<Bytes>>, chunk: Bytes) -> Result<(), Failure> {
    tx.send(Ok(chunk)).await.map_err(|_| Failure::Closed)
}

async fn write_parts(
    files: &[FileField],
    boundary: &str,
    tx: &mut mpsc::Sender<io::Result<Bytes>>,
) -> Result<(), Failure> {
    for file in files {
        send(tx, Bytes::from(part_header(boundary, file))).await?;

        let mut reader = async_fs::File::open(file.path()).await?;
        let mut buf = vec![0_u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            send(tx, Bytes::copy_from_slice(&buf[..n])).await?;
        }

        send(tx, Bytes::from_static(b"\r\n")).await?;
    }
    send(tx, Bytes::from(closing(boundary))).await
}
