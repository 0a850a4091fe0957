//! Stdio transport.
//!
//! Two framings are accepted on the same stream: newline-delimited JSON (the
//! MCP stdio convention) and `Content-Length` header framing. Replies use the
//! framing of the request they answer.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::error::{RpcError, ServeError};
use crate::server::{McpServer, error_response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Line,
    ContentLength,
}

#[derive(Debug)]
pub enum Incoming {
    Message(Value, Framing),
    /// A message body that was not valid JSON. The stream stays usable.
    Malformed(String, Framing),
}

/// Reads requests until EOF, dispatching each on its own task so slow remote
/// queries do not hold up other calls. Returns once every in-flight call has
/// been answered.
pub async fn serve<R, W>(server: Arc<McpServer>, mut reader: R, writer: W) -> Result<(), ServeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<(Value, Framing)>();
    let writer_task = tokio::spawn(write_loop(writer, rx));
    let mut in_flight = JoinSet::new();

    let read_result = loop {
        let incoming = match read_message(&mut reader).await {
            Ok(Some(incoming)) => incoming,
            Ok(None) => break Ok(()),
            Err(e) => break Err(ServeError::Read(e)),
        };

        match incoming {
            Incoming::Message(message, framing) => {
                let server = Arc::clone(&server);
                let tx = tx.clone();
                in_flight.spawn(async move {
                    for response in server.handle_incoming_message(message).await {
                        // Receiver only disappears when the writer failed; that error wins.
                        let _ = tx.send((response, framing));
                    }
                });
            }
            Incoming::Malformed(reason, framing) => {
                tracing::warn!(%reason, "discarding malformed MCP message");
                let _ = tx.send((
                    error_response(Value::Null, RpcError::parse_error(reason)),
                    framing,
                ));
            }
        }

        // Reap finished calls so the set does not grow with the session.
        while let Some(joined) = in_flight.try_join_next() {
            joined?;
        }
    };

    while let Some(joined) = in_flight.join_next().await {
        joined?;
    }
    drop(tx);
    writer_task.await??;
    read_result
}

async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<(Value, Framing)>,
) -> Result<(), ServeError>
where
    W: AsyncWrite + Unpin,
{
    while let Some((response, framing)) = rx.recv().await {
        write_message(&mut writer, &response, framing)
            .await
            .map_err(ServeError::Write)?;
    }
    writer.shutdown().await.map_err(ServeError::Write)
}

pub async fn read_message<R>(reader: &mut R) -> Result<Option<Incoming>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut in_headers = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if !in_headers {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            if in_headers {
                break;
            }
            continue;
        }

        // Outside a header block, anything that is not `Name: value` is a
        // line-framed message, well-formed or not.
        if !in_headers && !looks_like_header(trimmed) {
            return Ok(Some(match serde_json::from_str(trimmed) {
                Ok(value) => Incoming::Message(value, Framing::Line),
                Err(e) => Incoming::Malformed(format!("Invalid JSON payload: {e}"), Framing::Line),
            }));
        }

        in_headers = true;
        if let Some((name, value)) = trimmed.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            let parsed = value.trim().parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(match serde_json::from_slice(&payload) {
        Ok(value) => Incoming::Message(value, Framing::ContentLength),
        Err(e) => Incoming::Malformed(
            format!("Invalid JSON payload: {e}"),
            Framing::ContentLength,
        ),
    }))
}

fn looks_like_header(line: &str) -> bool {
    line.split_once(':').is_some_and(|(name, _)| {
        !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

pub async fn write_message<W>(
    writer: &mut W,
    value: &Value,
    framing: Framing,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await
}
