//! Line-delimited JSON-RPC transport.
//!
//! Handles low-level I/O for the server side of the protocol:
//! - Reading one frame (one line) at a time from the input stream
//! - Writing one JSON object per line to the output stream
//! - Serializing writes so frames never interleave

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::errors::SessionError;
use super::types::JsonRpcResponse;

// ─── Transport ───────────────────────────────────────────────────────────────

/// Bi-directional line transport over any async reader/writer pair.
///
/// The process uses stdin/stdout; tests use in-memory buffers.
pub struct LineTransport<R, W> {
    reader: BufReader<R>,
    writer: Mutex<W>,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Mutex::new(writer),
        }
    }

    /// Read the next non-blank frame.
    ///
    /// Returns `Ok(None)` at end-of-stream. Invalid UTF-8 or an I/O failure
    /// is a framing error and ends the session.
    pub async fn read_frame(&mut self) -> Result<Option<String>, SessionError> {
        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line_buf)
                .await
                .map_err(SessionError::Read)?;

            if bytes_read == 0 {
                return Ok(None);
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }

    /// Encode and write one response frame, then flush.
    pub async fn write_response(&self, response: &JsonRpcResponse) -> Result<(), SessionError> {
        let mut json = serde_json::to_string(response)?;
        json.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(SessionError::Write)?;
        writer.flush().await.map_err(SessionError::Write)?;
        Ok(())
    }

    /// Flush and release the output stream.
    pub async fn close(&self) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        writer.flush().await.map_err(SessionError::Write)
    }

    /// Consume the transport and hand back the writer.
    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_frames_skips_blank_lines() {
        let input: &[u8] = b"\n{\"a\":1}\n   \n{\"b\":2}\r\n";
        let mut transport = LineTransport::new(input, Vec::new());

        assert_eq!(transport.read_frame().await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(transport.read_frame().await.unwrap().as_deref(), Some("{\"b\":2}"));
        assert!(transport.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let input: &[u8] = b"{\"a\":1}";
        let mut transport = LineTransport::new(input, Vec::new());
        assert_eq!(transport.read_frame().await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(transport.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_read_error() {
        let input: &[u8] = b"\xff\xfe\n";
        let mut transport = LineTransport::new(input, Vec::new());
        let err = transport.read_frame().await.unwrap_err();
        assert!(matches!(err, SessionError::Read(_)));
    }

    #[tokio::test]
    async fn test_write_response_is_one_line() {
        let transport = LineTransport::new(&b""[..], Vec::new());
        transport
            .write_response(&JsonRpcResponse::success(Some(json!(1)), json!({"ok": true})))
            .await
            .unwrap();
        transport
            .write_response(&JsonRpcResponse::success(Some(json!(2)), json!({})))
            .await
            .unwrap();

        let out = String::from_utf8(transport.into_writer()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#);
        assert!(out.ends_with('\n'));
    }
}
