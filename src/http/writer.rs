use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";
const CRLF: &[u8] = b"\r\n";

/// Serializes a response into its wire form.
///
/// Status line, the `Content-type` header, the blank line ending the header
/// block, the body verbatim and a trailing line terminator. No
/// `Content-Length` is sent; the body ends when the connection closes.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(resp.body.len() + 64);

    let status_line = format!("{} {}\r\n", HTTP_VERSION, resp.status);
    buf.extend_from_slice(status_line.as_bytes());

    buf.extend_from_slice(b"Content-type: ");
    buf.extend_from_slice(resp.content_type.as_bytes());
    buf.extend_from_slice(CRLF);

    buf.extend_from_slice(CRLF);

    buf.extend_from_slice(&resp.body);
    buf.extend_from_slice(CRLF);

    buf
}

pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    /// Writes the whole response in a single pass, then flushes.
    ///
    /// A failed or zero-length write is surfaced to the caller; there is no
    /// retry.
    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }

    pub fn bytes_written(&self) -> usize {
        self.written
    }
}
