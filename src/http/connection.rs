use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::http::parser::{parse_error_at_eof, parse_http_request, ParseError};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::static_files::{ResolveError, Resolver};

const READ_CHUNK: usize = 4096;

/// How long a rejected connection keeps reading after the response, so
/// unread request bytes do not turn the close into a reset.
const LINGER: Duration = Duration::from_millis(250);
const MAX_DISCARD: usize = 256 * 1024;

/// Drives one accepted connection from request to close.
///
/// The connection owns its stream. `run` consumes it, so a connection is
/// handled once and the stream is closed once, when `run` returns.
pub struct Connection<S> {
    stream: S,
    buffer: BytesMut,
    resolver: Arc<Resolver>,
    read_timeout: Duration,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter),
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, resolver: Arc<Resolver>, read_timeout: Duration) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            resolver,
            read_timeout,
            state: ConnectionState::Reading,
        }
    }

    /// Reads one request, answers it and closes the stream.
    ///
    /// A malformed request still gets the not-found response before the
    /// error is returned. Errors that mean the peer is gone (EOF, timeout,
    /// failed write) close the stream without a response.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut failure = None;

        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

            self.state = match state {
                ConnectionState::Reading => match self.read_request().await {
                    Ok(req) => ConnectionState::Processing(req),
                    Err(e) if answers_with_fallback(&e) => {
                        warn!(error = %e, "Rejecting malformed request");
                        let response = fallback_response(&self.resolver).await;
                        failure = Some(e);
                        ConnectionState::Writing(ResponseWriter::new(&response))
                    }
                    Err(e) => {
                        self.close().await;
                        return Err(e);
                    }
                },

                ConnectionState::Processing(req) => {
                    let response = respond(&self.resolver, &req).await;
                    ConnectionState::Writing(ResponseWriter::new(&response))
                }

                ConnectionState::Writing(mut writer) => {
                    let written = writer
                        .write_to_stream(&mut self.stream)
                        .await
                        .context("failed to write response");
                    if let Err(e) = written {
                        self.close().await;
                        return Err(e);
                    }
                    debug!(bytes = writer.bytes_written(), "Response sent");
                    ConnectionState::Closed
                }

                ConnectionState::Closed => break,
            };
        }

        self.close().await;

        match failure {
            Some(e) => {
                self.discard_input().await;
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Reads until a full request head is buffered, bounded by the read
    /// timeout.
    pub async fn read_request(&mut self) -> anyhow::Result<Request> {
        let read_timeout = self.read_timeout;

        match tokio::time::timeout(read_timeout, self.read_request_inner()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "timed out after {:?} waiting for request",
                read_timeout
            )),
        }
    }

    async fn read_request_inner(&mut self) -> anyhow::Result<Request> {
        loop {
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    // Anything past the blank line would be a body; this
                    // profile never has one.
                    self.buffer.advance(consumed);
                    log_request(&request);
                    return Ok(request);
                }

                Err(ParseError::Incomplete) => {}

                Err(e) => return Err(e.into()),
            }

            self.buffer.reserve(READ_CHUNK);
            let n = self.stream.read_buf(&mut self.buffer).await?;

            if n == 0 {
                return Err(parse_error_at_eof(&self.buffer).into());
            }
        }
    }

    /// Reads and drops what the peer is still sending, bounded by
    /// `LINGER` and `MAX_DISCARD`.
    async fn discard_input(&mut self) {
        self.buffer.clear();
        let mut discarded = 0usize;

        let drained = tokio::time::timeout(LINGER, async {
            while discarded < MAX_DISCARD {
                self.buffer.reserve(READ_CHUNK);
                match self.stream.read_buf(&mut self.buffer).await {
                    Ok(0) => break,
                    Ok(n) => {
                        discarded += n;
                        self.buffer.clear();
                    }
                    Err(e) => {
                        debug!(error = %e, "Read failed while discarding input");
                        break;
                    }
                }
            }
        })
        .await;

        debug!(discarded, timed_out = drained.is_err(), "Discarded unread input");
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "Shutdown after response failed");
        }
    }
}

/// Builds the response for a parsed request.
///
/// Every resolution failure is answered with the fallback resource.
pub async fn respond(resolver: &Resolver, req: &Request) -> Response {
    match resolver.resolve(req.resource_path()).await {
        Ok(resource) => {
            info!(
                status = 200,
                path = %resource.path.display(),
                content_type = resource.content_type,
                bytes = resource.body.len(),
                "Serving resource"
            );
            Response::ok(resource.content_type, resource.body)
        }

        Err(ResolveError::NotFound(path)) => {
            info!(status = 404, path = %path, "Resource not found");
            fallback_response(resolver).await
        }

        Err(e @ ResolveError::Traversal(_)) => {
            warn!(status = 404, error = %e, "Rejected path outside document root");
            fallback_response(resolver).await
        }

        Err(e @ ResolveError::Io { .. }) => {
            warn!(status = 404, error = ?e, "I/O error reading resource");
            fallback_response(resolver).await
        }
    }
}

async fn fallback_response(resolver: &Resolver) -> Response {
    let resource = resolver.not_found().await;
    Response::not_found(resource.content_type, resource.body)
}

/// Parse failures where the peer is still there to read an answer.
fn answers_with_fallback(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<ParseError>(),
        Some(ParseError::MalformedRequestLine | ParseError::HeadersTooLarge)
    )
}

fn log_request(req: &Request) {
    info!(method = %req.method, path = %req.path, "Request received");
    for header in &req.headers {
        debug!(header = %header, "Request header");
    }
}
