use crate::http::request::Request;

/// Upper bound on the request line plus header block.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The stream ended before a full request line arrived
    #[error("connection closed before a request line was received")]
    MissingRequestLine,
    /// The request line has fewer than two whitespace separated tokens
    #[error("malformed request line")]
    MalformedRequestLine,
    /// The stream ended before the blank line closing the header block
    #[error("connection closed before the end of the header block")]
    UnterminatedHeaders,
    #[error("request head exceeds {} bytes", MAX_HEAD_SIZE)]
    HeadersTooLarge,
    /// More bytes are needed; never returned once the stream is at EOF
    #[error("incomplete request")]
    Incomplete,
}

/// Parses a request line and its header block from the start of `buf`.
///
/// Lines end with `\n`, optionally preceded by `\r`. On success returns the
/// request and the number of bytes consumed, which is the offset of the body
/// boundary right after the blank line.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let mut lines = Lines { buf, pos: 0 };

    let request_line = match lines.next_line() {
        Some(line) => line,
        None => return Err(incomplete(buf)),
    };

    let request_line = std::str::from_utf8(request_line)
        .map_err(|_| ParseError::MalformedRequestLine)?;
    let mut parts = request_line.split_whitespace();

    let method = parts.next().ok_or(ParseError::MalformedRequestLine)?;
    let path = parts.next().ok_or(ParseError::MalformedRequestLine)?;

    let mut headers = Vec::new();

    loop {
        let line = match lines.next_line() {
            Some(line) => line,
            None => return Err(incomplete(buf)),
        };

        if line.is_empty() {
            break;
        }

        headers.push(String::from_utf8_lossy(line).into_owned());
    }

    let request = Request {
        method: method.to_string(),
        path: path.to_string(),
        headers,
    };

    Ok((request, lines.pos))
}

/// Classifies a buffer that could not be parsed before the peer closed the
/// stream.
pub fn parse_error_at_eof(buf: &[u8]) -> ParseError {
    match parse_http_request(buf) {
        Err(ParseError::Incomplete) => {
            if buf.contains(&b'\n') {
                ParseError::UnterminatedHeaders
            } else {
                ParseError::MissingRequestLine
            }
        }
        Err(e) => e,
        // Unreachable for callers that parse before reading more, kept total
        Ok(_) => ParseError::UnterminatedHeaders,
    }
}

fn incomplete(buf: &[u8]) -> ParseError {
    if buf.len() > MAX_HEAD_SIZE {
        ParseError::HeadersTooLarge
    } else {
        ParseError::Incomplete
    }
}

struct Lines<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Lines<'a> {
    /// Returns the next complete line without its terminator.
    fn next_line(&mut self) -> Option<&'a [u8]> {
        let rest = &self.buf[self.pos..];
        let newline = rest.iter().position(|&b| b == b'\n')?;
        self.pos += newline + 1;

        let line = &rest[..newline];
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }
}
