//! HTTP protocol implementation.
//!
//! Just enough of HTTP/1.x to serve files: one request line, a header block,
//! one response, then close. There is no keep-alive and no request body.
//!
//! # Architecture
//!
//! - **`connection`**: drives one connection through read, respond, write, close
//! - **`parser`**: parses the request line and header block from a byte buffer
//! - **`request`**: the parsed request
//! - **`response`**: status codes and the response value
//! - **`writer`**: serializes and writes responses to the client
//! - **`mime`**: content type detection based on file extensions
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for request line and headers
//!        └──────┬──────┘
//!               │ Request parsed (or malformed: fallback response)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Resolve the resource
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ▼
//!             Closed
//! ```

pub mod request;
pub mod response;
pub mod parser;
pub mod connection;
pub mod writer;
pub mod mime;
