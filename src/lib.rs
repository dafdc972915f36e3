//! Docserve - minimal concurrent static file server
//!
//! Core library for request parsing, resource resolution and the
//! bounded-concurrency accept loop.

pub mod config;
pub mod http;
pub mod server;
pub mod static_files;
