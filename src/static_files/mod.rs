//! Static file serving
//!
//! Maps request paths onto a document root and loads the bytes to send back,
//! including the fallback resource used for every failed lookup.

pub mod resolver;

pub use resolver::{ResolveError, Resolver, Resource};
