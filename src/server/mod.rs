//! Connection acceptance
//!
//! The listener is the only place that calls `accept`. It takes an admission
//! permit before each accept, so at most `max_connections` connections are
//! handled at once and further clients wait in the listen backlog.

pub mod admission;
pub mod listener;

pub use admission::{Admission, AdmissionPermit, ConnectionId};
pub use listener::{ListenerError, Server};
