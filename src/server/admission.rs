//! Admission control for concurrently handled connections.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

const IDLE_POLL: Duration = Duration::from_millis(10);

/// Relaxed ordering is enough, ids only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an admitted connection, used in log spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("admission closed")]
pub struct AdmissionClosed;

/// Bounded count of in-flight connections.
///
/// A slot is taken when a permit is acquired, which the acceptor does before
/// calling `accept`. The connection only counts as in flight once the permit
/// is admitted, so a slot reserved for the next accept is not reported.
/// Cloning shares the same slots.
#[derive(Debug, Clone)]
pub struct Admission {
    slots: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    max: usize,
}

impl Admission {
    pub fn new(max: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max)),
            active: Arc::new(AtomicUsize::new(0)),
            max,
        }
    }

    /// Waits for a free slot.
    ///
    /// The slot stays taken until the returned permit is dropped.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AdmissionClosed> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AdmissionClosed)?;

        Ok(self.permit(permit))
    }

    /// Takes a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        let permit = self.slots.clone().try_acquire_owned().ok()?;
        Some(self.permit(permit))
    }

    fn permit(&self, permit: OwnedSemaphorePermit) -> AdmissionPermit {
        AdmissionPermit {
            _permit: permit,
            id: ConnectionId::new(),
            active: Arc::clone(&self.active),
            admitted: false,
        }
    }

    /// Number of admitted connections currently being handled.
    pub fn in_flight(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Stops handing out slots. Pending and later `acquire` calls fail with
    /// `AdmissionClosed`; permits already held stay valid.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    /// Waits until no admitted connection is left, up to `grace`.
    ///
    /// Returns `false` if connections were still in flight when time ran out.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let idle = async {
            while self.in_flight() > 0 {
                tokio::time::sleep(IDLE_POLL).await;
            }
        };
        tokio::time::timeout(grace, idle).await.is_ok()
    }
}

/// A held connection slot. Dropping it releases the slot, including when the
/// task holding it panics.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    id: ConnectionId,
    active: Arc<AtomicUsize>,
    admitted: bool,
}

impl AdmissionPermit {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Binds the slot to an accepted connection.
    pub fn admit(&mut self) {
        if !self.admitted {
            self.admitted = true;
            self.active.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if self.admitted {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::trace!(connection_id = %self.id, "Connection slot released");
        }
    }
}
