use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::http::connection::Connection;
use crate::server::admission::{Admission, AdmissionClosed, AdmissionPermit};
use crate::static_files::Resolver;

/// Consecutive accept failures after which the listener is considered dead.
pub const MAX_CONSECUTIVE_ACCEPT_FAILURES: u32 = 32;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);
const EXHAUSTED_BACKOFF: Duration = Duration::from_millis(100);

// Same values on Linux and the BSDs.
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;

/// What a failed `accept` says about the listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptFailure {
    /// The pending connection failed before it was handed over; the
    /// listener is fine.
    Connection,
    /// Out of descriptors or memory; clears once connections close.
    Exhausted,
    /// Anything else points at the listening socket itself.
    Listener,
}

impl AcceptFailure {
    pub fn classify(e: &std::io::Error) -> Self {
        if matches!(e.raw_os_error(), Some(ENFILE | EMFILE)) {
            return AcceptFailure::Exhausted;
        }

        match e.kind() {
            ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut => AcceptFailure::Connection,
            ErrorKind::OutOfMemory => AcceptFailure::Exhausted,
            _ => AcceptFailure::Listener,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("listener unusable after {failures} consecutive accept failures: {source}")]
    Accept {
        failures: u32,
        source: std::io::Error,
    },
    #[error(transparent)]
    Closed(#[from] AdmissionClosed),
}

pub struct Server {
    listener: TcpListener,
    admission: Admission,
    resolver: Arc<Resolver>,
    read_timeout: Duration,
    shutdown_grace: Duration,
}

impl Server {
    pub async fn bind(cfg: &Config) -> Result<Self, ListenerError> {
        let addr = &cfg.server.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let resolver = Resolver::new(&cfg.static_files);

        info!(
            address = %listener.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| addr.clone()),
            max_connections = cfg.server.max_connections,
            root = %resolver.root().display(),
            "Listening"
        );

        Ok(Self {
            listener,
            admission: Admission::new(cfg.server.max_connections),
            resolver: Arc::new(resolver),
            read_timeout: cfg.server.read_timeout(),
            shutdown_grace: cfg.server.shutdown_grace(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shares the admission state, mainly to observe how many connections
    /// are in flight.
    pub fn admission(&self) -> Admission {
        self.admission.clone()
    }

    /// Serves forever; returns only if the listener becomes unusable.
    pub async fn run(self) -> Result<(), ListenerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, the listener becomes unusable or the
    /// admission state is closed. Then closes admission and waits up to the
    /// shutdown grace period for in-flight connections.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ListenerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut failures = 0u32;

        let result = loop {
            // Slot first, then accept: over capacity, clients queue in the
            // backlog instead of being accepted and left unserved.
            let permit = tokio::select! {
                _ = &mut shutdown => break Ok(()),
                permit = self.admission.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(e) => break Err(e.into()),
                },
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => break Ok(()),
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    failures = 0;
                    self.dispatch(stream, peer, permit);
                }
                Err(e) => {
                    drop(permit);

                    match AcceptFailure::classify(&e) {
                        AcceptFailure::Connection => {
                            debug!(error = %e, "Connection failed before accept completed");
                        }
                        AcceptFailure::Exhausted => {
                            warn!(error = %e, "Out of resources accepting connection, backing off");
                            tokio::time::sleep(EXHAUSTED_BACKOFF).await;
                        }
                        AcceptFailure::Listener => {
                            failures += 1;
                            warn!(error = %e, failures, "Failed to accept connection");

                            if failures >= MAX_CONSECUTIVE_ACCEPT_FAILURES {
                                error!(error = %e, "Listener unusable, shutting down");
                                break Err(ListenerError::Accept { failures, source: e });
                            }

                            tokio::time::sleep((ACCEPT_BACKOFF * failures).min(MAX_ACCEPT_BACKOFF))
                                .await;
                        }
                    }
                }
            }
        };

        info!("No longer accepting connections");
        self.admission.close();
        self.drain().await;
        result
    }

    /// Hands an accepted connection to its own task. The permit moves into
    /// the task and is dropped when the task ends, however it ends.
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr, mut permit: AdmissionPermit) {
        permit.admit();
        let span = info_span!("conn", id = %permit.id(), peer = %peer);
        let conn = Connection::new(stream, Arc::clone(&self.resolver), self.read_timeout);

        info!(
            parent: &span,
            in_flight = self.admission.in_flight(),
            "Accepted connection"
        );

        tokio::spawn(
            async move {
                let _permit = permit;
                match conn.run().await {
                    Ok(()) => info!("Connection closed"),
                    Err(e) => warn!(error = %e, "Connection closed with error"),
                }
            }
            .instrument(span),
        );
    }

    async fn drain(&self) {
        let in_flight = self.admission.in_flight();
        if in_flight == 0 {
            return;
        }

        info!(in_flight, "Waiting for in-flight connections");
        if !self.admission.wait_idle(self.shutdown_grace).await {
            warn!(
                in_flight = self.admission.in_flight(),
                "Shutdown grace period elapsed with connections still open"
            );
        }
    }
}
