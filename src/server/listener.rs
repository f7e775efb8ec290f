//! Rendezvous endpoint and connection acceptor
//!
//! The acceptor waits on the endpoint only while no client is attached.
//! Once clients exist it takes whatever connections are already pending and
//! returns without waiting, so the relay loop is never held up by accept.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use futures::FutureExt;
use tokio::net::{UnixListener, UnixStream};

use crate::error::Result;
use crate::registry::ClientRegistry;

/// Named local listening socket clients connect to
#[derive(Debug)]
pub struct RendezvousEndpoint {
    listener: UnixListener,
    path: PathBuf,
    removed: bool,
}

impl RendezvousEndpoint {
    /// Bind at `path`, replacing any stale socket file
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(path: impl AsRef<Path>, world_writable: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        remove_if_present(&path)?;

        let listener = UnixListener::bind(&path)?;
        if world_writable {
            fs::set_permissions(&path, fs::Permissions::from_mode(0o777))?;
        }

        tracing::debug!(socket = %path.display(), world_writable, "Rendezvous endpoint bound");

        Ok(Self {
            listener,
            path,
            removed: false,
        })
    }

    /// Socket path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next connection
    pub async fn accept(&self) -> io::Result<UnixStream> {
        self.listener.accept().await.map(|(stream, _)| stream)
    }

    /// Take a connection only if one is already pending
    pub fn try_accept(&self) -> io::Result<Option<UnixStream>> {
        match self.listener.accept().now_or_never() {
            Some(Ok((stream, _))) => Ok(Some(stream)),
            Some(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Remove the socket file (idempotent)
    pub fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;

        if let Err(e) = remove_if_present(&self.path) {
            tracing::warn!(socket = %self.path.display(), error = %e, "Failed to remove socket file");
        }
    }
}

impl Drop for RendezvousEndpoint {
    fn drop(&mut self) {
        self.remove();
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Connections handled by one [`ConnectionAcceptor::admit`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmitReport {
    /// Added to the registry
    pub admitted: usize,
    /// Closed because the registry was full
    pub rejected: usize,
}

/// Admits pending connections into the client registry
#[derive(Debug, Default)]
pub struct ConnectionAcceptor;

impl ConnectionAcceptor {
    /// Create an acceptor
    pub fn new() -> Self {
        Self
    }

    /// Admit new clients
    ///
    /// With an empty registry this waits for the first connection. It then
    /// drains every connection that is immediately available and returns.
    pub async fn admit(
        &self,
        endpoint: &RendezvousEndpoint,
        clients: &mut ClientRegistry<UnixStream>,
    ) -> Result<AdmitReport> {
        let mut report = AdmitReport::default();

        if clients.is_empty() {
            tracing::info!(socket = %endpoint.path().display(), "No clients, waiting for a connection");
            let stream = loop {
                match endpoint.accept().await {
                    Ok(stream) => break stream,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            };
            self.register(stream, clients, &mut report);
        }

        loop {
            match endpoint.try_accept() {
                Ok(Some(stream)) => self.register(stream, clients, &mut report),
                Ok(None) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(report)
    }

    fn register(
        &self,
        stream: UnixStream,
        clients: &mut ClientRegistry<UnixStream>,
        report: &mut AdmitReport,
    ) {
        let before = clients.len();
        match clients.add(stream) {
            Ok(id) => {
                report.admitted += 1;
                tracing::info!(client = %id, clients = before + 1, "Client connected");
            }
            Err(e) => {
                report.rejected += 1;
                tracing::warn!(clients = before, error = %e, "Connection refused");
            }
        }
    }
}
