//! Client registry implementation
//!
//! A dense `Vec` of client entries. Removal shifts later entries down so the
//! relay order of the survivors never changes.

use tokio::net::UnixStream;

use super::entry::{ClientEntry, ClientId};
use super::error::RegistryError;

/// Default upper bound on simultaneously attached clients
pub const DEFAULT_MAX_CLIENTS: usize = 1024;

/// Ordered set of connected clients
///
/// Generic over the connection type so the relay loop can be exercised with
/// in-memory streams; the server itself uses [`UnixStream`].
#[derive(Debug)]
pub struct ClientRegistry<W = UnixStream> {
    clients: Vec<ClientEntry<W>>,
    capacity: usize,
    next_id: u64,
}

impl<W> ClientRegistry<W> {
    /// Create a registry with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CLIENTS)
    }

    /// Create a registry holding at most `capacity` clients
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            clients: Vec::new(),
            capacity,
            next_id: 1,
        }
    }

    /// Append a client
    ///
    /// When the registry is full the handle is dropped, which closes the
    /// connection, and `RegistryError::Full` is returned.
    pub fn add(&mut self, writer: W) -> Result<ClientId, RegistryError> {
        if self.clients.len() >= self.capacity {
            drop(writer);
            return Err(RegistryError::Full {
                capacity: self.capacity,
            });
        }

        let id = ClientId(self.next_id);
        self.next_id += 1;
        self.clients.push(ClientEntry::new(id, writer));

        tracing::debug!(client = %id, clients = self.clients.len(), "Client added");

        Ok(id)
    }

    /// Remove and close the client at `index`
    ///
    /// Later entries shift left by one. Returns `None` if `index` is out of range.
    pub fn remove_at(&mut self, index: usize) -> Option<ClientEntry<W>> {
        if index >= self.clients.len() {
            return None;
        }
        Some(self.clients.remove(index))
    }

    /// Number of attached clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is attached
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Whether another client can be admitted
    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.capacity
    }

    /// Maximum number of clients
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Client at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut ClientEntry<W>> {
        self.clients.get_mut(index)
    }

    /// Iterate clients in relay order
    pub fn iter(&self) -> impl Iterator<Item = &ClientEntry<W>> {
        self.clients.iter()
    }

    /// Identifiers in relay order
    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|c| c.id).collect()
    }

    /// Close every client, newest first
    pub fn close_all(&mut self) {
        while let Some(entry) = self.clients.pop() {
            tracing::debug!(client = %entry.id, "Client closed");
        }
    }
}

impl<W> Default for ClientRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}
