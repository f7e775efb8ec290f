//! Relay buffer sizing
//!
//! The buffer is sized once, from the first producer that is opened: the
//! larger of the memory page size and the block size the producer's pipe
//! reports. Every later read and write uses exactly that size.

use std::fs::File;
use std::io;
use std::os::fd::AsFd;
use std::os::unix::fs::MetadataExt;

use bytes::BytesMut;
use nix::unistd::{sysconf, SysconfVar};

use crate::error::{Error, Result};

/// Fixed-size byte buffer shared by every relay round
#[derive(Debug)]
pub struct RelayBuffer {
    data: BytesMut,
}

impl RelayBuffer {
    /// Allocate a buffer of exactly `size` bytes
    pub fn with_size(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("relay buffer size must be non-zero".into()));
        }
        Ok(Self {
            data: BytesMut::zeroed(size),
        })
    }

    /// Size the buffer for a producer stream
    pub fn for_source<F: AsFd>(source: &F) -> Result<Self> {
        let size = page_size()?.max(block_size(source)?);
        tracing::debug!(bufsz = size, "Relay buffer sized");
        Self::with_size(size)
    }

    /// Buffer length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer has no capacity; never true after construction
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Contents of the last read
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Destination for the next read
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Memory page size
pub fn page_size() -> io::Result<usize> {
    match sysconf(SysconfVar::PAGE_SIZE)? {
        Some(size) if size > 0 => Ok(size as usize),
        _ => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "page size unavailable",
        )),
    }
}

/// Preferred I/O block size reported for a file descriptor
pub fn block_size<F: AsFd>(source: &F) -> io::Result<usize> {
    let file = File::from(source.as_fd().try_clone_to_owned()?);
    Ok(file.metadata()?.blksize() as usize)
}
