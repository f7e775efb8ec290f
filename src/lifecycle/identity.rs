//! Instance identity and artifact paths
//!
//! An identity names one logical server. Unless given explicitly it is derived
//! from the working directory, so running the tool from the same directory
//! always reaches the same server.

use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Directory the lock, pid record and socket live in unless overridden
pub const DEFAULT_RUNTIME_DIR: &str = "/tmp";

/// Prefix shared by all artifact file names
const ARTIFACT_PREFIX: &str = "fanout";

/// String key naming one server instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Use an explicit identity
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive the identity from the canonical current working directory
    pub fn from_working_dir() -> io::Result<Self> {
        let cwd = std::env::current_dir()?.canonicalize()?;
        Ok(Self::from_path(&cwd))
    }

    /// Derive the identity from a directory path
    ///
    /// The value is the POSIX `cksum` of the path followed by a newline, which
    /// is what `realpath . | cksum` prints first.
    pub fn from_path(path: &Path) -> Self {
        let mut line = path.as_os_str().as_bytes().to_vec();
        line.push(b'\n');
        Self(posix_cksum(&line).to_string())
    }

    /// The identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Filesystem artifacts belonging to one identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Exclusive-lock token
    pub lock: PathBuf,
    /// Text-encoded pid of the running server
    pub pid: PathBuf,
    /// Rendezvous socket clients connect to
    pub socket: PathBuf,
}

impl ArtifactPaths {
    /// Derive the artifact paths for `identity` under `dir`
    pub fn new(dir: impl AsRef<Path>, identity: &Identity) -> Self {
        let dir = dir.as_ref();
        let file = |ext: &str| dir.join(format!("{}.{}.{}", ARTIFACT_PREFIX, identity, ext));

        Self {
            lock: file("lock"),
            pid: file("pid"),
            socket: file("sock"),
        }
    }
}

const CKSUM_POLY: u32 = 0x04C1_1DB7;

fn crc_update(mut crc: u32, bytes: &[u8]) -> u32 {
    for &byte in bytes {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ CKSUM_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// CRC computed by POSIX `cksum`: the data, then its length in as few
/// little-endian bytes as needed, then complemented.
pub fn posix_cksum(data: &[u8]) -> u32 {
    let mut crc = crc_update(0, data);

    let mut len = data.len() as u64;
    while len != 0 {
        crc = crc_update(crc, &[(len & 0xFF) as u8]);
        len >>= 8;
    }

    !crc
}
