//! Error types
//!
//! A single error enum covers every fatal condition of the broadcaster.
//! Per-client write failures never reach this type; they are handled by
//! dropping the client (see [`crate::relay`]).

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use nix::errno::Errno;
use nix::sys::signal::Signal;

pub use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal broadcaster errors
#[derive(Debug)]
pub enum Error {
    /// Unrecoverable system call failure
    Io(io::Error),
    /// Another server already holds the lock for this identity
    AlreadyRunning {
        /// Lock file that is held
        lock: PathBuf,
    },
    /// The lock file could not be created or opened
    LockFile {
        /// Lock file path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
    /// The pid record is missing, malformed or names a dead process
    ServerNotRunning {
        /// Pid record path
        pid_file: PathBuf,
        /// What went wrong
        reason: String,
    },
    /// The producer command could not be started
    ProducerSpawn {
        /// Shell command line
        command: String,
        /// Underlying error
        source: io::Error,
    },
    /// The producer exited while it was still needed
    ProducerExited(ExitStatus),
    /// The producer returned less than a full buffer
    ShortRead {
        /// Bytes requested
        expected: usize,
        /// Bytes obtained before end of stream
        got: usize,
    },
    /// A termination signal was received
    Terminated(i32),
    /// Invalid configuration
    Config(String),
    /// Registry failure
    Registry(RegistryError),
}

impl Error {
    /// Process exit status for this error
    ///
    /// Mirrors the underlying errno or signal number where there is one.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Io(e)
            | Error::LockFile { source: e, .. }
            | Error::ProducerSpawn { source: e, .. } => {
                e.raw_os_error().filter(|code| *code != 0).unwrap_or(1)
            }
            Error::AlreadyRunning { .. } => 1,
            Error::ServerNotRunning { .. } => Errno::EIO as i32,
            Error::ProducerExited(_) => Signal::SIGCHLD as i32,
            Error::ShortRead { .. } => Errno::EIO as i32,
            Error::Terminated(signo) => *signo,
            Error::Config(_) | Error::Registry(_) => Errno::EINVAL as i32,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::AlreadyRunning { lock } => {
                write!(f, "could not obtain exclusive lock: {}", lock.display())
            }
            Error::LockFile { path, source } => {
                write!(f, "could not create lock file {}: {}", path.display(), source)
            }
            Error::ServerNotRunning { pid_file, reason } => {
                write!(f, "no server reachable via {}: {}", pid_file.display(), reason)
            }
            Error::ProducerSpawn { command, source } => {
                write!(f, "failed to start producer `{}`: {}", command, source)
            }
            Error::ProducerExited(status) => write!(f, "producer exited unexpectedly ({})", status),
            Error::ShortRead { expected, got } => {
                write!(f, "short read from producer: {} of {} bytes", got, expected)
            }
            Error::Terminated(signo) => write!(f, "terminated by signal {}", signo),
            Error::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Error::Registry(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::LockFile { source, .. } | Error::ProducerSpawn { source, .. } => Some(source),
            Error::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<Errno> for Error {
    fn from(e: Errno) -> Self {
        Error::Io(io::Error::from(e))
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}
