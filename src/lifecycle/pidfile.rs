//! Pid record I/O
//!
//! Format: the decimal process id of the running server, no trailing newline.
//! Restart mode reads it to find the server to signal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nix::sys::signal;
use nix::unistd::Pid;

use crate::error::{Error, Result};

/// Pid record owned by the running server
///
/// Removed by [`PidRecord::remove`] on every orderly exit path, and on drop
/// as a fallback.
#[derive(Debug)]
pub struct PidRecord {
    path: PathBuf,
    removed: bool,
}

impl PidRecord {
    /// Write `pid` to `path` atomically (temp file + rename)
    pub fn write(path: impl AsRef<Path>, pid: u32) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut temp = path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        fs::write(&temp, pid.to_string())?;
        fs::rename(&temp, &path)?;

        tracing::debug!(pid_file = %path.display(), pid, "Pid record written");

        Ok(Self {
            path,
            removed: false,
        })
    }

    /// Path of the record
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the record (idempotent)
    pub fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(pid_file = %self.path.display(), error = %e, "Failed to remove pid record");
            }
        }
    }
}

impl Drop for PidRecord {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Read the pid of a running server
///
/// Fails unless the record parses to a positive pid naming a live process.
pub fn read_pid(path: impl AsRef<Path>) -> Result<Pid> {
    let path = path.as_ref();
    let not_running = |reason: String| Error::ServerNotRunning {
        pid_file: path.to_path_buf(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| not_running(e.to_string()))?;
    let raw: i32 = content
        .trim()
        .parse()
        .map_err(|_| not_running("malformed pid record".into()))?;

    if raw <= 0 {
        return Err(not_running(format!("invalid pid {}", raw)));
    }

    let pid = Pid::from_raw(raw);
    signal::kill(pid, None).map_err(|e| not_running(format!("pid {} not alive: {}", raw, e)))?;

    Ok(pid)
}
