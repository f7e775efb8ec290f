//! Signal-driven control plane
//!
//! Signal handlers never touch server state. SIGHUP only raises a
//! [`RestartFlag`] that the control loop consumes at the top of its next
//! iteration; SIGTERM and SIGINT resolve [`SignalController::terminated`],
//! which the server races against its loop.
//!
//! | Signal          | Effect                                        |
//! |-----------------|-----------------------------------------------|
//! | SIGHUP          | request a producer restart                    |
//! | SIGTERM, SIGINT | ordered cleanup, exit with the signal number  |
//! | SIGPIPE         | ignored (Rust runtime default)                |

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal as listen, SignalKind};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::lifecycle::pidfile::read_pid;

/// Pending restart request shared between the SIGHUP listener and the loop
#[derive(Debug, Clone, Default)]
pub struct RestartFlag(Arc<AtomicBool>);

impl RestartFlag {
    /// Create a lowered flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Lower the flag, returning whether it was raised
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    /// Whether a request is pending
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Installed signal listeners for a running server
pub struct SignalController {
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    hangup_task: JoinHandle<()>,
}

impl SignalController {
    /// Register the listeners; SIGHUP raises `restart`
    ///
    /// Must be called from within a tokio runtime.
    pub fn install(restart: RestartFlag) -> io::Result<Self> {
        let mut hangup = listen(SignalKind::hangup())?;
        let terminate = listen(SignalKind::terminate())?;
        let interrupt = listen(SignalKind::interrupt())?;

        let hangup_task = tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                tracing::info!(signal = Signal::SIGHUP as i32, "Producer restart requested");
                restart.request();
            }
        });

        Ok(Self {
            terminate,
            interrupt,
            hangup_task,
        })
    }

    /// Resolve with the signal number once SIGTERM or SIGINT arrives
    pub async fn terminated(&mut self) -> i32 {
        tokio::select! {
            Some(()) = self.terminate.recv() => Signal::SIGTERM as i32,
            Some(()) = self.interrupt.recv() => Signal::SIGINT as i32,
            else => std::future::pending().await,
        }
    }
}

impl Drop for SignalController {
    fn drop(&mut self) {
        self.hangup_task.abort();
    }
}

/// Ask the server recorded in `pid_file` to restart its producer
///
/// Returns the pid that was signalled.
pub fn send_restart(pid_file: impl AsRef<Path>) -> Result<Pid> {
    let pid = read_pid(pid_file)?;
    signal::kill(pid, Signal::SIGHUP)?;

    tracing::info!(pid = pid.as_raw(), "Restart request sent");

    Ok(pid)
}

/// Serializes tests that send SIGHUP to the test process or that install
/// listeners and count restarts; the signal reaches every listener.
#[cfg(test)]
pub(crate) static HANGUP_TEST_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());
