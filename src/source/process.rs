//! Producer subprocess lifecycle
//!
//! ```text
//!            sync(n > 0)
//!   Closed ───────────────► Open
//!     ▲                      │
//!     └──────────────────────┘
//!      sync(0) or reopen pending
//! ```
//!
//! A reopen closes the running producer and, clients still being attached,
//! spawns a fresh one from the same command in the same `sync` call.

use std::io;
use std::process::Stdio;

use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use tokio::process::{Child, ChildStdout};

use super::command::{ProducerCommand, TerminatePolicy};
use crate::error::{Error, Result};
use crate::relay;

/// A running producer
#[derive(Debug)]
struct Running {
    child: Child,
    stdout: ChildStdout,
    pid: u32,
}

/// Handle to at most one producer subprocess
#[derive(Debug)]
pub struct SourceProcess {
    command: ProducerCommand,
    policy: TerminatePolicy,
    server_pid: u32,
    running: Option<Running>,
    reopen: bool,
    spawn_count: u64,
}

impl SourceProcess {
    /// Create a closed source for `command`
    pub fn new(command: ProducerCommand, policy: TerminatePolicy) -> Self {
        Self {
            command,
            policy,
            server_pid: std::process::id(),
            running: None,
            reopen: false,
            spawn_count: 0,
        }
    }

    /// Whether a producer is running
    pub fn is_open(&self) -> bool {
        self.running.is_some()
    }

    /// Pid of the running producer
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|r| r.pid)
    }

    /// Number of producers spawned so far
    pub fn spawn_count(&self) -> u64 {
        self.spawn_count
    }

    /// Whether a reopen is pending
    pub fn reopen_pending(&self) -> bool {
        self.reopen
    }

    /// Ask for the producer to be replaced at the next [`sync`](Self::sync)
    ///
    /// Has no effect when no producer is open. Returns whether the request
    /// was recorded.
    pub fn request_reopen(&mut self) -> bool {
        if self.running.is_some() {
            self.reopen = true;
        }
        self.reopen
    }

    /// Producer stdout, for sizing the relay buffer
    pub fn stdout(&self) -> Option<&ChildStdout> {
        self.running.as_ref().map(|r| &r.stdout)
    }

    /// Bring the producer in line with the number of attached clients
    ///
    /// Closes it when no client remains or a reopen is pending, then opens
    /// one if clients are attached and none is running.
    pub async fn sync(&mut self, clients: usize) -> Result<()> {
        if self.reopen || clients == 0 {
            self.close().await;
        }
        if self.running.is_some() || clients == 0 {
            return Ok(());
        }
        self.open()
    }

    fn open(&mut self) -> Result<()> {
        let line = self.command.shell_line();

        let mut cmd = self.command.to_command(self.server_pid);
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let spawn_err = |source: io::Error| Error::ProducerSpawn {
            command: line.clone(),
            source,
        };

        let mut child = cmd.spawn().map_err(spawn_err)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err(io::Error::other("producer stdout not captured")))?;
        let pid = child
            .id()
            .ok_or_else(|| spawn_err(io::Error::other("producer exited during spawn")))?;

        self.spawn_count += 1;
        tracing::info!(pid = pid, command = %line, spawn = self.spawn_count, "Producer started");

        self.running = Some(Running { child, stdout, pid });
        Ok(())
    }

    /// Gracefully shut the producer down and clear any pending reopen
    ///
    /// The pipe is closed first, then the termination policy applies, then
    /// the child is reaped. Failures are logged; closing never fails.
    pub async fn close(&mut self) {
        if let Some(Running {
            mut child,
            stdout,
            pid,
        }) = self.running.take()
        {
            drop(stdout);

            if let TerminatePolicy::Signal(sig) = self.policy {
                match signal::kill(Pid::from_raw(pid as i32), sig) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(e) => tracing::warn!(pid = pid, error = %e, "Failed to signal producer"),
                }
            }

            match child.wait().await {
                Ok(status) => tracing::info!(pid = pid, status = %status, "Producer closed"),
                Err(e) => tracing::warn!(pid = pid, error = %e, "Failed to reap producer"),
            }
        }
        self.reopen = false;
    }

    /// Fill `buf` from the producer
    ///
    /// Races the read against the producer's exit: a producer dying while it
    /// is still needed is fatal ([`Error::ProducerExited`]), as is a short read.
    pub async fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        let Some(Running { child, stdout, .. }) = self.running.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "producer not open").into());
        };

        tokio::select! {
            biased;
            res = relay::read_full(stdout, buf) => res,
            status = child.wait() => match status {
                Ok(status) => Err(Error::ProducerExited(status)),
                Err(e) => Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use nix::sys::signal::Signal;

    use super::*;
    use crate::source::command::PID_ENV;

    fn source(script: &str) -> SourceProcess {
        SourceProcess::new(
            ProducerCommand::new([script]).unwrap(),
            TerminatePolicy::Signal(Signal::SIGTERM),
        )
    }

    #[tokio::test]
    async fn test_opens_only_with_clients() {
        let mut src = source("exec sleep 30");

        src.sync(0).await.unwrap();
        assert!(!src.is_open());

        src.sync(2).await.unwrap();
        assert!(src.is_open());
        assert!(src.pid().is_some());

        src.sync(0).await.unwrap();
        assert!(!src.is_open());
        assert_eq!(src.spawn_count(), 1);
    }

    #[tokio::test]
    async fn test_reads_producer_output() {
        let mut src = source("printf AAAABBBB; exec sleep 30");
        src.sync(1).await.unwrap();

        let mut buf = [0u8; 4];
        src.read_full(&mut buf).await.unwrap();
        assert_eq!(&buf, b"AAAA");
        src.read_full(&mut buf).await.unwrap();
        assert_eq!(&buf, b"BBBB");

        src.close().await;
    }

    #[tokio::test]
    async fn test_reopen_replaces_producer() {
        let mut src = source("exec sleep 30");
        src.sync(1).await.unwrap();
        let first = src.pid().unwrap();

        assert!(src.request_reopen());
        src.sync(1).await.unwrap();

        let second = src.pid().unwrap();
        assert_ne!(first, second);
        assert!(!src.reopen_pending());
        assert_eq!(src.spawn_count(), 2);

        // The old producer has been reaped
        assert!(signal::kill(Pid::from_raw(first as i32), None).is_err());

        src.close().await;
    }

    #[tokio::test]
    async fn test_reopen_request_ignored_when_closed() {
        let mut src = source("exec sleep 30");
        assert!(!src.request_reopen());
        assert!(!src.reopen_pending());
    }

    #[tokio::test]
    async fn test_close_and_wait_policy() {
        let mut src = SourceProcess::new(
            ProducerCommand::new(["exec", "yes"]).unwrap(),
            TerminatePolicy::CloseAndWait,
        );
        src.sync(1).await.unwrap();

        let mut buf = [0u8; 4];
        src.read_full(&mut buf).await.unwrap();
        assert_eq!(&buf, b"y\ny\n");

        // `yes` dies on the broken pipe once the read end is closed
        src.close().await;
        assert!(!src.is_open());
    }

    #[tokio::test]
    async fn test_producer_exit_is_fatal() {
        let mut src = source("printf AB");
        src.sync(1).await.unwrap();

        let mut buf = [0u8; 4];
        let err = src.read_full(&mut buf).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ShortRead { .. } | Error::ProducerExited(_)
        ));
    }

    #[tokio::test]
    async fn test_server_pid_exported() {
        if std::env::var_os(PID_ENV).is_some() {
            return;
        }
        let expected = std::process::id().to_string();
        let mut src = source("printf %s \"$_FANOUT_PID\"; exec sleep 30");
        src.sync(1).await.unwrap();

        let mut buf = vec![0u8; expected.len()];
        src.read_full(&mut buf).await.unwrap();
        assert_eq!(buf, expected.as_bytes());

        src.close().await;
    }

    #[tokio::test]
    async fn test_read_when_closed() {
        let mut src = source("exec sleep 30");
        let mut buf = [0u8; 4];
        assert!(matches!(src.read_full(&mut buf).await, Err(Error::Io(_))));
    }
}
