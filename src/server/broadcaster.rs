//! Broadcast control loop
//!
//! One task owns every piece of server state. Each iteration:
//!
//! 1. admits new clients (waiting only if there are none),
//! 2. applies a pending restart request,
//! 3. opens, closes or replaces the producer as needed,
//! 4. reads one buffer and fans it out.
//!
//! The loop ends when the registry empties after a relay round, i.e. when
//! the last client has gone. Every exit path removes the socket file and the
//! pid record, closes the producer and closes all clients, in that order.

use std::future::Future;
use std::io;

use crate::error::{Error, Result};
use crate::lifecycle::{ArtifactPaths, PidRecord, RestartFlag, SignalController, SingletonGuard};
use crate::registry::ClientRegistry;
use crate::relay::{self, RelayBuffer};
use crate::server::config::BroadcastConfig;
use crate::server::listener::{ConnectionAcceptor, RendezvousEndpoint};
use crate::source::{ProducerCommand, SourceProcess};
use crate::stats::RelayStats;

/// A started broadcaster
///
/// Holds the singleton lock, the signal listeners, the pid record and the
/// bound endpoint from the moment [`start`](Self::start) succeeds.
pub struct Broadcaster {
    config: BroadcastConfig,
    paths: ArtifactPaths,
    _guard: SingletonGuard,
    signals: Option<SignalController>,
    pid_record: PidRecord,
    endpoint: RendezvousEndpoint,
    acceptor: ConnectionAcceptor,
    clients: ClientRegistry,
    source: SourceProcess,
    buffer: Option<RelayBuffer>,
    restart: RestartFlag,
    stats: RelayStats,
}

impl Broadcaster {
    /// Acquire the singleton lock, install the signal listeners, write the
    /// pid record and bind the endpoint
    ///
    /// If the lock is held by another instance nothing else is touched. The
    /// listeners are in place before the pid record is visible, so a restart
    /// request can never reach the default SIGHUP action.
    pub async fn start(config: BroadcastConfig, command: ProducerCommand) -> Result<Self> {
        config.validate()?;
        let paths = config.paths();
        let restart = RestartFlag::new();

        let guard = SingletonGuard::acquire(&paths.lock)?;
        let signals = SignalController::install(restart.clone())?;
        let pid_record = PidRecord::write(&paths.pid, std::process::id())?;
        let endpoint = RendezvousEndpoint::bind(&paths.socket, config.world_writable)?;

        tracing::info!(
            identity = %config.identity,
            socket = %paths.socket.display(),
            command = %command.shell_line(),
            max_clients = config.max_clients,
            "Broadcaster started"
        );

        Ok(Self {
            clients: ClientRegistry::with_capacity(config.max_clients),
            source: SourceProcess::new(command, config.terminate_policy),
            config,
            paths,
            _guard: guard,
            signals: Some(signals),
            pid_record,
            endpoint,
            acceptor: ConnectionAcceptor::new(),
            buffer: None,
            restart,
            stats: RelayStats::new(),
        })
    }

    /// Artifact paths in use
    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Handle that requests a producer restart, as SIGHUP does
    pub fn restart_flag(&self) -> RestartFlag {
        self.restart.clone()
    }

    /// Run until the last client leaves or SIGTERM/SIGINT arrives
    pub async fn run(mut self) -> Result<RelayStats> {
        match self.signals.take() {
            Some(mut signals) => self.run_until(async move { signals.terminated().await }).await,
            None => self.run_until(std::future::pending()).await,
        }
    }

    /// Run until the last client leaves or `shutdown` resolves
    ///
    /// `shutdown` resolves to the number of the signal that ended the run,
    /// which is reported as [`Error::Terminated`]. SIGHUP still raises the
    /// restart flag; SIGTERM and SIGINT are only acted on through `shutdown`.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<RelayStats>
    where
        F: Future<Output = i32>,
    {
        let result = tokio::select! {
            signo = shutdown => {
                tracing::info!(signal = signo, "Termination requested");
                Err(Error::Terminated(signo))
            }
            result = self.serve() => result,
        };

        if let Err(ref e) = result {
            tracing::error!(error = %e, "Broadcaster stopping");
        }

        self.shutdown().await;
        result.map(|()| self.stats)
    }

    async fn serve(&mut self) -> Result<()> {
        loop {
            let admitted = self.acceptor.admit(&self.endpoint, &mut self.clients).await?;
            self.stats.clients_admitted += admitted.admitted as u64;
            self.stats.clients_rejected += admitted.rejected as u64;

            if self.restart.take() && self.source.request_reopen() {
                self.stats.restarts += 1;
                tracing::info!(pid = ?self.source.pid(), clients = self.clients.len(), "Restarting producer");
            }

            self.source.sync(self.clients.len()).await?;

            if self.source.is_open() {
                self.relay_round().await?;
            }

            if self.clients.is_empty() {
                tracing::info!("Last client disconnected");
                return Ok(());
            }
        }
    }

    async fn relay_round(&mut self) -> Result<()> {
        let buffer = match &mut self.buffer {
            Some(buffer) => buffer,
            slot => slot.insert(size_buffer(&self.config, &self.source)?),
        };

        self.source.read_full(buffer.as_mut_slice()).await?;
        let report = relay::broadcast(&mut self.clients, buffer.as_slice()).await;

        self.stats.record_round(buffer.len(), report);
        tracing::trace!(
            bytes = buffer.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            "Relay round"
        );

        Ok(())
    }

    async fn shutdown(&mut self) {
        self.endpoint.remove();
        self.pid_record.remove();
        self.source.close().await;
        self.clients.close_all();

        tracing::info!(
            rounds = self.stats.rounds,
            bytes_read = self.stats.bytes_read,
            bytes_delivered = self.stats.bytes_delivered,
            clients_admitted = self.stats.clients_admitted,
            clients_dropped = self.stats.clients_dropped,
            restarts = self.stats.restarts,
            uptime_secs = self.stats.uptime().as_secs(),
            "Broadcaster stopped"
        );
    }
}

fn size_buffer(config: &BroadcastConfig, source: &SourceProcess) -> Result<RelayBuffer> {
    if let Some(size) = config.buffer_size {
        return RelayBuffer::with_size(size);
    }
    let stdout = source
        .stdout()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "producer not open"))?;
    RelayBuffer::for_source(stdout)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use nix::sys::signal::Signal;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixStream;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::lifecycle::signals::HANGUP_TEST_LOCK;
    use crate::lifecycle::Identity;
    use crate::source::TerminatePolicy;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn config(dir: &Path, name: &str) -> BroadcastConfig {
        BroadcastConfig::new(Identity::new(name))
            .runtime_dir(dir)
            .buffer_size(4)
            .terminate_policy(TerminatePolicy::Signal(Signal::SIGTERM))
    }

    fn spawn(server: Broadcaster) -> (oneshot::Sender<i32>, JoinHandle<Result<RelayStats>>) {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(server.run_until(async move {
            match rx.await {
                Ok(signo) => signo,
                Err(_) => std::future::pending().await,
            }
        }));
        (tx, handle)
    }

    async fn read_n(client: &mut UnixStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        tokio::time::timeout(TIMEOUT, client.read_exact(&mut buf))
            .await
            .expect("timed out reading broadcast")
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_first_client_receives_everything_in_order() {
        let _serial = HANGUP_TEST_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let command = ProducerCommand::new(["printf AAAABBBBCCCC; exec sleep 30"]).unwrap();
        let server = Broadcaster::start(config(dir.path(), "order"), command)
            .await
            .unwrap();
        let paths = server.paths().clone();
        let (stop, handle) = spawn(server);

        let mut client = UnixStream::connect(&paths.socket).await.unwrap();
        assert_eq!(read_n(&mut client, 12).await, b"AAAABBBBCCCC");

        stop.send(Signal::SIGTERM as i32).unwrap();
        let result = tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(Error::Terminated(15))));

        // Signalled exit cleans up like any other
        assert!(!paths.socket.exists());
        assert!(!paths.pid.exists());
        assert!(paths.lock.exists());
    }

    #[tokio::test]
    async fn test_last_client_leaving_stops_server() {
        let _serial = HANGUP_TEST_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let server = Broadcaster::start(
            config(dir.path(), "leave"),
            ProducerCommand::new(["exec", "yes"]).unwrap(),
        )
        .await
        .unwrap();
        let paths = server.paths().clone();
        let (_stop, handle) = spawn(server);

        let mut client = UnixStream::connect(&paths.socket).await.unwrap();
        assert_eq!(read_n(&mut client, 4).await, b"y\ny\n");
        drop(client);

        let stats = tokio::time::timeout(TIMEOUT, handle)
            .await
            .expect("server kept running without clients")
            .unwrap()
            .unwrap();

        assert_eq!(stats.clients_admitted, 1);
        assert_eq!(stats.clients_dropped, 1);
        assert_eq!(stats.restarts, 0);
        assert!(!paths.socket.exists());
        assert!(!paths.pid.exists());
    }

    #[tokio::test]
    async fn test_restart_keeps_clients_attached() {
        let _serial = HANGUP_TEST_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        // Each producer announces its pid in the first two buffers
        let server = Broadcaster::start(
            config(dir.path(), "restart"),
            ProducerCommand::new(["printf '%08d' $$; exec yes"]).unwrap(),
        )
        .await
        .unwrap();
        let socket = server.paths().socket.clone();
        let restart = server.restart_flag();
        let (_stop, handle) = spawn(server);

        let mut client = UnixStream::connect(&socket).await.unwrap();
        let first_pid = read_n(&mut client, 8).await;
        assert_eq!(read_n(&mut client, 4).await, b"y\ny\n");

        restart.request();

        // Old output drains until the replacement's pid shows up
        let mut head = read_n(&mut client, 4).await;
        for _ in 0..1 << 20 {
            if head != b"y\ny\n" {
                break;
            }
            head = read_n(&mut client, 4).await;
        }
        assert!(head.iter().all(u8::is_ascii_digit));
        head.extend(read_n(&mut client, 4).await);
        assert_ne!(head, first_pid);

        // Delivery resumes from the new producer on the same connection
        assert_eq!(read_n(&mut client, 4).await, b"y\ny\n");
        drop(client);

        let stats = tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap().unwrap();
        assert_eq!(stats.restarts, 1);
        assert_eq!(stats.clients_admitted, 1);
    }

    #[tokio::test]
    async fn test_restart_request_before_run_is_harmless() {
        let _serial = HANGUP_TEST_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let server = Broadcaster::start(
            config(dir.path(), "early-hup"),
            ProducerCommand::new(["exec", "yes"]).unwrap(),
        )
        .await
        .unwrap();
        let paths = server.paths().clone();
        let restart = server.restart_flag();

        let pid = crate::lifecycle::send_restart(&paths.pid).unwrap();
        assert_eq!(pid.as_raw() as u32, std::process::id());

        for _ in 0..100 {
            if restart.is_requested() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(restart.is_requested());
        assert!(paths.pid.exists());
        assert!(paths.socket.exists());

        // The request is consumed with no producer open; serving proceeds
        let (_stop, handle) = spawn(server);
        let mut client = UnixStream::connect(&paths.socket).await.unwrap();
        assert_eq!(read_n(&mut client, 4).await, b"y\ny\n");
        drop(client);

        let stats = tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap().unwrap();
        assert_eq!(stats.restarts, 0);
    }

    #[tokio::test]
    async fn test_invalid_limits_rejected_before_startup() {
        let _serial = HANGUP_TEST_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let command = ProducerCommand::new(["exec", "yes"]).unwrap();

        let no_clients = config(dir.path(), "limits").max_clients(0);
        let paths = no_clients.paths();
        let result = Broadcaster::start(no_clients, command.clone()).await;
        assert!(matches!(result, Err(Error::Config(_))));

        let no_buffer = config(dir.path(), "limits").buffer_size(0);
        let result = Broadcaster::start(no_buffer, command).await;
        assert!(matches!(result, Err(Error::Config(_))));

        assert!(!paths.lock.exists());
        assert!(!paths.pid.exists());
        assert!(!paths.socket.exists());
    }

    #[tokio::test]
    async fn test_second_instance_is_refused() {
        let _serial = HANGUP_TEST_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let first = Broadcaster::start(
            config(dir.path(), "single"),
            ProducerCommand::new(["exec", "yes"]).unwrap(),
        )
        .await
        .unwrap();

        let second = Broadcaster::start(
            config(dir.path(), "single"),
            ProducerCommand::new(["exec", "yes"]).unwrap(),
        )
        .await;

        assert!(matches!(second, Err(Error::AlreadyRunning { .. })));
        assert!(first.paths().socket.exists());
        assert_eq!(
            std::fs::read_to_string(&first.paths().pid).unwrap(),
            std::process::id().to_string()
        );
    }

    #[tokio::test]
    async fn test_producer_death_is_fatal() {
        let _serial = HANGUP_TEST_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let server = Broadcaster::start(
            config(dir.path(), "death"),
            ProducerCommand::new(["printf", "AAAAB"]).unwrap(),
        )
        .await
        .unwrap();
        let paths = server.paths().clone();
        let (_stop, handle) = spawn(server);

        let mut client = UnixStream::connect(&paths.socket).await.unwrap();
        assert_eq!(read_n(&mut client, 4).await, b"AAAA");

        let result = tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            Error::ShortRead { .. } | Error::ProducerExited(_)
        ));
        assert_ne!(err.exit_code(), 0);
        assert!(!paths.socket.exists());
        assert!(!paths.pid.exists());
    }
}
