//! Server configuration

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::lifecycle::{ArtifactPaths, Identity, DEFAULT_RUNTIME_DIR};
use crate::registry::DEFAULT_MAX_CLIENTS;
use crate::source::TerminatePolicy;

/// Broadcaster configuration options
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Instance identity; names the lock, pid record and socket
    pub identity: Identity,

    /// Directory holding the artifacts
    pub runtime_dir: PathBuf,

    /// Maximum simultaneously attached clients
    pub max_clients: usize,

    /// Make the rendezvous socket writable by everyone
    pub world_writable: bool,

    /// How a producer that is no longer needed is stopped
    pub terminate_policy: TerminatePolicy,

    /// Fixed relay buffer size (None = derive from the producer pipe)
    pub buffer_size: Option<usize>,
}

impl BroadcastConfig {
    /// Create a config for `identity` with defaults for everything else
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            runtime_dir: PathBuf::from(DEFAULT_RUNTIME_DIR),
            max_clients: DEFAULT_MAX_CLIENTS,
            world_writable: false,
            terminate_policy: TerminatePolicy::default(),
            buffer_size: None,
        }
    }

    /// Artifact paths for this config
    pub fn paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.runtime_dir, &self.identity)
    }

    /// Reject limits the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_clients == 0 {
            return Err(Error::Config("max clients must be at least 1".into()));
        }
        if self.buffer_size == Some(0) {
            return Err(Error::Config("relay buffer size must be non-zero".into()));
        }
        Ok(())
    }

    /// Set the artifact directory
    pub fn runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    /// Set maximum clients
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Make the socket world-writable
    pub fn world_writable(mut self, enabled: bool) -> Self {
        self.world_writable = enabled;
        self
    }

    /// Set the producer termination policy
    pub fn terminate_policy(mut self, policy: TerminatePolicy) -> Self {
        self.terminate_policy = policy;
        self
    }

    /// Use a fixed relay buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use nix::sys::signal::Signal;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = BroadcastConfig::new(Identity::new("radio"));

        assert_eq!(config.runtime_dir, PathBuf::from("/tmp"));
        assert_eq!(config.max_clients, 1024);
        assert!(!config.world_writable);
        assert_eq!(config.terminate_policy, TerminatePolicy::CloseAndWait);
        assert!(config.buffer_size.is_none());
    }

    #[test]
    fn test_paths_follow_runtime_dir() {
        let config = BroadcastConfig::new(Identity::new("radio")).runtime_dir("/run/fanout");
        let paths = config.paths();

        assert_eq!(paths.socket, PathBuf::from("/run/fanout/fanout.radio.sock"));
        assert_eq!(paths.lock, PathBuf::from("/run/fanout/fanout.radio.lock"));
    }

    #[test]
    fn test_builder_chaining() {
        let config = BroadcastConfig::new(Identity::new("tuner"))
            .max_clients(8)
            .world_writable(true)
            .terminate_policy(TerminatePolicy::Signal(Signal::SIGINT))
            .buffer_size(188 * 7);

        assert_eq!(config.max_clients, 8);
        assert!(config.world_writable);
        assert_eq!(config.terminate_policy, TerminatePolicy::Signal(Signal::SIGINT));
        assert_eq!(config.buffer_size, Some(1316));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let base = BroadcastConfig::new(Identity::new("radio"));
        assert!(base.validate().is_ok());

        let no_clients = base.clone().max_clients(0);
        assert!(matches!(no_clients.validate(), Err(Error::Config(_))));

        let no_buffer = base.buffer_size(0);
        assert!(matches!(no_buffer.validate(), Err(Error::Config(_))));
    }
}
