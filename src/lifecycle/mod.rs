//! Process lifecycle: identity, singleton lock, pid record and signals
//!
//! These pieces are created once at startup, before the first client is
//! accepted, and outlive every other part of the server.

pub mod identity;
pub mod lock;
pub mod pidfile;
pub mod signals;

pub use identity::{ArtifactPaths, Identity, DEFAULT_RUNTIME_DIR};
pub use lock::SingletonGuard;
pub use pidfile::{read_pid, PidRecord};
pub use signals::{send_restart, RestartFlag, SignalController};
