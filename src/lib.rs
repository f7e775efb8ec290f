//! fanout-rs: single-source, multi-sink stream broadcaster
//!
//! One producer command's standard output is relayed live to every client
//! attached to a Unix domain socket. The producer only runs while at least
//! one client is attached, and can be replaced without dropping clients.
//!
//! # Example
//! ```no_run
//! use fanout_rs::{BroadcastConfig, Broadcaster, Identity, ProducerCommand};
//!
//! # async fn example() -> fanout_rs::Result<()> {
//! let config = BroadcastConfig::new(Identity::new("tuner")).max_clients(16);
//! let command = ProducerCommand::new(["dvbstream", "-o", "8192"])?;
//!
//! let server = Broadcaster::start(config, command).await?;
//! println!("{}", server.paths().socket.display());
//!
//! let stats = server.run().await?;
//! println!("relayed {} bytes", stats.bytes_read);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod relay;
pub mod server;
pub mod source;
pub mod stats;

pub use error::{Error, Result};
pub use lifecycle::{ArtifactPaths, Identity, RestartFlag};
pub use registry::{ClientId, ClientRegistry};
pub use server::{BroadcastConfig, Broadcaster};
pub use source::{ProducerCommand, TerminatePolicy};
pub use stats::RelayStats;
