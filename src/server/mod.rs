//! Broadcast server
//!
//! ```text
//!                ┌──────────────────────────┐
//!  connections ─►│ RendezvousEndpoint       │
//!                │   └─ ConnectionAcceptor ─┼─► ClientRegistry
//!                │                          │        │
//!  producer ────►│ SourceProcess ─► RelayBuffer ─────┘ broadcast
//!                └──────────────────────────┘
//! ```

pub mod broadcaster;
pub mod config;
pub mod listener;

pub use broadcaster::Broadcaster;
pub use config::BroadcastConfig;
pub use listener::{AdmitReport, ConnectionAcceptor, RendezvousEndpoint};
