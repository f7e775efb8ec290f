//! Live client registry
//!
//! The registry is the ordered, dense set of connected clients that the relay
//! loop fans each buffer out to. It is owned by the single control loop, so it
//! needs no internal locking.
//!
//! # Layout
//!
//! ```text
//!   index:   0        1        2        3
//!          ┌────────┬────────┬────────┬────────┐
//!          │ id=1   │ id=4   │ id=5   │ id=9   │   remove_at(1)
//!          └────────┴────────┴────────┴────────┘
//!                        │
//!                        ▼
//!          ┌────────┬────────┬────────┐
//!          │ id=1   │ id=5   │ id=9   │            survivors keep their order
//!          └────────┴────────┴────────┘
//! ```

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{ClientEntry, ClientId};
pub use error::RegistryError;
pub use store::{ClientRegistry, DEFAULT_MAX_CLIENTS};
