//! Relay loop building blocks
//!
//! ```text
//!   producer stdout ──read_full──► RelayBuffer ──write_full──► client 0
//!                                              ──write_full──► client 1
//!                                              ──write_full──► ...
//! ```
//!
//! The buffer is the only copy of the data; it is overwritten by every read
//! and never touched by clients.

pub mod buffer;
pub mod fanout;

pub use buffer::RelayBuffer;
pub use fanout::{broadcast, read_full, write_full, FanoutReport};
