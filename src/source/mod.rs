//! Producer process management
//!
//! The producer is the single external command whose standard output is
//! broadcast. It is owned exclusively by the server and never shared with
//! clients.

pub mod command;
pub mod process;

pub use command::{ProducerCommand, TerminatePolicy, PID_ENV};
pub use process::SourceProcess;
