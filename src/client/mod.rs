//! Consumer mode
//!
//! Connects to a running broadcaster and replaces the current process with
//! the consumer command, whose standard input is the connection. Without a
//! command the stream is passed straight through with `cat`.

use std::convert::Infallible;
use std::ffi::OsStr;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::Result;

/// Consumer run when none is given
pub const DEFAULT_CONSUMER: &str = "cat";

/// Build the consumer command reading from `stream`
///
/// An empty `argv` selects [`DEFAULT_CONSUMER`]. The program is looked up in
/// `PATH`; no shell is involved.
pub fn consumer_command<S: AsRef<OsStr>>(stream: UnixStream, argv: &[S]) -> Command {
    let mut cmd = match argv.split_first() {
        Some((program, args)) => {
            let mut cmd = Command::new(program);
            cmd.args(args);
            cmd
        }
        None => Command::new(DEFAULT_CONSUMER),
    };
    cmd.stdin(Stdio::from(OwnedFd::from(stream)));
    cmd
}

/// Attach to the broadcaster at `socket` and exec the consumer
///
/// Only returns on failure.
pub fn connect_and_exec<S: AsRef<OsStr>>(
    socket: impl AsRef<Path>,
    argv: &[S],
) -> Result<Infallible> {
    let socket = socket.as_ref();
    let stream = UnixStream::connect(socket)?;

    tracing::debug!(socket = %socket.display(), "Connected to broadcaster");

    let err = consumer_command(stream, argv).exec();
    Err(err.into())
}
