//! Producer command and termination policy

use nix::sys::signal::Signal;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Environment variable carrying the server's pid into the producer
pub const PID_ENV: &str = "_FANOUT_PID";

/// Shell used to interpret the producer command line
const SHELL: &str = "/bin/sh";

/// The producer's argument vector
///
/// The words are joined with spaces and interpreted by `/bin/sh -c`, so
/// pipelines, redirections and globbing are part of the command contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerCommand {
    argv: Vec<String>,
}

impl ProducerCommand {
    /// Build from a non-empty argument vector
    pub fn new<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() {
            return Err(Error::Config("no producer command given".into()));
        }
        Ok(Self { argv })
    }

    /// Argument vector as given
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Command line handed to the shell
    pub fn shell_line(&self) -> String {
        self.argv.join(" ")
    }

    /// Prepare the shell invocation; `server_pid` is exported unless the
    /// variable is already set (nested servers keep the outermost pid).
    pub(crate) fn to_command(&self, server_pid: u32) -> Command {
        let mut cmd = Command::new(SHELL);
        cmd.arg("-c").arg(self.shell_line());

        if std::env::var_os(PID_ENV).is_none() {
            cmd.env(PID_ENV, server_pid.to_string());
        }

        cmd
    }
}

/// How a producer that is no longer needed is shut down
///
/// The pipe is always closed first; the producer notices on its next write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminatePolicy {
    /// Close the pipe and wait for the producer to exit on its own
    #[default]
    CloseAndWait,
    /// Close the pipe, send this signal, then wait
    Signal(Signal),
}

impl TerminatePolicy {
    /// Decode the numeric policy value: `0` waits, anything else is the
    /// signal number to send.
    pub fn from_code(code: i32) -> Result<Self> {
        if code == 0 {
            return Ok(TerminatePolicy::CloseAndWait);
        }
        Signal::try_from(code)
            .map(TerminatePolicy::Signal)
            .map_err(|_| Error::Config(format!("invalid terminate signal {}", code)))
    }
}
