//! fanout: relay one command's output to every attached client
//!
//! Server:   fanout [-w] [-n ID] [-t N] -- COMMAND [ARGS...]
//! Client:   fanout -c [-n ID] [COMMAND [ARGS...]]
//! Restart:  fanout -r [-n ID]
//!
//! Logging goes to stderr and is controlled with RUST_LOG
//! (default `fanout_rs=info`).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fanout_rs::client;
use fanout_rs::lifecycle::send_restart;
use fanout_rs::{
    BroadcastConfig, Broadcaster, Error, Identity, ProducerCommand, Result, TerminatePolicy,
};

#[derive(Debug, Parser)]
#[command(name = "fanout", version, about = "Broadcast one command's output to many clients")]
struct Cli {
    /// Attach as a client and run COMMAND with the stream as stdin (default: cat)
    #[arg(short = 'c', long = "client")]
    client: bool,

    /// Ask the running server to restart its producer
    #[arg(short = 'r', long = "restart")]
    restart: bool,

    /// Make the socket writable by all users
    #[arg(short = 'w', long = "world")]
    world_writable: bool,

    /// Identity naming the lock, pid and socket files (default: cksum of the working directory)
    #[arg(short = 'n', long = "name")]
    name: Option<String>,

    /// Producer termination: 0 closes the pipe and waits, N also sends signal N
    #[arg(short = 't', long = "terminate", default_value_t = 0)]
    terminate: i32,

    /// Print the socket path and exit
    #[arg(short = 'd', long = "dry-run")]
    dry_run: bool,

    /// Directory for the lock, pid and socket files
    #[arg(long, default_value = fanout_rs::lifecycle::DEFAULT_RUNTIME_DIR)]
    runtime_dir: PathBuf,

    /// Maximum simultaneously attached clients
    #[arg(long, default_value_t = fanout_rs::registry::DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Fixed relay buffer size in bytes (default: derived from the producer pipe)
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Producer command (server) or consumer command (client)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl Cli {
    fn config(&self) -> Result<BroadcastConfig> {
        let identity = match &self.name {
            Some(name) => Identity::new(name.clone()),
            None => Identity::from_working_dir()?,
        };

        let mut config = BroadcastConfig::new(identity)
            .runtime_dir(self.runtime_dir.clone())
            .max_clients(self.max_clients)
            .world_writable(self.world_writable)
            .terminate_policy(TerminatePolicy::from_code(self.terminate)?);
        if let Some(size) = self.buffer_size {
            config = config.buffer_size(size);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fanout_rs=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fanout failed");
            ExitCode::from(e.exit_code().clamp(1, 255) as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config()?;
    let paths = config.paths();

    if cli.dry_run {
        println!("{}", paths.socket.display());
        return Ok(());
    }

    if cli.restart {
        send_restart(&paths.pid)?;
    }
    if cli.client {
        // Only returns if the connection or the exec failed
        match client::connect_and_exec(&paths.socket, cli.command.as_slice())? {}
    }
    if cli.restart {
        return Ok(());
    }

    if cli.command.is_empty() {
        return Err(Error::Config("no producer command given".into()));
    }
    let command = ProducerCommand::new(cli.command)?;

    let server = Broadcaster::start(config, command).await?;
    let stats = server.run().await?;

    tracing::info!(
        bytes = stats.bytes_read,
        rounds = stats.rounds,
        bitrate = stats.bitrate(),
        "Last client gone, exiting"
    );
    Ok(())
}
