//! Memberd — membership synchronization daemon and control client.
//!
//! # Usage
//!
//! ```text
//! memberd daemon                          run the daemon in the foreground
//! memberd ping                            liveness check
//! memberd sync                            trigger a full sync cycle
//! memberd last-synced                     unix time of the last completed cycle
//! memberd setpass <user>                  change a member's password
//! memberd stop                            request graceful shutdown
//! ```
//!
//! All client subcommands talk to the daemon socket under the memberd root
//! (default `~/.memberd`, override with `--root`).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use memberd_core::Config;
use memberd_daemon::{
    request_last_synced, request_ping, request_setpass, request_stop, request_sync, start_blocking,
    DaemonError,
};

#[derive(Parser, Debug)]
#[command(
    name = "memberd",
    version,
    about = "Keep downstream systems in sync with the membership dataset",
    long_about = None,
)]
struct Cli {
    /// Memberd root directory (sockets, data files, config.yaml).
    #[arg(long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon in the foreground (socket server + sync engine).
    Daemon,

    /// Check that the daemon answers.
    Ping,

    /// Trigger a full synchronization cycle and wait for it to finish.
    Sync,

    /// Print the unix timestamp of the last completed sync cycle.
    LastSynced,

    /// Change a member's password (old and new password read from stdin).
    Setpass {
        /// Login name of the member.
        user: String,
    },

    /// Request graceful daemon shutdown over the socket.
    Stop,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let root = match cli.root {
        Some(root) => root,
        None => dirs::home_dir()
            .context("could not determine home directory")?
            .join(".memberd"),
    };
    let config = Config::load_or_default(root).context("failed to load configuration")?;
    let socket = config.listen_socket.clone();

    match cli.command {
        Commands::Daemon => {
            start_blocking(config).context("daemon exited with error")?;
        }
        Commands::Ping => match request_ping(&socket) {
            Ok(response) => print_json(&response)?,
            Err(DaemonError::DaemonNotRunning { .. }) => bail!("daemon is not running"),
            Err(err) => return Err(err).context("ping failed"),
        },
        Commands::Sync => {
            let response = request_sync(&socket).context("failed to trigger sync")?;
            print_json(&response)?;
        }
        Commands::LastSynced => {
            let response =
                request_last_synced(&socket).context("failed to query last sync time")?;
            print_json(&response)?;
        }
        Commands::Setpass { user } => {
            let oldpass = prompt("old password: ")?;
            let newpass = prompt("new password: ")?;
            let response = request_setpass(&socket, &user, &oldpass, &newpass)
                .context("failed to change password")?;
            if let Some(error) = response.get("error").and_then(|e| e.as_str()) {
                bail!("{error}");
            }
            print_json(&response)?;
        }
        Commands::Stop => match request_stop(&socket) {
            Ok(_) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
    }

    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render response JSON")?
    );
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush().context("flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
