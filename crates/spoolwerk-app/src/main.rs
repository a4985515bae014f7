// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolwerk: multi-user print spooler.
//
// Entry point. Initialises logging, parses the command line, and runs one of:
//
//   spoolwerk serve                 run the spooler on the configured address
//   spoolwerk shell                 interactive client
//   spoolwerk admin <action>        edit roles and permissions offline

mod admin;
mod services;
mod shell;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use spoolwerk_core::config::ServerConfig;
use spoolwerk_core::error::Result;
use spoolwerk_print::{SpoolClient, SpoolServer};
use tracing::{error, info};

use services::data_dir;
use services::spooler::{self, SpoolerServices};

/// Spoolwerk: multi-user print spooler
#[derive(Parser, Debug)]
#[command(name = "spoolwerk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory (defaults to $XDG_DATA_HOME/spoolwerk)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to config.json in the data directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the spooler.  It starts in the OFF state.
    Serve {
        /// Override the listen address from the config file
        #[arg(long, value_name = "ADDR")]
        listen: Option<SocketAddr>,

        /// Keep users and audit trail in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Interactive client
    Shell {
        /// Spooler address (defaults to the configured listen address)
        #[arg(long, value_name = "ADDR")]
        connect: Option<SocketAddr>,
    },

    /// Offline administration of the credential database
    Admin {
        #[command(subcommand)]
        action: admin::AdminAction,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "spoolwerk failed");
            eprintln!("spoolwerk: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let dir = data_dir::data_dir(cli.data_dir.as_deref());
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| dir.join(spooler::CONFIG_FILE));
    let config = spooler::load_config(&config_path);

    match cli.command {
        Command::Serve { listen, ephemeral } => {
            if !config_path.exists() {
                spooler::persist_config(&config_path, &config)?;
                info!(path = %config_path.display(), "wrote default config");
            }
            serve(dir, config, listen, ephemeral).await
        }
        Command::Shell { connect } => {
            let addr = connect.unwrap_or(config.listen_addr);
            let client = SpoolClient::connect(addr).await?;
            let input = tokio::io::BufReader::new(tokio::io::stdin());
            let mut shell = shell::Shell::new(client, input, tokio::io::stdout()).await?;
            shell.run().await
        }
        Command::Admin { action } => admin::run(action, &dir, &config),
    }
}

async fn serve(
    dir: PathBuf,
    mut config: ServerConfig,
    listen: Option<SocketAddr>,
    ephemeral: bool,
) -> Result<()> {
    if let Some(addr) = listen {
        config.listen_addr = addr;
    }

    let services = if ephemeral {
        SpoolerServices::ephemeral(dir, config)?
    } else {
        SpoolerServices::init(dir, config)?
    };

    info!(
        data_dir = %services.data_dir().display(),
        users = services.credentials().user_count()?,
        "Spoolwerk starting"
    );

    let mut server = SpoolServer::from_config(services.config());
    let addr = server.start(services.dispatcher()).await?;
    info!(%addr, "ready; the print server is OFF until a client sends \"start\"");

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    server.stop().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_accepts_listen_override() {
        let cli = Cli::try_parse_from(["spoolwerk", "serve", "--listen", "0.0.0.0:9000"]).unwrap();
        match cli.command {
            Command::Serve { listen, ephemeral } => {
                assert_eq!(listen, Some(SocketAddr::from(([0, 0, 0, 0], 9000))));
                assert!(!ephemeral);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli =
            Cli::try_parse_from(["spoolwerk", "shell", "--data-dir", "/srv/spool"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/srv/spool")));
    }

    #[test]
    fn admin_grant_parses() {
        let cli = Cli::try_parse_from(["spoolwerk", "admin", "grant", "user", "topQueue"]).unwrap();
        assert!(matches!(cli.command, Command::Admin { .. }));
    }
}
