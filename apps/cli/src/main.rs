//! tailtray CLI - Drive the tailscale client from a terminal.
//!
//! One-shot subcommands issue a single request, wait for every follow-up
//! command (status re-checks, drive listing, elevated retries) and exit.
//! `watch` keeps the supervisor running and polls status until Ctrl-C.

mod cli;
mod console;
mod error;

use std::time::Duration;

use clap::Parser;
use snafu::ResultExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tailtray_core::{DriveInfo, ElevationPrompt, Settings, Supervisor, SupervisorHandle};

use crate::cli::{Cli, Command, DriveAction, GlobalOpts};
use crate::console::{ConsoleObserver, ConsolePrompt};
use crate::error::{CliError, LoadSettingsSnafu, SupervisorSnafu};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", snafu::Report::from_error(err));
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

fn load_settings(global: &GlobalOpts) -> Result<Settings, CliError> {
    let mut settings = match &global.config {
        Some(path) => Settings::load(path),
        None => Settings::load_default(),
    }
    .context(LoadSettingsSnafu)?;

    if let Some(binary) = &global.binary {
        settings.binary = binary.clone();
    }
    Ok(settings)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let settings = load_settings(&cli.global)?;
    let (mut supervisor, handle) = Supervisor::new(settings, ConsolePrompt::new(cli.global.yes));
    supervisor.subscribe(Box::new(ConsoleObserver::default()));

    debug!(command = ?cli.command, "dispatching command");
    let show_status = matches!(cli.command, Command::Status);
    match cli.command {
        Command::Watch { poll } => return watch(supervisor, handle, poll).await,
        Command::Status => handle.check_status(),
        Command::Up => handle.start(),
        Command::Down => handle.stop(),
        Command::Accounts => handle.list_accounts(),
        Command::Switch { id } => handle.switch_account(id),
        Command::Login => handle.login(),
        Command::Logout => handle.logout(),
        Command::Drive { action } => match action {
            DriveAction::List => handle.list_drives(),
            DriveAction::Add { name, path } => {
                handle.add_drive(DriveInfo::new(name, path.display().to_string()));
            }
            DriveAction::Remove { name } => handle.remove_drive(DriveInfo::new(name, "")),
        },
    }

    supervisor.run_until_idle().await;

    if show_status {
        console::print_status(supervisor.state(), supervisor.status());
    }
    Ok(())
}

async fn watch<P>(
    supervisor: Supervisor<P>,
    handle: SupervisorHandle,
    poll: u64,
) -> Result<(), CliError>
where
    P: ElevationPrompt + 'static,
{
    let task = tokio::spawn(supervisor.run());
    let mut ticker = tokio::time::interval(Duration::from_secs(poll.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => handle.check_status(),
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    handle.shutdown();
    task.await.context(SupervisorSnafu)
}
