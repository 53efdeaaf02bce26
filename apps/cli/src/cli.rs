use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Tray controller for the tailscale client, usable from a terminal.
#[derive(Debug, Parser)]
#[command(name = "tailtray")]
#[command(about = "Control the tailscale client the way the tray does", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, env = "TAILTRAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Client binary to run instead of the configured one
    #[arg(long, global = true)]
    pub binary: Option<String>,

    /// Retry with elevated privileges without asking
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show connection state and device details
    Status,

    /// Connect using the configured preferences
    Up,

    /// Disconnect
    Down,

    /// List known accounts
    Accounts,

    /// Switch to another account
    Switch {
        /// Account ID as shown by `accounts`
        id: String,
    },

    /// Start the interactive login flow
    Login,

    /// Log out of the current account
    Logout,

    /// Manage shared drives
    Drive {
        #[command(subcommand)]
        action: DriveAction,
    },

    /// Keep running, polling status until interrupted
    Watch {
        /// Seconds between status checks
        #[arg(long, default_value_t = 5)]
        poll: u64,
    },
}

#[derive(Debug, Subcommand)]
pub enum DriveAction {
    /// List shared drives
    List,

    /// Share a local directory
    Add {
        name: String,
        path: PathBuf,
    },

    /// Stop sharing a drive
    Remove { name: String },
}
