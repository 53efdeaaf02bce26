//! Terminal rendering of state notifications and the elevation prompt.

use tailtray_core::account::active_account;
use tailtray_core::status::display_version;
use tailtray_core::{
    AccountInfo, ConnectivityState, DriveInfo, ElevationPrompt, Invocation, StateObserver,
    StatusModel,
};
use tracing::warn;

/// Prints state changes, account lists and drive lists to stdout.
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    last: Option<ConnectivityState>,
}

impl StateObserver for ConsoleObserver {
    fn state_changed(&mut self, state: ConnectivityState, status: &StatusModel) {
        if self.last == Some(state) {
            return;
        }
        self.last = Some(state);
        println!("{}", describe_state(state, status));
    }

    fn accounts_listed(&mut self, accounts: &[AccountInfo]) {
        if accounts.is_empty() {
            println!("No accounts");
            return;
        }
        for line in account_lines(accounts) {
            println!("{line}");
        }
    }

    fn drives_listed(&mut self, drives: &[DriveInfo], error: Option<&str>) {
        if let Some(error) = error {
            println!("Drive sharing unavailable: {error}");
            return;
        }
        if drives.is_empty() {
            println!("No shared drives");
            return;
        }
        for drive in drives {
            match &drive.share_as {
                Some(user) => println!("{:<16} {} (as {user})", drive.name, drive.path),
                None => println!("{:<16} {}", drive.name, drive.path),
            }
        }
    }

    fn login_flow_completed(&mut self) {
        println!("Login flow finished");
    }
}

/// Account table rows, followed by the active account if one is marked.
pub fn account_lines(accounts: &[AccountInfo]) -> Vec<String> {
    let mut lines: Vec<String> = accounts
        .iter()
        .map(|account| {
            let marker = if account.active { "*" } else { " " };
            format!(
                "{marker} {:<10} {:<30} {}",
                account.id, account.tailnet_name, account.login_name
            )
        })
        .collect();
    if let Some(active) = active_account(accounts) {
        lines.push(format!("Active: {} ({})", active.login_name, active.tailnet_name));
    }
    lines
}

/// One-line summary of a connectivity state.
pub fn describe_state(state: ConnectivityState, status: &StatusModel) -> String {
    match state {
        ConnectivityState::NoAccount => "No account".to_string(),
        ConnectivityState::NotLoggedIn => "Not logged in".to_string(),
        ConnectivityState::NotConnected => {
            if status.health.is_empty() {
                "Not connected".to_string()
            } else {
                format!("Not connected ({})", status.health.join("; "))
            }
        }
        ConnectivityState::Connected => {
            format!("Connected as {}", status.user.login_name)
        }
        ConnectivityState::ConnectedViaExitNode => {
            format!("Connected as {} via exit node", status.user.login_name)
        }
    }
}

/// Multi-line status report for the `status` command.
pub fn print_status(state: ConnectivityState, status: &StatusModel) {
    println!("State:    {}", describe_state(state, status));
    if !status.version.is_empty() {
        println!("Client:   {}", display_version(&status.version));
    }
    if !status.is_logged_in() {
        return;
    }

    let device = &status.self_device;
    println!("Device:   {} ({})", device.host_name, device.addresses.join(", "));
    if !status.tailnet.name.is_empty() {
        println!("Tailnet:  {}", status.tailnet.name);
    }
    let online = status.peers.iter().filter(|p| p.online).count();
    println!("Peers:    {online} online, {} total", status.peers.len());
    for peer in &status.peers {
        let flag = if peer.exit_node { " [exit node]" } else { "" };
        println!(
            "  {:<24} {:<8} {}{flag}",
            peer.host_name,
            if peer.online { "online" } else { "offline" },
            peer.addresses.first().map(String::as_str).unwrap_or("-")
        );
    }
}

/// Asks on the terminal before retrying with elevated privileges.
#[derive(Debug)]
pub struct ConsolePrompt {
    assume_yes: bool,
}

impl ConsolePrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl ElevationPrompt for ConsolePrompt {
    fn confirm_elevation(&mut self, failed: &Invocation) -> bool {
        if self.assume_yes {
            return true;
        }
        let message = format!(
            "`{}` failed. Controlling tailscale requires root or being set as operator. \
             Retry with elevated privileges and set yourself as operator?",
            failed.args.join(" ")
        );
        let answer = run_blocking(|| {
            dialoguer::Confirm::new()
                .with_prompt(message)
                .default(false)
                .interact()
        });
        match answer {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(error = %e, "could not read confirmation");
                false
            }
        }
    }
}

/// Runs a blocking terminal interaction without stalling the other tasks of
/// a multi-threaded runtime. Elsewhere `f` runs in place.
fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}
