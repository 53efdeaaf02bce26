//! Connectivity state machine.
//!
//! [`StateMachine`] owns the current [`StatusModel`] and reduces status,
//! account, drive and reachability events into a [`ConnectivityState`].
//! Side effects are returned as [`Effect`]s for the caller to execute, so the
//! machine itself never touches a process.

use std::time::Duration;

use tracing::{debug, info};

use crate::account::AccountInfo;
use crate::command::Invocation;
use crate::drive::DriveInfo;
use crate::status::StatusModel;

/// High-level state shown by the tray, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConnectivityState {
    /// Nothing is known yet.
    #[default]
    NoAccount,
    NotLoggedIn,
    NotConnected,
    Connected,
    /// Connected, and this device either offers or uses an exit node.
    ConnectedViaExitNode,
}

impl ConnectivityState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::ConnectedViaExitNode)
    }
}

/// Network reachability as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Online,
    Offline,
}

/// Work the caller must perform after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Run(Invocation),
    /// Run after the delay has elapsed.
    RunAfter(Duration, Invocation),
}

/// Derives the connectivity state from a status.
///
/// - no user (`id <= 0`): `NotLoggedIn`
/// - health warnings present: `NotConnected`
/// - otherwise connected, via exit node when one is offered or used
pub fn connectivity_for(status: &StatusModel) -> ConnectivityState {
    if !status.is_logged_in() {
        ConnectivityState::NotLoggedIn
    } else if !status.health.is_empty() {
        ConnectivityState::NotConnected
    } else if status.exit_node_active() {
        ConnectivityState::ConnectedViaExitNode
    } else {
        ConnectivityState::Connected
    }
}

/// Receives state notifications. Implemented by tray, settings and drive
/// views. Observers may be told the same state more than once.
pub trait StateObserver: Send {
    fn state_changed(&mut self, state: ConnectivityState, status: &StatusModel);

    fn accounts_listed(&mut self, _accounts: &[AccountInfo]) {}

    fn drives_listed(&mut self, _drives: &[DriveInfo], _error: Option<&str>) {}

    fn login_flow_completed(&mut self) {}
}

/// Owner of the connectivity state and the current status.
#[derive(Default)]
pub struct StateMachine {
    state: ConnectivityState,
    status: StatusModel,
    accounts: Vec<AccountInfo>,
    observers: Vec<Box<dyn StateObserver>>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn status(&self) -> &StatusModel {
        &self.status
    }

    pub fn accounts(&self) -> &[AccountInfo] {
        &self.accounts
    }

    pub fn subscribe(&mut self, observer: Box<dyn StateObserver>) {
        self.observers.push(observer);
    }

    /// Replaces the status and moves to the state it implies.
    ///
    /// Drive data comes from a separate command, so when the new status has
    /// no drives the previous list and flag are kept. A logged-out status
    /// keeps nothing from the previous account.
    pub fn apply_status(&mut self, mut status: StatusModel) -> Vec<Effect> {
        let next = connectivity_for(&status);
        if next == ConnectivityState::NotLoggedIn {
            status = status.without_account();
        } else if status.drives.is_empty() {
            status.drives = std::mem::take(&mut self.status.drives);
            status.drives_configured = self.status.drives_configured;
        }
        self.status = status;
        self.transition(next)
    }

    /// Caches a new account list. Never changes state.
    pub fn apply_accounts(&mut self, accounts: Vec<AccountInfo>) {
        debug!(count = accounts.len(), "accounts listed");
        self.accounts = accounts;
        for observer in &mut self.observers {
            observer.accounts_listed(&self.accounts);
        }
    }

    /// Applies a drive-list result. Never changes state.
    ///
    /// On error only the configured flag is cleared; the known drives stay.
    pub fn apply_drives(&mut self, drives: Vec<DriveInfo>, error: Option<String>) {
        if let Some(message) = error {
            info!(%message, "drive listing failed");
            self.status.drives_configured = false;
            for observer in &mut self.observers {
                observer.drives_listed(&self.status.drives, Some(message.as_str()));
            }
            return;
        }

        self.status.drives = drives;
        self.status.drives_configured = true;
        self.notify_state();
        for observer in &mut self.observers {
            observer.drives_listed(&self.status.drives, None);
        }
    }

    /// Records a drive that has been requested but not yet confirmed by a
    /// drive list. An entry with the same name is replaced.
    pub fn add_pending_drive(&mut self, drive: DriveInfo) {
        match self.status.drives.iter_mut().find(|d| d.name == drive.name) {
            Some(existing) => *existing = drive,
            None => self.status.drives.push(drive),
        }
        for observer in &mut self.observers {
            observer.drives_listed(&self.status.drives, None);
        }
    }

    /// Drops a drive from the local list ahead of confirmation.
    pub fn forget_drive(&mut self, name: &str) {
        self.status.drives.retain(|d| d.name != name);
        for observer in &mut self.observers {
            observer.drives_listed(&self.status.drives, None);
        }
    }

    pub fn login_flow_completed(&mut self) {
        for observer in &mut self.observers {
            observer.login_flow_completed();
        }
    }

    /// Reacts to the platform's reachability signal.
    ///
    /// Going offline forces `NotConnected` (once). Coming back online lists
    /// accounts, then checks status after `settle` so the client has time to
    /// notice the network itself.
    pub fn reachability_changed(&mut self, reachability: Reachability, settle: Duration) -> Vec<Effect> {
        match reachability {
            Reachability::Online => vec![
                Effect::Run(Invocation::list_accounts()),
                Effect::RunAfter(settle, Invocation::status()),
            ],
            Reachability::Offline if self.state != ConnectivityState::NotConnected => {
                self.transition(ConnectivityState::NotConnected)
            }
            Reachability::Offline => Vec::new(),
        }
    }

    fn transition(&mut self, next: ConnectivityState) -> Vec<Effect> {
        let previous = self.state;
        self.state = next;
        if previous != next {
            info!(from = ?previous, to = ?next, "connectivity changed");
        }

        self.notify_state();

        if next.is_connected() && !previous.is_connected() {
            vec![Effect::Run(Invocation::list_drives())]
        } else {
            Vec::new()
        }
    }

    fn notify_state(&mut self) {
        for observer in &mut self.observers {
            observer.state_changed(self.state, &self.status);
        }
    }
}
