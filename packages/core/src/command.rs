//! Argument templates for every command sent to the client binary.

use crate::drive::DriveInfo;
use crate::settings::{ExitNodeSetting, Settings};

/// Kind of command, used to pick how its output is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ListAccounts,
    SwitchAccount,
    Login,
    Logout,
    Connect,
    Disconnect,
    Status,
    ListDrives,
    AddDrive,
    RemoveDrive,
}

impl CommandKind {
    /// Connect and disconnect fail when the user is not an operator, which
    /// an elevated retry can fix.
    pub fn supports_elevation(self) -> bool {
        matches!(self, Self::Connect | Self::Disconnect)
    }

    /// Whether this kind is one of the login-flow commands.
    pub fn is_login_flow(self) -> bool {
        matches!(self, Self::Login | Self::Logout)
    }
}

/// A fully prepared command: kind, subcommand arguments and whether it runs
/// through the escalation wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: CommandKind,
    /// Arguments after the binary and its global flags.
    pub args: Vec<String>,
    pub escalated: bool,
}

impl Invocation {
    fn new<I, S>(kind: CommandKind, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            args: args.into_iter().map(Into::into).collect(),
            escalated: false,
        }
    }

    /// `status --json`
    pub fn status() -> Self {
        Self::new(CommandKind::Status, ["status", "--json"])
    }

    /// `up` with flags derived from `settings`.
    ///
    /// `operator` is the user allowed to control the daemon afterwards.
    pub fn up(settings: &Settings, operator: &str) -> Self {
        let mut args = vec![
            "up".to_string(),
            "--reset".to_string(),
            "--operator".to_string(),
            operator.to_string(),
        ];

        args.push(flag("--accept-dns", settings.accept_dns));
        args.push(flag("--accept-routes", settings.accept_routes));
        // Shields up blocks incoming connections.
        args.push(flag("--shields-up", !settings.allow_incoming_connections));

        match &settings.exit_node {
            ExitNodeSetting::Advertise => args.push("--advertise-exit-node".to_string()),
            ExitNodeSetting::Use {
                name,
                allow_lan_access,
            } if !name.is_empty() => {
                tracing::debug!(exit_node = %name, "using exit node");
                args.push(format!("--exit-node={name}"));
                args.push(flag("--exit-node-allow-lan-access", *allow_lan_access));
            }
            _ => args.push("--exit-node=".to_string()),
        }

        Self::new(CommandKind::Connect, args)
    }

    /// `down`
    pub fn down() -> Self {
        Self::new(CommandKind::Disconnect, ["down"])
    }

    /// `switch --list`
    pub fn list_accounts() -> Self {
        Self::new(CommandKind::ListAccounts, ["switch", "--list"])
    }

    /// `switch <id>`
    pub fn switch_account(id: &str) -> Self {
        Self::new(CommandKind::SwitchAccount, ["switch", id])
    }

    /// `login`
    pub fn login() -> Self {
        Self::new(CommandKind::Login, ["login"])
    }

    /// `logout`
    pub fn logout() -> Self {
        Self::new(CommandKind::Logout, ["logout"])
    }

    /// `drive list`
    pub fn list_drives() -> Self {
        Self::new(CommandKind::ListDrives, ["drive", "list"])
    }

    /// `drive share <name> <path>`
    pub fn add_drive(drive: &DriveInfo) -> Self {
        Self::new(
            CommandKind::AddDrive,
            ["drive", "share", drive.name.as_str(), drive.path.as_str()],
        )
    }

    /// `drive unshare <name>`
    pub fn remove_drive(drive: &DriveInfo) -> Self {
        Self::new(
            CommandKind::RemoveDrive,
            ["drive", "unshare", drive.name.as_str()],
        )
    }

    /// Same command, routed through the escalation wrapper.
    pub fn escalated(mut self) -> Self {
        self.escalated = true;
        self
    }
}

/// `--name` when enabled, `--name=false` otherwise.
fn flag(name: &str, enabled: bool) -> String {
    if enabled {
        name.to_string()
    } else {
        format!("{name}=false")
    }
}
