//! User settings that shape the `up` command and the supervisor.
//!
//! Settings are read from a TOML file; every field is optional and a missing
//! file yields the defaults. Writing settings back is left to the UI layer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{IoResultExt, Result, SettingsParseSnafu};
use crate::executor::PrivilegeEscalation;

/// Default delay between a network coming back and the status re-check.
pub const DEFAULT_REACHABILITY_SETTLE_MS: u64 = 500;

/// Exit node selection. Advertising and using an exit node are mutually
/// exclusive, so this is one enum rather than two flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExitNodeSetting {
    /// Route traffic directly.
    #[default]
    None,
    /// Offer this device as an exit node to the tailnet.
    Advertise,
    /// Route all traffic through the named peer.
    Use {
        name: String,
        #[serde(default)]
        allow_lan_access: bool,
    },
}

/// Controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name or path of the client binary.
    pub binary: String,
    /// Custom `tailscaled` socket, passed as `--socket=<path>`.
    pub socket: Option<PathBuf>,
    /// Wrapper used when retrying with elevated privileges.
    pub escalation: PrivilegeEscalation,
    /// Operator user for `up --operator`; the current user when unset.
    pub operator: Option<String>,
    /// Use the tailnet's DNS settings.
    pub accept_dns: bool,
    /// Accept subnet routes advertised by peers.
    pub accept_routes: bool,
    /// Allow peers to open connections to this device.
    pub allow_incoming_connections: bool,
    pub exit_node: ExitNodeSetting,
    /// Milliseconds to wait after reachability returns before checking status.
    pub reachability_settle_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            binary: "tailscale".to_string(),
            socket: None,
            escalation: PrivilegeEscalation::default(),
            operator: None,
            accept_dns: true,
            accept_routes: false,
            allow_incoming_connections: true,
            exit_node: ExitNodeSetting::None,
            reachability_settle_ms: DEFAULT_REACHABILITY_SETTLE_MS,
        }
    }
}

impl Settings {
    /// Default settings location: `<config dir>/tail-tray/settings.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tail-tray").join("settings.toml"))
    }

    /// Loads settings from `path`, falling back to defaults if it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).settings_read_context(path)?;
        Self::from_toml(&content).context(SettingsParseSnafu { path })
    }

    /// Loads settings from the default location, or defaults if there is none.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Settle delay after reachability is restored.
    pub fn reachability_settle_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reachability_settle_ms)
    }
}
