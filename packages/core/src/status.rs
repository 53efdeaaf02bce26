//! Status model parsed from `tailscale status --json`.
//!
//! Parsing is split in two:
//!
//! - [`StatusModel::parse`] takes the raw stdout and fails only when it is not
//!   a JSON object at all.
//! - [`StatusModel::from_json`] is total: every missing or mistyped field
//!   falls back to an empty value.

use serde_json::{Map, Value};
use snafu::ResultExt;

use crate::drive::DriveInfo;
use crate::error::{Result, StatusParseSnafu, StatusShapeSnafu};
use crate::json::{
    read_bool, read_bool_any, read_i64, read_object, read_str, read_str_any, read_str_list,
};

/// A node on the tailnet: either this device or one of its peers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub host_name: String,
    pub dns_name: String,
    pub os: String,
    /// Tailnet addresses, IPv4 first as reported.
    pub addresses: Vec<String>,
    pub online: bool,
    /// Traffic is currently routed through this node.
    pub exit_node: bool,
    /// This node offers itself as an exit node.
    pub exit_node_option: bool,
}

impl DeviceInfo {
    fn from_json(obj: &Map<String, Value>) -> Self {
        Self {
            id: read_str(obj, "ID"),
            host_name: read_str(obj, "HostName"),
            dns_name: read_str(obj, "DNSName"),
            os: read_str(obj, "OS"),
            addresses: read_str_list(obj, "TailscaleIPs"),
            online: read_bool(obj, "Online"),
            exit_node: read_bool(obj, "ExitNode"),
            exit_node_option: read_bool(obj, "ExitNodeOption"),
        }
    }
}

/// The account that is logged in on this device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    /// Zero when nobody is logged in.
    pub id: i64,
    pub login_name: String,
    pub display_name: String,
    pub profile_pic_url: String,
}

impl UserInfo {
    fn from_json(obj: &Map<String, Value>) -> Self {
        Self {
            id: read_i64(obj, "ID"),
            login_name: read_str(obj, "LoginName"),
            display_name: read_str(obj, "DisplayName"),
            profile_pic_url: read_str(obj, "ProfilePicURL"),
        }
    }
}

/// Tailnet-wide settings reported alongside the status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailnetInfo {
    pub name: String,
    pub magic_dns_suffix: String,
    pub magic_dns_enabled: bool,
}

impl TailnetInfo {
    fn from_json(obj: &Map<String, Value>) -> Self {
        Self {
            name: read_str(obj, "Name"),
            magic_dns_suffix: read_str_any(obj, &["MagicDNSSuffix", "MagicDnsSuffix"]),
            magic_dns_enabled: read_bool_any(obj, &["MagicDNSEnabled", "MagicDnsEnabled"]),
        }
    }
}

/// Everything the tray needs to know about the local client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusModel {
    pub self_device: DeviceInfo,
    pub user: UserInfo,
    pub peers: Vec<DeviceInfo>,
    /// Health warnings. Any entry means connectivity is degraded.
    pub health: Vec<String>,
    /// Raw version string, including the build suffix.
    pub version: String,
    pub backend_state: String,
    pub tailnet: TailnetInfo,
    pub drives: Vec<DriveInfo>,
    /// Whether the last `drive list` succeeded.
    pub drives_configured: bool,
}

impl StatusModel {
    /// Parses raw `status --json` output.
    pub fn parse(output: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(output).context(StatusParseSnafu)?;
        match value {
            Value::Object(obj) => Ok(Self::from_json(&obj)),
            other => StatusShapeSnafu {
                found: json_kind(&other),
            }
            .fail(),
        }
    }

    /// Builds a model from a status object. Never fails.
    pub fn from_json(obj: &Map<String, Value>) -> Self {
        let self_obj = read_object(obj, "Self");
        let self_device = self_obj.map(DeviceInfo::from_json).unwrap_or_default();
        let user = active_user(obj, self_obj);

        let peers = read_object(obj, "Peer")
            .map(|peers| {
                peers
                    .values()
                    .filter_map(Value::as_object)
                    .map(DeviceInfo::from_json)
                    .collect()
            })
            .unwrap_or_default();

        let drives: Vec<DriveInfo> = obj
            .get("Drives")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(DriveInfo::from_json)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            self_device,
            user,
            peers,
            health: read_str_list(obj, "Health"),
            version: read_str(obj, "Version"),
            backend_state: read_str(obj, "BackendState"),
            tailnet: read_object(obj, "CurrentTailnet")
                .map(TailnetInfo::from_json)
                .unwrap_or_default(),
            drives_configured: !drives.is_empty(),
            drives,
        }
    }

    /// True when an account is logged in (`user.id > 0`).
    pub fn is_logged_in(&self) -> bool {
        self.user.id > 0
    }

    /// The peer currently used as exit node, if any.
    pub fn exit_node_in_use(&self) -> Option<&DeviceInfo> {
        self.peers.iter().find(|p| p.exit_node)
    }

    /// Whether traffic goes through an exit node or this device offers one.
    pub fn exit_node_active(&self) -> bool {
        self.self_device.exit_node_option || self.exit_node_in_use().is_some()
    }

    /// Version formatted for display, without the build suffix.
    pub fn display_version(&self) -> String {
        display_version(&self.version)
    }

    /// Drops everything tied to an account (device, user, peers, tailnet and
    /// drives), keeping what describes the local daemon.
    pub fn without_account(self) -> Self {
        Self {
            health: self.health,
            version: self.version,
            backend_state: self.backend_state,
            ..Self::default()
        }
    }
}

/// Formats a raw version string as `Version <x.y.z>`.
///
/// Everything from the first `-` on is a build suffix and is dropped.
pub fn display_version(raw: &str) -> String {
    let short = raw.split_once('-').map_or(raw, |(head, _)| head);
    format!("Version {short}")
}

/// Resolves the logged-in user.
///
/// `User` is normally a map keyed by user id, with `Self.UserID` selecting
/// the active entry. A bare user object (one with an `ID` key) is accepted
/// as well.
fn active_user(obj: &Map<String, Value>, self_obj: Option<&Map<String, Value>>) -> UserInfo {
    let Some(users) = read_object(obj, "User") else {
        return UserInfo::default();
    };
    if users.contains_key("ID") {
        return UserInfo::from_json(users);
    }

    let user_id = self_obj.map(|s| read_i64(s, "UserID")).unwrap_or(0);
    if user_id <= 0 {
        return UserInfo::default();
    }
    read_object(users, &user_id.to_string())
        .map(UserInfo::from_json)
        .unwrap_or_default()
}

fn json_kind(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}
