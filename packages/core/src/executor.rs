//! Command execution context with privilege escalation support.
//!
//! This module turns an [`Invocation`] into a concrete process: the client
//! binary with its global flags, optionally wrapped in `pkexec` (GUI) or
//! `sudo` (TTY) for the elevated retry path.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::command::Invocation;
use crate::settings::Settings;

/// Privilege escalation method for the elevated retry path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeEscalation {
    /// Never escalate; failed connects are not retried.
    None,
    /// Use `pkexec` for GUI-based privilege escalation (polkit).
    #[default]
    Pkexec,
    /// Use `sudo` for TTY-based privilege escalation.
    Sudo,
}

impl PrivilegeEscalation {
    /// Wrapper program for this method, if any.
    pub fn wrapper(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Pkexec => Some("/usr/bin/pkexec"),
            Self::Sudo => Some("sudo"),
        }
    }
}

/// How to launch the client binary.
///
/// # Example
///
/// ```
/// use tailtray_core::command::Invocation;
/// use tailtray_core::executor::ExecutionContext;
///
/// let ctx = ExecutionContext::new("tailscale");
/// assert_eq!(ctx.argv(&Invocation::status()), ["tailscale", "status", "--json"]);
///
/// let elevated = ctx.argv(&Invocation::down().escalated());
/// assert_eq!(elevated, ["/usr/bin/pkexec", "tailscale", "down"]);
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    binary: String,
    global_args: Vec<String>,
    escalation: PrivilegeEscalation,
    wrapper: Option<String>,
}

impl ExecutionContext {
    /// Creates a context for `binary` with the default escalation method.
    pub fn new(binary: impl Into<String>) -> Self {
        Self::with_escalation(binary, PrivilegeEscalation::default())
    }

    /// Creates a context with a specific escalation method.
    pub fn with_escalation(binary: impl Into<String>, escalation: PrivilegeEscalation) -> Self {
        Self {
            binary: binary.into(),
            global_args: Vec::new(),
            escalation,
            wrapper: escalation.wrapper().map(str::to_string),
        }
    }

    /// Builds the context described by `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let ctx = Self::with_escalation(settings.binary.clone(), settings.escalation);
        match &settings.socket {
            Some(socket) => ctx.with_global_args([format!("--socket={}", socket.display())]),
            None => ctx,
        }
    }

    /// Adds arguments placed between the binary and the subcommand.
    pub fn with_global_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replaces the escalation wrapper program, keeping escalation enabled.
    pub fn with_wrapper(mut self, wrapper: impl Into<String>) -> Self {
        if self.escalation == PrivilegeEscalation::None {
            self.escalation = PrivilegeEscalation::Pkexec;
        }
        self.wrapper = Some(wrapper.into());
        self
    }

    /// Returns the current privilege escalation method.
    pub fn escalation(&self) -> PrivilegeEscalation {
        self.escalation
    }

    /// Whether an elevated retry is possible at all.
    pub fn can_escalate(&self) -> bool {
        self.wrapper.is_some()
    }

    /// Full argument vector, program first.
    ///
    /// Escalated invocations run `<wrapper> <binary> ...` with otherwise
    /// identical arguments. If no wrapper is configured the invocation runs
    /// unwrapped.
    pub fn argv(&self, invocation: &Invocation) -> Vec<String> {
        let mut argv = Vec::with_capacity(invocation.args.len() + self.global_args.len() + 2);
        if invocation.escalated {
            if let Some(wrapper) = &self.wrapper {
                argv.push(wrapper.clone());
            }
        }
        argv.push(self.binary.clone());
        argv.extend(self.global_args.iter().cloned());
        argv.extend(invocation.args.iter().cloned());
        argv
    }

    /// Printable form of [`Self::argv`] for logs and errors.
    pub fn describe(&self, invocation: &Invocation) -> String {
        self.argv(invocation).join(" ")
    }

    /// Builds the process for `invocation` with piped stdout/stderr.
    pub fn command(&self, invocation: &Invocation) -> Command {
        let argv = self.argv(invocation);
        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// Returns the name of the user running this process.
///
/// Looks the uid up in the user database and falls back to `$USER`.
pub fn current_user_name() -> String {
    let uid = nix::unistd::getuid();
    match nix::unistd::User::from_uid(uid) {
        Ok(Some(user)) => user.name,
        _ => std::env::var("USER").unwrap_or_default(),
    }
}
