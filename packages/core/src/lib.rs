//! tailtray-core: Controller core for a desktop mesh-VPN tray client.
//!
//! This library drives the `tailscale` command-line client: it runs one
//! command at a time, parses what comes back and keeps a small connectivity
//! state machine that the tray, settings and drive views observe.
//!
//! # Modules
//!
//! - [`status`]: `status --json` parsing into a [`StatusModel`]
//! - [`account`]: `switch --list` parsing
//! - [`drive`]: Shared-drive records and `drive list` parsing
//! - [`settings`]: User settings loaded from TOML
//! - [`executor`]: Binary, global flags and privilege escalation wrapper
//! - [`command`]: Argument templates for every command
//! - [`runner`]: Single-flight subprocess execution and output interpretation
//! - [`state`]: Connectivity state machine and observers
//! - [`elevation`]: Retry of failed connect/disconnect with elevated privileges
//! - [`supervisor`]: Event loop tying everything together
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use tailtray_core::{Invocation, Settings, Supervisor};
//!
//! # async fn demo() -> tailtray_core::Result<()> {
//! let settings = Settings::load_default()?;
//! let (mut supervisor, handle) =
//!     Supervisor::new(settings, |_: &Invocation| false);
//!
//! handle.check_status();
//! supervisor.run_until_idle().await;
//! println!("{:?}", supervisor.state());
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod command;
pub mod drive;
pub mod elevation;
pub mod error;
pub mod executor;
mod json;
pub mod runner;
pub mod settings;
pub mod state;
pub mod status;
pub mod supervisor;

// Re-export commonly used types
pub use account::AccountInfo;
pub use command::{CommandKind, Invocation};
pub use drive::DriveInfo;
pub use elevation::{ElevationPrompt, RetryWithElevation};
pub use error::{Error, Result};
pub use executor::{ExecutionContext, PrivilegeEscalation};
pub use settings::{ExitNodeSetting, Settings};
pub use state::{ConnectivityState, Reachability, StateMachine, StateObserver};
pub use status::StatusModel;
pub use supervisor::{Request, Supervisor, SupervisorHandle};
