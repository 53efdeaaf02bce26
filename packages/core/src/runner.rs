//! Single-flight runner for the client binary.
//!
//! [`CommandRunner`] owns at most one child process. Each child runs in its
//! own task that buffers stdout, logs stderr line by line and reports a
//! [`CommandOutput`] through a channel once the process exits. The owner then
//! hands that output back to [`CommandRunner::complete`], which frees the slot
//! and turns the output into [`RunnerEvent`]s.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::account::{AccountInfo, parse_account_list};
use crate::command::{CommandKind, Invocation};
use crate::drive::{DriveInfo, parse_drive_list};
use crate::error::{CommandInFlightSnafu, IoResultExt, Result};
use crate::executor::ExecutionContext;
use crate::status::StatusModel;

/// Everything a finished child produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub invocation: Invocation,
    /// `None` when the process was killed by a signal or could not be awaited.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Every successful command other than `status` is followed by a status
    /// check so observers see fresh state.
    pub fn wants_status_recheck(&self) -> bool {
        self.succeeded() && self.invocation.kind != CommandKind::Status
    }

    /// Best available failure description.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Typed result of a finished command.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    AccountsListed(Vec<AccountInfo>),
    StatusUpdated(StatusModel),
    LoginFlowCompleted,
    /// Drive list, or the reason listing failed.
    DrivesListed {
        drives: Vec<DriveInfo>,
        error: Option<String>,
    },
    /// Connect or disconnect exited non-zero.
    CommandFailed {
        invocation: Invocation,
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// Runs one invocation at a time.
pub struct CommandRunner {
    ctx: ExecutionContext,
    in_flight: Option<Invocation>,
    outputs: mpsc::UnboundedSender<CommandOutput>,
}

impl CommandRunner {
    /// Creates a runner and the receiver on which finished outputs arrive.
    pub fn new(ctx: ExecutionContext) -> (Self, mpsc::UnboundedReceiver<CommandOutput>) {
        let (outputs, rx) = mpsc::unbounded_channel();
        (
            Self {
                ctx,
                in_flight: None,
                outputs,
            },
            rx,
        )
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn set_context(&mut self, ctx: ExecutionContext) {
        self.ctx = ctx;
    }

    /// The invocation currently running, if any.
    pub fn in_flight(&self) -> Option<&Invocation> {
        self.in_flight.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    /// Starts `invocation`.
    ///
    /// Fails with [`crate::Error::CommandInFlight`] if another command is still
    /// running; the running command is not affected. Must be called from
    /// within a tokio runtime.
    pub fn dispatch(&mut self, invocation: Invocation) -> Result<()> {
        if let Some(running) = &self.in_flight {
            error!(
                running = ?running.kind,
                requested = ?invocation.kind,
                "command requested while another is in flight"
            );
            return CommandInFlightSnafu {
                running: running.kind,
                requested: invocation.kind,
            }
            .fail();
        }

        let description = self.ctx.describe(&invocation);
        debug!(command = %description, "spawning");
        let child = self
            .ctx
            .command(&invocation)
            .spawn()
            .command_context(description)?;

        let outputs = self.outputs.clone();
        let task_invocation = invocation.clone();
        tokio::spawn(async move {
            let output = collect_output(child, task_invocation).await;
            // The receiver is gone only when the owner shut down.
            let _ = outputs.send(output);
        });

        self.in_flight = Some(invocation);
        Ok(())
    }

    /// Frees the slot for a finished command and interprets its output.
    pub fn complete(&mut self, output: &CommandOutput) -> Vec<RunnerEvent> {
        if self.in_flight.as_ref() != Some(&output.invocation) {
            warn!(
                kind = ?output.invocation.kind,
                "output does not match the command in flight"
            );
        }
        self.in_flight = None;
        interpret(output)
    }
}

/// Turns a finished command into events, according to its kind.
pub fn interpret(output: &CommandOutput) -> Vec<RunnerEvent> {
    let kind = output.invocation.kind;
    debug!(?kind, exit_code = ?output.exit_code, "command finished");

    if !output.succeeded() {
        return match kind {
            CommandKind::ListDrives => vec![RunnerEvent::DrivesListed {
                drives: Vec::new(),
                error: Some(output.failure_message()),
            }],
            kind if kind.supports_elevation() => vec![RunnerEvent::CommandFailed {
                invocation: output.invocation.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr.clone(),
            }],
            _ => {
                warn!(?kind, message = %output.failure_message(), "command failed");
                Vec::new()
            }
        };
    }

    match kind {
        CommandKind::Status => match StatusModel::parse(&output.stdout) {
            Ok(status) => vec![RunnerEvent::StatusUpdated(status)],
            Err(e) => {
                warn!(error = %e, "ignoring unreadable status output");
                Vec::new()
            }
        },
        CommandKind::ListAccounts => {
            vec![RunnerEvent::AccountsListed(parse_account_list(&output.stdout))]
        }
        CommandKind::ListDrives => vec![RunnerEvent::DrivesListed {
            drives: parse_drive_list(&output.stdout),
            error: None,
        }],
        kind if kind.is_login_flow() => vec![RunnerEvent::LoginFlowCompleted],
        _ => {
            if !output.stdout.trim().is_empty() {
                debug!(?kind, stdout = %output.stdout.trim(), "command output");
            }
            Vec::new()
        }
    }
}

/// Waits for `child`, buffering stdout and logging stderr as it arrives.
async fn collect_output(mut child: Child, invocation: Invocation) -> CommandOutput {
    let kind = invocation.kind;
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let read_stdout = async {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stdout_pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                warn!(error = %e, "failed to read stdout");
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    };

    let read_stderr = async {
        let mut collected = String::new();
        if let Some(pipe) = stderr_pipe {
            let mut lines = BufReader::new(pipe).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if !line.is_empty() {
                            debug!(?kind, "stderr: {line}");
                        }
                        collected.push_str(&line);
                        collected.push('\n');
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "failed to read stderr");
                        break;
                    }
                }
            }
        }
        collected
    };

    let (stdout, stderr) = tokio::join!(read_stdout, read_stderr);
    let exit_code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(error = %e, "failed to wait for child");
            None
        }
    };

    CommandOutput {
        invocation,
        exit_code,
        stdout,
        stderr,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use std::path::Path;

    /// Writes a shell script standing in for the client binary and returns a
    /// context that runs it through `sh`.
    pub(crate) fn fake_client(dir: &Path, script: &str) -> ExecutionContext {
        let path = dir.join("fake-tailscale.sh");
        std::fs::write(&path, script).unwrap();
        ExecutionContext::new("sh")
            .with_global_args([path.display().to_string()])
            .with_wrapper("env")
    }

    fn output(invocation: Invocation, exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            invocation,
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_interpret_status() {
        let out = output(
            Invocation::status(),
            0,
            r#"{"Self":{"UserID":5},"User":{"5":{"ID":5}},"Health":[]}"#,
            "",
        );
        let events = interpret(&out);

        assert!(matches!(&events[..], [RunnerEvent::StatusUpdated(s)] if s.user.id == 5));
        assert!(!out.wants_status_recheck());
    }

    #[test]
    fn test_interpret_unreadable_status() {
        let out = output(Invocation::status(), 0, "not json", "");
        assert!(interpret(&out).is_empty());
    }

    #[test]
    fn test_interpret_drive_failure() {
        let out = output(
            Invocation::list_drives(),
            1,
            "",
            "Taildrive is not enabled for this node\n",
        );
        let events = interpret(&out);

        assert_eq!(
            events,
            vec![RunnerEvent::DrivesListed {
                drives: Vec::new(),
                error: Some("Taildrive is not enabled for this node".to_string()),
            }]
        );
    }

    #[test]
    fn test_interpret_connect_failure() {
        let inv = Invocation::down();
        let out = output(inv.clone(), 1, "", "Access denied");
        let events = interpret(&out);

        assert_eq!(
            events,
            vec![RunnerEvent::CommandFailed {
                invocation: inv,
                exit_code: Some(1),
                stderr: "Access denied".to_string(),
            }]
        );
    }

    #[test]
    fn test_interpret_other_failures_are_silent() {
        let out = output(Invocation::switch_account("6b1f"), 1, "", "no such profile");
        assert!(interpret(&out).is_empty());
        assert!(!out.wants_status_recheck());
    }

    #[test]
    fn test_interpret_login_and_recheck() {
        let out = output(Invocation::login(), 0, "Success.", "");
        assert_eq!(interpret(&out), vec![RunnerEvent::LoginFlowCompleted]);
        assert!(out.wants_status_recheck());

        let out = output(Invocation::logout(), 0, "", "");
        assert_eq!(interpret(&out), vec![RunnerEvent::LoginFlowCompleted]);
    }

    #[test]
    fn test_failure_message_fallbacks() {
        assert_eq!(
            output(Invocation::list_drives(), 3, "", "").failure_message(),
            "exit code 3"
        );
        assert_eq!(
            output(Invocation::list_drives(), 3, " usage ", "").failure_message(),
            "usage"
        );
    }

    #[tokio::test]
    async fn test_dispatch_collects_output() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake_client(
            dir.path(),
            "echo \"$@\" >&2\necho '{\"Version\":\"1.2.3-x\"}'\n",
        );
        let (mut runner, mut rx) = CommandRunner::new(ctx);

        runner.dispatch(Invocation::status()).unwrap();
        assert!(!runner.is_idle());

        let out = rx.recv().await.unwrap();
        assert!(out.succeeded());
        assert_eq!(out.stderr.trim(), "status --json");

        let events = runner.complete(&out);
        assert!(runner.is_idle());
        assert!(matches!(&events[..], [RunnerEvent::StatusUpdated(s)] if s.version == "1.2.3-x"));
    }

    #[tokio::test]
    async fn test_second_dispatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        // Blocks until the marker file appears, standing in for a hung client.
        let marker = dir.path().join("release");
        let script = format!(
            "while [ ! -e '{}' ]; do sleep 0.05; done\necho '{{}}'\n",
            marker.display()
        );
        let ctx = fake_client(dir.path(), &script);
        let (mut runner, mut rx) = CommandRunner::new(ctx);

        runner.dispatch(Invocation::status()).unwrap();
        let err = runner.dispatch(Invocation::down()).unwrap_err();

        assert!(matches!(
            err,
            Error::CommandInFlight {
                running: CommandKind::Status,
                requested: CommandKind::Disconnect
            }
        ));
        assert_eq!(runner.in_flight().map(|i| i.kind), Some(CommandKind::Status));

        std::fs::write(&marker, "").unwrap();
        let out = rx.recv().await.unwrap();
        assert_eq!(out.invocation.kind, CommandKind::Status);
        runner.complete(&out);
        assert!(runner.is_idle());

        // Only the first command ever produced output.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_runner_idle() {
        let ctx = ExecutionContext::new("/nonexistent/tailscale-binary");
        let (mut runner, _rx) = CommandRunner::new(ctx);

        let err = runner.dispatch(Invocation::status()).unwrap_err();
        assert!(matches!(err, Error::CommandExecution { .. }));
        assert!(runner.is_idle());
    }

    #[tokio::test]
    async fn test_non_zero_exit_code_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake_client(dir.path(), "echo denied >&2\nexit 1\n");
        let (mut runner, mut rx) = CommandRunner::new(ctx);

        runner.dispatch(Invocation::down()).unwrap();
        let out = rx.recv().await.unwrap();

        assert_eq!(out.exit_code, Some(1));
        assert!(matches!(
            &runner.complete(&out)[..],
            [RunnerEvent::CommandFailed { stderr, .. }] if stderr.trim() == "denied"
        ));
    }
}
