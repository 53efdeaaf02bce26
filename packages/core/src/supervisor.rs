//! Event loop tying the runner, the state machine and the retry policy
//! together.
//!
//! The [`Supervisor`] is the single owner of all mutable state. Collaborators
//! talk to it through a cloneable [`SupervisorHandle`]; finished processes and
//! timers report back through channels, so every event is handled in issue
//! order on one task.
//!
//! Requests from collaborators are dispatched immediately and rejected if a
//! command is already running. Follow-up work the supervisor generates
//! itself (status re-checks, drive listing, retries, delayed checks) is queued
//! and started one at a time whenever the runner is idle.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::command::{CommandKind, Invocation};
use crate::drive::DriveInfo;
use crate::elevation::{ElevationPrompt, RetryDecision, RetryWithElevation};
use crate::error::Error;
use crate::executor::{ExecutionContext, current_user_name};
use crate::runner::{CommandOutput, CommandRunner, RunnerEvent};
use crate::settings::Settings;
use crate::state::{ConnectivityState, Effect, Reachability, StateMachine, StateObserver};
use crate::status::StatusModel;

/// Commands collaborators can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CheckStatus,
    Start,
    Stop,
    ListAccounts,
    SwitchAccount(String),
    Login,
    Logout,
    ListDrives,
    AddDrive(DriveInfo),
    RemoveDrive(DriveInfo),
    Reachability(Reachability),
    ApplySettings(Settings),
    Shutdown,
}

/// Cloneable sender side of a [`Supervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl SupervisorHandle {
    /// Queues a request. Returns false once the supervisor is gone.
    pub fn send(&self, request: Request) -> bool {
        self.tx.send(request).is_ok()
    }

    pub fn check_status(&self) {
        self.send(Request::CheckStatus);
    }

    pub fn start(&self) {
        self.send(Request::Start);
    }

    pub fn stop(&self) {
        self.send(Request::Stop);
    }

    pub fn list_accounts(&self) {
        self.send(Request::ListAccounts);
    }

    pub fn switch_account(&self, id: impl Into<String>) {
        self.send(Request::SwitchAccount(id.into()));
    }

    pub fn login(&self) {
        self.send(Request::Login);
    }

    pub fn logout(&self) {
        self.send(Request::Logout);
    }

    pub fn list_drives(&self) {
        self.send(Request::ListDrives);
    }

    pub fn add_drive(&self, drive: DriveInfo) {
        self.send(Request::AddDrive(drive));
    }

    pub fn remove_drive(&self, drive: DriveInfo) {
        self.send(Request::RemoveDrive(drive));
    }

    pub fn reachability_changed(&self, reachability: Reachability) {
        self.send(Request::Reachability(reachability));
    }

    pub fn apply_settings(&self, settings: Settings) {
        self.send(Request::ApplySettings(settings));
    }

    pub fn shutdown(&self) {
        self.send(Request::Shutdown);
    }
}

/// Owner of the controller state. See the module docs.
pub struct Supervisor<P> {
    settings: Settings,
    runner: CommandRunner,
    outputs: mpsc::UnboundedReceiver<CommandOutput>,
    machine: StateMachine,
    retry: RetryWithElevation<P>,
    follow_ups: VecDeque<Invocation>,
    requests: mpsc::UnboundedReceiver<Request>,
    requests_closed: bool,
    timer_tx: mpsc::UnboundedSender<Invocation>,
    timer_rx: mpsc::UnboundedReceiver<Invocation>,
    timers_pending: usize,
    shutdown: bool,
}

impl<P: ElevationPrompt> Supervisor<P> {
    /// Creates a supervisor running the binary described by `settings`.
    pub fn new(settings: Settings, prompt: P) -> (Self, SupervisorHandle) {
        let ctx = ExecutionContext::from_settings(&settings);
        Self::with_context(settings, ctx, prompt)
    }

    /// Creates a supervisor with an explicit execution context.
    pub fn with_context(
        settings: Settings,
        ctx: ExecutionContext,
        prompt: P,
    ) -> (Self, SupervisorHandle) {
        let retry = RetryWithElevation::new(prompt, ctx.can_escalate());
        let (runner, outputs) = CommandRunner::new(ctx);
        let (tx, requests) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let supervisor = Self {
            settings,
            runner,
            outputs,
            machine: StateMachine::new(),
            retry,
            follow_ups: VecDeque::new(),
            requests,
            requests_closed: false,
            timer_tx,
            timer_rx,
            timers_pending: 0,
            shutdown: false,
        };
        (supervisor, SupervisorHandle { tx })
    }

    pub fn subscribe(&mut self, observer: Box<dyn StateObserver>) {
        self.machine.subscribe(observer);
    }

    pub fn state(&self) -> ConnectivityState {
        self.machine.state()
    }

    pub fn status(&self) -> &StatusModel {
        self.machine.status()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// No command running, queued or scheduled.
    pub fn is_idle(&self) -> bool {
        self.runner.is_idle() && self.follow_ups.is_empty() && self.timers_pending == 0
    }

    /// Runs until [`Request::Shutdown`], or until every handle is dropped and
    /// the remaining work is done.
    pub async fn run(mut self) {
        while !self.shutdown {
            if self.requests_closed && self.is_idle() {
                break;
            }
            self.step().await;
        }
        debug!("supervisor stopped");
    }

    /// Processes events until no request, command, follow-up or timer is
    /// pending.
    pub async fn run_until_idle(&mut self) {
        loop {
            while let Ok(request) = self.requests.try_recv() {
                self.handle_request(request);
                self.pump();
            }
            if self.shutdown || self.is_idle() {
                break;
            }
            self.step().await;
        }
    }

    async fn step(&mut self) {
        tokio::select! {
            Some(output) = self.outputs.recv() => self.handle_output(output),
            Some(invocation) = self.timer_rx.recv() => {
                self.timers_pending = self.timers_pending.saturating_sub(1);
                self.follow_ups.push_back(invocation);
            }
            request = self.requests.recv(), if !self.requests_closed => match request {
                Some(request) => self.handle_request(request),
                None => self.requests_closed = true,
            },
        }
        self.pump();
    }

    fn handle_request(&mut self, request: Request) {
        debug!(?request, "request");
        match request {
            Request::CheckStatus => {
                self.run_now(Invocation::status());
            }
            Request::Start => {
                let up = self.up_invocation();
                self.run_now(up);
            }
            Request::Stop => {
                self.run_now(Invocation::down());
            }
            Request::ListAccounts => {
                self.run_now(Invocation::list_accounts());
            }
            Request::SwitchAccount(id) => {
                self.run_now(Invocation::switch_account(&id));
            }
            Request::Login => {
                self.run_now(Invocation::login());
            }
            Request::Logout => {
                self.run_now(Invocation::logout());
            }
            Request::ListDrives => {
                self.run_now(Invocation::list_drives());
            }
            Request::AddDrive(drive) => {
                if self.run_now(Invocation::add_drive(&drive)) {
                    self.machine.add_pending_drive(drive);
                }
            }
            Request::RemoveDrive(drive) => {
                if self.run_now(Invocation::remove_drive(&drive)) {
                    self.machine.forget_drive(&drive.name);
                }
            }
            Request::Reachability(reachability) => {
                info!(?reachability, "reachability changed");
                let effects = self
                    .machine
                    .reachability_changed(reachability, self.settings.reachability_settle_delay());
                self.apply_effects(effects);
            }
            Request::ApplySettings(settings) => {
                let ctx = ExecutionContext::from_settings(&settings);
                self.retry.set_enabled(ctx.can_escalate());
                self.runner.set_context(ctx);
                self.settings = settings;
            }
            Request::Shutdown => self.shutdown = true,
        }
    }

    fn handle_output(&mut self, output: CommandOutput) {
        let events = self.runner.complete(&output);

        if output.wants_status_recheck() {
            self.follow_ups.push_back(Invocation::status());
        }
        if output.succeeded()
            && matches!(
                output.invocation.kind,
                CommandKind::AddDrive | CommandKind::RemoveDrive
            )
        {
            self.follow_ups.push_back(Invocation::list_drives());
        }

        for event in events {
            match event {
                RunnerEvent::StatusUpdated(status) => {
                    let effects = self.machine.apply_status(status);
                    self.apply_effects(effects);
                }
                RunnerEvent::AccountsListed(accounts) => self.machine.apply_accounts(accounts),
                RunnerEvent::LoginFlowCompleted => {
                    self.machine.login_flow_completed();
                    let up = self.up_invocation();
                    self.follow_ups.push_back(up);
                }
                RunnerEvent::DrivesListed { drives, error } => {
                    self.machine.apply_drives(drives, error);
                }
                RunnerEvent::CommandFailed {
                    invocation,
                    exit_code,
                    stderr,
                } => {
                    warn!(
                        kind = ?invocation.kind,
                        escalated = invocation.escalated,
                        ?exit_code,
                        stderr = %stderr.trim(),
                        "command failed"
                    );
                    if let RetryDecision::Retry(retry) = self.retry.on_failure(&invocation) {
                        info!(kind = ?retry.kind, "retrying with elevated privileges");
                        self.follow_ups.push_back(retry);
                    }
                }
            }
        }
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Run(invocation) => self.follow_ups.push_back(invocation),
                Effect::RunAfter(delay, invocation) => {
                    self.timers_pending += 1;
                    let tx = self.timer_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(invocation);
                    });
                }
            }
        }
    }

    /// Starts the next queued follow-up if the runner is free.
    fn pump(&mut self) {
        while self.runner.is_idle() {
            let Some(next) = self.follow_ups.pop_front() else {
                break;
            };
            if let Err(e) = self.runner.dispatch(next) {
                warn!(error = %e, "follow-up command not started");
            }
        }
    }

    /// Dispatches a collaborator request right away.
    fn run_now(&mut self, invocation: Invocation) -> bool {
        let kind = invocation.kind;
        match self.runner.dispatch(invocation) {
            Ok(()) => true,
            // Already logged by the runner.
            Err(Error::CommandInFlight { .. }) => false,
            Err(e) => {
                warn!(?kind, error = %e, "request not started");
                false
            }
        }
    }

    fn up_invocation(&self) -> Invocation {
        let operator = self
            .settings
            .operator
            .clone()
            .unwrap_or_else(current_user_name);
        Invocation::up(&self.settings, &operator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::fake_client;
    use crate::state::tests::{Recorder, Seen};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LOGGED_IN_STATUS: &str =
        r#"{"Self":{"UserID":5,"HostName":"laptop"},"User":{"5":{"ID":5,"LoginName":"a@b.c"}},"Health":[]}"#;

    /// Fake client logging each invocation's arguments to `calls.log`.
    fn client_script(dir: &Path, body: &str) -> String {
        format!(
            "echo \"$*\" >> '{}'\n{}\n",
            dir.join("calls.log").display(),
            body
        )
    }

    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn test_settings() -> Settings {
        Settings {
            operator: Some("tester".to_string()),
            reachability_settle_ms: 20,
            ..Settings::default()
        }
    }

    fn supervisor<P: ElevationPrompt>(
        dir: &Path,
        body: &str,
        prompt: P,
    ) -> (Supervisor<P>, SupervisorHandle, Recorder) {
        let ctx = fake_client(dir, &client_script(dir, body));
        let (mut supervisor, handle) = Supervisor::with_context(test_settings(), ctx, prompt);
        let recorder = Recorder::default();
        supervisor.subscribe(Box::new(recorder.clone()));
        (supervisor, handle, recorder)
    }

    fn never_prompted() -> impl ElevationPrompt {
        |_: &Invocation| -> bool { panic!("unexpected elevation prompt") }
    }

    #[tokio::test]
    async fn test_connected_status_lists_drives() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "case \"$1\" in\n  status) echo '{LOGGED_IN_STATUS}' ;;\n  drive) printf 'name path as\\n---- ---- --\\ndocs /d   a\\n' ;;\nesac"
        );
        let (mut supervisor, handle, recorder) = supervisor(dir.path(), &body, never_prompted());

        handle.check_status();
        supervisor.run_until_idle().await;

        assert_eq!(supervisor.state(), ConnectivityState::Connected);
        assert_eq!(
            calls(dir.path()),
            ["status --json", "drive list", "status --json"]
        );
        assert_eq!(supervisor.status().drives, vec![DriveInfo {
            name: "docs".to_string(),
            path: "/d".to_string(),
            share_as: Some("a".to_string()),
        }]);
        assert!(supervisor.status().drives_configured);
        assert!(recorder
            .seen()
            .contains(&Seen::Drives(vec!["docs".to_string()], None)));
    }

    #[tokio::test]
    async fn test_failed_up_retries_once_with_elevation() {
        let dir = tempfile::tempdir().unwrap();
        let body = "case \"$1\" in\n  up) echo 'access denied' >&2; exit 1 ;;\nesac";
        let asked = Arc::new(AtomicUsize::new(0));
        let prompt_count = asked.clone();
        let (mut supervisor, handle, _recorder) = supervisor(dir.path(), body, move |_: &Invocation| {
            prompt_count.fetch_add(1, Ordering::SeqCst);
            true
        });

        handle.start();
        supervisor.run_until_idle().await;

        let calls = calls(dir.path());
        assert_eq!(calls.len(), 2, "one normal and one elevated attempt: {calls:?}");
        assert!(calls.iter().all(|c| c.starts_with("up --reset --operator tester")));
        assert_eq!(asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_elevated_retry_success_rechecks_status() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("elevated");
        let body = format!(
            "case \"$1\" in\n  up) if [ -e '{m}' ]; then exit 0; fi; touch '{m}'; exit 1 ;;\n  status) echo '{{}}' ;;\nesac",
            m = marker.display()
        );
        let (mut supervisor, handle, _recorder) =
            supervisor(dir.path(), &body, |_: &Invocation| true);

        handle.start();
        supervisor.run_until_idle().await;

        let calls = calls(dir.path());
        assert_eq!(calls.len(), 3, "{calls:?}");
        assert_eq!(calls[2], "status --json");
        assert_eq!(supervisor.state(), ConnectivityState::NotLoggedIn);
    }

    #[tokio::test]
    async fn test_declined_elevation_runs_nothing_else() {
        let dir = tempfile::tempdir().unwrap();
        let body = "exit 1";
        let (mut supervisor, handle, _recorder) =
            supervisor(dir.path(), body, |_: &Invocation| false);

        handle.stop();
        supervisor.run_until_idle().await;

        assert_eq!(calls(dir.path()), ["down"]);
    }

    #[tokio::test]
    async fn test_request_while_busy_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut supervisor, handle, _recorder) = supervisor(dir.path(), "echo '{}'", never_prompted());

        handle.check_status();
        handle.stop();
        supervisor.run_until_idle().await;

        assert_eq!(calls(dir.path()), ["status --json"]);
        assert_eq!(supervisor.state(), ConnectivityState::NotLoggedIn);
    }

    #[tokio::test]
    async fn test_login_flow_restarts_connection() {
        let dir = tempfile::tempdir().unwrap();
        let (mut supervisor, handle, recorder) =
            supervisor(dir.path(), "[ \"$1\" = status ] && echo '{}'; exit 0", never_prompted());

        handle.login();
        supervisor.run_until_idle().await;

        let calls = calls(dir.path());
        assert_eq!(calls.len(), 4, "{calls:?}");
        assert_eq!(calls[0], "login");
        assert_eq!(calls[1], "status --json");
        assert!(calls[2].starts_with("up "));
        assert_eq!(calls[3], "status --json");
        assert!(recorder.seen().contains(&Seen::LoginFlow));
    }

    #[tokio::test]
    async fn test_reachability_restored_lists_accounts_then_checks_status() {
        let dir = tempfile::tempdir().unwrap();
        let body = "case \"$1\" in\n  switch) printf 'ID Tailnet Account\\n6b1f example.com a@b.c*\\n' ;;\n  status) echo '{}' ;;\nesac";
        let (mut supervisor, handle, recorder) = supervisor(dir.path(), body, never_prompted());

        handle.reachability_changed(Reachability::Online);
        supervisor.run_until_idle().await;

        let calls = calls(dir.path());
        assert_eq!(calls[0], "switch --list");
        assert_eq!(calls.iter().filter(|c| *c == "status --json").count(), 2);
        assert_eq!(supervisor.machine().accounts().len(), 1);
        assert!(recorder.seen().contains(&Seen::Accounts(1)));
    }

    #[tokio::test]
    async fn test_reachability_lost_while_connected() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("case \"$1\" in\n  status) echo '{LOGGED_IN_STATUS}' ;;\n  drive) exit 1 ;;\nesac");
        let (mut supervisor, handle, recorder) = supervisor(dir.path(), &body, never_prompted());

        handle.check_status();
        supervisor.run_until_idle().await;
        assert_eq!(supervisor.state(), ConnectivityState::Connected);
        assert!(!supervisor.status().drives_configured);

        handle.reachability_changed(Reachability::Offline);
        supervisor.run_until_idle().await;
        assert_eq!(supervisor.state(), ConnectivityState::NotConnected);
        let notified = recorder.states().len();

        handle.reachability_changed(Reachability::Offline);
        supervisor.run_until_idle().await;
        assert_eq!(recorder.states().len(), notified);
    }

    #[tokio::test]
    async fn test_add_drive_is_pending_then_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared");
        let body = format!(
            "case \"$1\" in\n  status) echo '{LOGGED_IN_STATUS}' ;;\n  drive) case \"$2\" in\n    share) touch '{m}' ;;\n    list) [ -e '{m}' ] && printf 'name path\\n---- -----\\nnew  /srv\\n' ;;\n  esac ;;\nesac\nexit 0",
            m = shared.display()
        );
        let (mut supervisor, handle, recorder) = supervisor(dir.path(), &body, never_prompted());

        handle.check_status();
        supervisor.run_until_idle().await;
        assert_eq!(supervisor.state(), ConnectivityState::Connected);
        assert!(supervisor.status().drives.is_empty());
        std::fs::remove_file(dir.path().join("calls.log")).unwrap();
        let listed_before = recorder.seen().iter().filter(|s| matches!(s, Seen::Drives(..))).count();

        handle.add_drive(DriveInfo::new("new", "/srv"));
        supervisor.run_until_idle().await;

        assert_eq!(
            calls(dir.path()),
            ["drive share new /srv", "status --json", "drive list", "status --json"]
        );
        let listed = recorder.seen().iter().filter(|s| matches!(s, Seen::Drives(..))).count();
        assert_eq!(listed - listed_before, 2, "pending entry, then the confirming list");
        assert_eq!(supervisor.status().drives, vec![DriveInfo::new("new", "/srv")]);
        assert!(supervisor.status().drives_configured);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, handle, _recorder) = supervisor(dir.path(), "echo '{}'", never_prompted());

        handle.check_status();
        handle.shutdown();
        supervisor.run().await;

        assert!(!handle.send(Request::CheckStatus));
    }
}
