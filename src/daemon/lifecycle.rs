//! The session state machine.
//!
//! [`DaemonLifecycle::run`] is the only place that changes the lifecycle
//! state. Everything else (authentication, connect, inbound dispatch, the
//! key writer, signal handling) reports to it by posting a
//! [`LifecycleEvent`] on one queue, and the loop handles those events one
//! at a time.
//!
//! Authentication and connect attempts run as scheduled tasks. Each carries
//! the generation it was started in; after a teardown the generation moves
//! on and late results are dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::connection::SessionConnection;
use super::session::Session;
use super::state::{LifecycleState, RetryCounter, RetryPolicy};
use crate::auth::AuthenticationClient;
use crate::dispatcher::{Command, CommandDispatcher};
use crate::error::{AuthError, DaemonError, HubError, KeyFileError};
use crate::hub::{get_keys_invocation, HubEvent, ServerAction};
use crate::keys::{KeyFileEditor, KeyOperation, KeyWriter};
use crate::traits::{HubConnector, OpenChannel, Task, TaskScheduler};

/// Failures in a streak logged at `warn`; later ones go to `debug`.
const LOUD_RETRIES: u32 = 3;

/// Inputs to the lifecycle loop.
pub enum LifecycleEvent {
    AuthCompleted {
        generation: u64,
        result: Result<String, AuthError>,
    },
    ConnectCompleted {
        generation: u64,
        result: Result<OpenChannel, HubError>,
    },
    Command {
        generation: u64,
        command: Command,
    },
    ConnectionLost {
        generation: u64,
        error: Option<String>,
    },
    KeyFileFailed(KeyFileError),
    Failed(DaemonError),
    Shutdown,
}

/// How a lifecycle run ended.
#[derive(Debug)]
pub enum DaemonExit {
    /// Stopped by an external shutdown request.
    Cancelled,
    /// Stopped by a fatal condition.
    Failed(DaemonError),
}

impl DaemonExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonExit::Cancelled => 0,
            DaemonExit::Failed(err) => err.exit_code(),
        }
    }

    pub fn error(&self) -> Option<&DaemonError> {
        match self {
            DaemonExit::Cancelled => None,
            DaemonExit::Failed(err) => Some(err),
        }
    }
}

impl fmt::Display for DaemonExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonExit::Cancelled => write!(f, "cancelled"),
            DaemonExit::Failed(err) => write!(f, "{}", err),
        }
    }
}

/// Tunables for the lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Backoff for failed authentication and connect attempts.
    pub retry: RetryPolicy,
    /// Wait before re-authenticating after a mid-session disruption.
    pub reconnect_delay: Duration,
    /// Send `GetKeys` right after connecting.
    pub request_keys_on_connect: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            reconnect_delay: Duration::from_secs(60),
            request_keys_on_connect: false,
        }
    }
}

/// Collaborators injected into the lifecycle.
pub struct LifecycleDeps {
    pub auth: AuthenticationClient,
    pub connector: Arc<dyn HubConnector>,
    pub scheduler: Arc<dyn TaskScheduler>,
    pub editor: KeyFileEditor,
}

/// Cloneable handle for observing and stopping a running lifecycle.
#[derive(Clone)]
pub struct LifecycleHandle {
    events_tx: mpsc::UnboundedSender<LifecycleEvent>,
    state_rx: watch::Receiver<LifecycleState>,
}

impl LifecycleHandle {
    /// Ask the lifecycle to tear down and stop.
    pub fn shutdown(&self) {
        let _ = self.events_tx.send(LifecycleEvent::Shutdown);
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        *self.state_rx.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_rx.clone()
    }

    /// Wait until the lifecycle reaches `target` or terminates; returns the
    /// state that ended the wait.
    pub async fn wait_for(&self, target: LifecycleState) -> LifecycleState {
        let mut rx = self.state_rx.clone();
        let reached = rx
            .wait_for(|state| *state == target || state.is_terminal())
            .await
            .map(|state| *state);
        reached.unwrap_or(LifecycleState::Terminated)
    }
}

/// Drives one daemon session from authentication to teardown.
pub struct DaemonLifecycle {
    session: Session,
    auth: AuthenticationClient,
    connector: Arc<dyn HubConnector>,
    scheduler: Arc<dyn TaskScheduler>,
    writer: KeyWriter,
    settings: LifecycleSettings,
    state_tx: watch::Sender<LifecycleState>,
    events_tx: mpsc::UnboundedSender<LifecycleEvent>,
    events_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
    generation: u64,
    auth_retries: RetryCounter,
    connect_retries: RetryCounter,
    connection: SessionConnection,
}

impl DaemonLifecycle {
    /// Build the lifecycle and spawn its key writer. Must be called inside
    /// a tokio runtime.
    pub fn new(
        session: Session,
        deps: LifecycleDeps,
        settings: LifecycleSettings,
    ) -> (Self, LifecycleHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LifecycleState::Idle);

        let failures = events_tx.clone();
        let writer = KeyWriter::spawn(
            deps.editor,
            Box::new(move |err| {
                let _ = failures.send(LifecycleEvent::KeyFileFailed(err));
            }),
        );

        let handle = LifecycleHandle {
            events_tx: events_tx.clone(),
            state_rx,
        };

        let lifecycle = Self {
            session,
            auth: deps.auth,
            connector: deps.connector,
            scheduler: deps.scheduler,
            writer,
            settings,
            state_tx,
            events_tx,
            events_rx,
            generation: 0,
            auth_retries: RetryCounter::default(),
            connect_retries: RetryCounter::default(),
            connection: SessionConnection::new(),
        };

        (lifecycle, handle)
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    /// Run until a fatal condition or a shutdown request, then tear down.
    pub async fn run(mut self) -> DaemonExit {
        self.set_state(LifecycleState::Authenticating);
        self.schedule_authentication(None);

        let exit = loop {
            let Some(event) = self.events_rx.recv().await else {
                break DaemonExit::Failed(DaemonError::internal("lifecycle queue closed"));
            };
            if let Some(exit) = self.handle_event(event).await {
                break exit;
            }
        };

        self.teardown(&exit).await;
        exit
    }

    fn set_state(&self, state: LifecycleState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Lifecycle {} -> {}", previous, state);
        }
    }

    async fn handle_event(&mut self, event: LifecycleEvent) -> Option<DaemonExit> {
        match event {
            LifecycleEvent::Shutdown => {
                info!("Shutdown requested");
                Some(DaemonExit::Cancelled)
            }
            LifecycleEvent::KeyFileFailed(err) => Some(DaemonExit::Failed(err.into())),
            LifecycleEvent::Failed(err) => Some(DaemonExit::Failed(err)),
            LifecycleEvent::AuthCompleted { generation, result } => {
                if generation != self.generation || self.state() != LifecycleState::Authenticating
                {
                    debug!("Ignoring stale authentication result");
                    return None;
                }
                self.on_authenticated(result)
            }
            LifecycleEvent::ConnectCompleted { generation, result } => {
                if generation != self.generation || self.state() != LifecycleState::Connecting {
                    debug!("Ignoring stale connect result");
                    if let Ok((channel, _)) = result {
                        let _ = channel.close().await;
                    }
                    return None;
                }
                self.on_connected(result).await
            }
            LifecycleEvent::Command {
                generation,
                command,
            } => {
                if generation != self.generation {
                    debug!("Ignoring command from a previous connection");
                    return None;
                }
                self.on_command(command).await
            }
            LifecycleEvent::ConnectionLost { generation, error } => {
                if generation != self.generation || self.state() != LifecycleState::Connected {
                    return None;
                }
                warn!(
                    "Connection to the server lost: {}",
                    error.as_deref().unwrap_or("no reason given")
                );
                self.restart_session().await;
                None
            }
        }
    }

    fn on_authenticated(&mut self, result: Result<String, AuthError>) -> Option<DaemonExit> {
        match result {
            Ok(jwt) => {
                self.auth_retries.reset();
                if !self.session.set_jwt(jwt) {
                    warn!("Session credential already set, keeping the existing one");
                }
                info!("Authenticated with the server");
                self.set_state(LifecycleState::Connecting);
                self.schedule_connect(None)
            }
            Err(err) if err.is_retryable() => {
                match self.auth_retries.record_failure(&self.settings.retry) {
                    Some(delay) => {
                        log_retry("Authentication", &err, self.auth_retries.failures(), delay);
                        self.schedule_authentication(Some(delay));
                        None
                    }
                    None => {
                        error!(
                            "Authentication failed {} times, giving up",
                            self.auth_retries.failures()
                        );
                        Some(DaemonExit::Failed(err.into()))
                    }
                }
            }
            Err(err) => Some(DaemonExit::Failed(err.into())),
        }
    }

    async fn on_connected(&mut self, result: Result<OpenChannel, HubError>) -> Option<DaemonExit> {
        match result {
            Ok((channel, events)) => {
                self.connect_retries.reset();
                let pump = tokio::spawn(pump_events(
                    events,
                    CommandDispatcher::new(self.writer.clone()),
                    self.events_tx.clone(),
                    self.generation,
                ));
                self.connection.attach(channel, pump);
                self.set_state(LifecycleState::Connected);
                info!("Connected to the server hub");

                if self.settings.request_keys_on_connect {
                    if let Err(e) = self.connection.send(get_keys_invocation()).await {
                        warn!("Failed to request keys: {}", e);
                    }
                }
                None
            }
            Err(err) if err.is_retryable() => {
                match self.connect_retries.record_failure(&self.settings.retry) {
                    Some(delay) => {
                        log_retry("Connect", &err, self.connect_retries.failures(), delay);
                        self.schedule_connect(Some(delay))
                    }
                    None => {
                        error!(
                            "Connect failed {} times, giving up",
                            self.connect_retries.failures()
                        );
                        Some(DaemonExit::Failed(err.into()))
                    }
                }
            }
            Err(err) => Some(DaemonExit::Failed(err.into())),
        }
    }

    async fn on_command(&mut self, command: Command) -> Option<DaemonExit> {
        match command {
            Command::Action(action @ (ServerAction::Reconnect | ServerAction::Authentication)) => {
                info!("Server requested {}", action);
                self.restart_session().await;
                None
            }
            Command::Action(action @ (ServerAction::Logout | ServerAction::Removed)) => {
                info!("Server requested {}", action);
                Some(DaemonExit::Failed(DaemonError::ServerRequestedShutdown {
                    reason: format!("server action {}", action),
                }))
            }
            Command::Error {
                status_code,
                messages,
                exception,
            } => {
                for message in &messages {
                    error!("Server error: {}", message);
                }
                if let Some(exception) = &exception {
                    error!("Server exception: {}", exception);
                }
                let reason = if !messages.is_empty() {
                    messages.join("; ")
                } else {
                    exception.unwrap_or_else(|| "no error detail".to_string())
                };
                let reason = match status_code {
                    Some(code) => format!("{} (status {})", reason, code),
                    None => reason,
                };
                Some(DaemonExit::Failed(DaemonError::ServerRequestedShutdown {
                    reason,
                }))
            }
            Command::AuthenticationRejected {
                messages,
                exception,
            } => Some(DaemonExit::Failed(
                AuthError::Rejected {
                    status: 401,
                    messages,
                    exception,
                }
                .into(),
            )),
            Command::InitKeys(_) | Command::AddKeys(_) | Command::RemoveKeys(_) => {
                debug!("Key command reached the lifecycle, ignoring");
                None
            }
        }
    }

    /// Drop the current connection and authenticate again after the
    /// reconnect delay.
    async fn restart_session(&mut self) {
        self.generation += 1;
        if let Err(e) = self.connection.close().await {
            warn!("Error closing hub connection: {}", e);
        }
        self.session.clear_jwt();
        self.auth_retries.reset();
        self.connect_retries.reset();
        self.set_state(LifecycleState::Authenticating);

        info!(
            "Re-authenticating in {}s",
            self.settings.reconnect_delay.as_secs()
        );
        self.schedule_authentication(Some(self.settings.reconnect_delay));
    }

    fn schedule(&self, task: Task, delay: Option<Duration>) {
        match delay {
            Some(delay) => self.scheduler.enqueue_after(task, delay),
            None => self.scheduler.enqueue(task),
        }
    }

    fn schedule_authentication(&self, delay: Option<Duration>) {
        let auth = self.auth.clone();
        let session = self.session.clone();
        let events = self.events_tx.clone();
        let generation = self.generation;

        self.schedule(
            Box::pin(async move {
                let result = auth.authenticate(&session).await;
                let _ = events.send(LifecycleEvent::AuthCompleted { generation, result });
            }),
            delay,
        );
    }

    fn schedule_connect(&self, delay: Option<Duration>) -> Option<DaemonExit> {
        let Some(jwt) = self.session.jwt().map(str::to_string) else {
            return Some(DaemonExit::Failed(DaemonError::internal(
                "connect scheduled without a session credential",
            )));
        };
        let connector = self.connector.clone();
        let hub_url = self.session.hub_url.clone();
        let events = self.events_tx.clone();
        let generation = self.generation;

        self.schedule(
            Box::pin(async move {
                let result = connector.connect(&hub_url, &jwt).await;
                let _ = events.send(LifecycleEvent::ConnectCompleted { generation, result });
            }),
            delay,
        );
        None
    }

    /// Clear the managed region, then close the connection. Failures are
    /// logged only.
    async fn teardown(&mut self, exit: &DaemonExit) {
        self.set_state(LifecycleState::Disconnecting);
        match exit {
            DaemonExit::Cancelled => info!("Stopping"),
            DaemonExit::Failed(err) => error!(
                "{} [{}] {}",
                err.user_message(),
                err.error_code(),
                err.recovery_hint()
            ),
        }

        self.scheduler.shutdown();
        self.generation += 1;
        self.connection.stop_dispatch();

        match self.writer.apply(KeyOperation::ReplaceAll(Vec::new())).await {
            Ok(()) => info!("Removed all managed keys"),
            Err(e) => error!("Failed to clear managed keys: {}", e),
        }

        if let Err(e) = self.connection.close().await {
            warn!("Error closing hub connection: {}", e);
        }

        self.set_state(LifecycleState::Terminated);
    }
}

fn log_retry(what: &str, err: &dyn fmt::Display, failures: u32, delay: Duration) {
    if failures <= LOUD_RETRIES {
        warn!(
            "{} failed (attempt {}): {}. Retrying in {}s",
            what,
            failures,
            err,
            delay.as_secs()
        );
    } else {
        debug!(
            "{} failed (attempt {}): {}. Retrying in {}s",
            what,
            failures,
            err,
            delay.as_secs()
        );
    }
}

/// Feed one connection's events through the dispatcher, in order.
async fn pump_events(
    mut events: mpsc::Receiver<HubEvent>,
    dispatcher: CommandDispatcher,
    lifecycle: mpsc::UnboundedSender<LifecycleEvent>,
    generation: u64,
) {
    while let Some(event) = events.recv().await {
        match event {
            HubEvent::Invocation(invocation) => match dispatcher.on_message(invocation) {
                Ok(Some(command)) => {
                    if lifecycle
                        .send(LifecycleEvent::Command {
                            generation,
                            command,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    let _ = lifecycle.send(LifecycleEvent::Failed(err));
                    break;
                }
            },
            HubEvent::Closed { error } => {
                let _ = lifecycle.send(LifecycleEvent::ConnectionLost { generation, error });
                break;
            }
        }
    }
    debug!("Inbound dispatch ended");
}
