// ── Device session ──
//
// One `Session` owns the single socket to one robot. A background task
// (see `runner`) connects, wakes the device, keeps it awake and reconnects
// with backoff; callers observe it through a `watch` for the state, a
// `broadcast` for events and the lock-free `DeviceStore` for snapshots.
// Commands travel over an mpsc channel and are answered through a oneshot.
// A supervisor awaits the task; if it panics the session drops to
// `Disconnected` and can be started again.

mod backoff;
mod runner;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use narwal_api::{Command, CommandAck, Transport};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{PendingPolicy, SessionConfig};
use crate::error::CoreError;
use crate::model::DeviceEvent;
use crate::store::DeviceStore;

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── SessionState ─────────────────────────────────────────────────────

/// Lifecycle of the device connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// Not started, or stopped.
    #[default]
    Disconnected,
    Connecting,
    /// Socket open, wake sequence sent, no sign of life yet.
    AwaitingWake,
    /// The device answered; commands are accepted.
    Awake,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
}

// ── Commands ─────────────────────────────────────────────────────────

/// How a delivered command ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The device replied on the command's topic.
    Acknowledged(CommandAck),
    /// Written to the socket, but no reply arrived in time. Many commands
    /// are never acknowledged, so this is not a failure.
    Unconfirmed,
}

/// A submitted command awaiting its outcome.
#[derive(Debug)]
pub struct CommandTicket {
    id: u64,
    reply: oneshot::Receiver<Result<CommandOutcome, CoreError>>,
}

impl CommandTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the session to deliver (or drop) the command.
    pub async fn outcome(self) -> Result<CommandOutcome, CoreError> {
        self.reply.await.unwrap_or_else(|_| Err(CoreError::Cancelled))
    }
}

/// A command on its way to the session task.
#[derive(Debug)]
pub(crate) struct CommandEnvelope {
    pub(crate) id: u64,
    pub(crate) command: Command,
    pub(crate) reply: oneshot::Sender<Result<CommandOutcome, CoreError>>,
}

impl CommandEnvelope {
    pub(crate) fn resolve(self, result: Result<CommandOutcome, CoreError>) {
        let _ = self.reply.send(result);
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// Handle to one device session. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    store: Arc<DeviceStore>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<DeviceEvent>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    /// Locked by the running session task.
    command_rx: Arc<Mutex<mpsc::Receiver<CommandEnvelope>>>,
    runtime: Mutex<Option<Runtime>>,
    next_id: AtomicU64,
}

struct Runtime {
    cancel: CancellationToken,
    /// The supervisor, which outlives the session task.
    handle: JoinHandle<()>,
}

impl Session {
    /// Create a session. Nothing happens until [`start`](Self::start).
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(DeviceStore::new(config.identity.clone()));
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Self {
            inner: Arc::new(SessionInner {
                config,
                transport,
                store,
                state,
                events,
                command_tx,
                command_rx: Arc::new(Mutex::new(command_rx)),
                runtime: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the session task. Does nothing if it is already running.
    pub async fn start(&self) {
        let mut runtime = self.inner.runtime.lock().await;
        if let Some(current) = runtime.take() {
            if !current.handle.is_finished() {
                *runtime = Some(current);
                return;
            }
            // The task died on its own; start over.
            join(current.handle).await;
        }

        let mut commands = Arc::clone(&self.inner.command_rx).lock_owned().await;
        while let Ok(stale) = commands.try_recv() {
            stale.resolve(Err(CoreError::Cancelled));
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(runner::run_session(
            Arc::clone(&self.inner),
            commands,
            cancel.clone(),
        ));
        let handle = tokio::spawn(supervise(Arc::clone(&self.inner), task));
        *runtime = Some(Runtime { cancel, handle });
        debug!(endpoint = %self.inner.transport.endpoint(), "Session started");
    }

    /// Close the socket, cancel outstanding commands and move to
    /// `Disconnected`. Returns once the session task has finished.
    pub async fn stop(&self) {
        let runtime = self.inner.runtime.lock().await.take();
        if let Some(runtime) = runtime {
            runtime.cancel.cancel();
            join(runtime.handle).await;
        }
        self.inner.set_state(SessionState::Disconnected);
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Hand a command to the session without waiting for the outcome.
    ///
    /// Fails with `NotReady` when the session is stopped, when the
    /// policy is `FailFast` and the device is not awake, or when the
    /// command channel is full.
    pub fn submit(&self, command: Command) -> Result<CommandTicket, CoreError> {
        let state = self.state();
        let not_ready = match self.inner.config.pending_policy {
            _ if state == SessionState::Disconnected => true,
            PendingPolicy::FailFast => state != SessionState::Awake,
            PendingPolicy::QueueLatest => false,
        };
        if not_ready {
            return Err(CoreError::NotReady { state });
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .try_send(CommandEnvelope { id, command, reply })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => CoreError::NotReady { state },
                mpsc::error::TrySendError::Closed(_) => CoreError::Cancelled,
            })?;

        Ok(CommandTicket { id, reply: rx })
    }

    /// Submit a command and wait for its outcome.
    pub async fn send_command(&self, command: Command) -> Result<CommandOutcome, CoreError> {
        self.submit(command)?.outcome().await
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Raw event receiver. See [`DeviceSubscription`](crate::DeviceSubscription)
    /// for a lag-tolerant wrapper.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until the session reaches `target`, up to `timeout`.
    pub async fn wait_for_state(
        &self,
        target: SessionState,
        timeout: Duration,
    ) -> Result<(), CoreError> {
        let mut rx = self.watch_state();
        match tokio::time::timeout(timeout, rx.wait_for(|s| *s == target)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(CoreError::Cancelled),
            Err(_) => Err(CoreError::Timeout {
                what: format!("Waiting for {target}"),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.inner.transport.endpoint())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Wait for the session task. A panic leaves its held and in-flight
/// commands cancelled (their reply senders drop) and the session
/// `Disconnected`.
async fn supervise(inner: Arc<SessionInner>, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        error!(error = %e, "Session task failed");
        inner.set_state(SessionState::Disconnected);
    }
}

async fn join(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!(error = %e, "Session supervisor failed");
    }
}

impl SessionInner {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SessionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            info!(state = %next, "Session state changed");
            self.publish(DeviceEvent::StateChanged(next));
        }
    }

    fn publish(&self, event: DeviceEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
