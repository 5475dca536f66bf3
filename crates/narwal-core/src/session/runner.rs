// ── Session task ──
//
// Outer loop: connect → wake → serve the connection → back off → repeat,
// until cancelled. Inner loop: one biased `select!` over cancellation, the
// writer task, inbound frames, user commands and the protocol timers (wake
// retry, keepalive, polling fallback, probe deadline, command replies).
// All writes go through a single writer task so frames never interleave.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use narwal_api::{
    Command, CommandAck, Connection, DeviceIdentity, Frame, FrameSink, Message, StatusUpdate,
};
use tokio::sync::{OwnedMutexGuard, mpsc};
use tokio::task::JoinError;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::backoff::Backoff;
use super::{CommandEnvelope, CommandOutcome, SessionInner, SessionState};
use crate::config::PendingPolicy;
use crate::error::CoreError;
use crate::map;
use crate::model::DeviceEvent;

/// How long queued frames may take to drain when a connection ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
/// Deadline used for timers that are not armed.
const IDLE_TIMER: Duration = Duration::from_secs(86_400);

// ── Outer loop ───────────────────────────────────────────────────────

/// Runs until cancelled. The command receiver stays locked for the
/// task's lifetime and is released however the task ends.
pub(super) async fn run_session(
    inner: Arc<SessionInner>,
    mut commands: OwnedMutexGuard<mpsc::Receiver<CommandEnvelope>>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(inner.config.reconnect.clone());
    let mut pending: Option<CommandEnvelope> = None;
    let endpoint = inner.transport.endpoint();

    'session: loop {
        inner.set_state(SessionState::Connecting);
        info!(endpoint = %endpoint, attempt = backoff.attempt(), "Connecting to device");

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => break 'session,
            result = timeout(inner.config.connect_timeout, inner.transport.connect()) => result,
        };

        match connected {
            Ok(Ok(connection)) => {
                info!(endpoint = %endpoint, "Connected, waking device");
                let (end, awake_for) =
                    run_link(&inner, connection, &mut commands, &mut pending, &cancel).await;

                if backoff.record_awake(awake_for) {
                    debug!(awake_secs = awake_for.as_secs(), "Backoff reset");
                }
                match end {
                    LinkEnd::Shutdown => break 'session,
                    LinkEnd::Lost(reason) => warn!(endpoint = %endpoint, reason = %reason, "Connection lost"),
                }
            }
            Ok(Err(e)) => warn!(endpoint = %endpoint, error = %e, "Connect failed"),
            Err(_) => warn!(
                endpoint = %endpoint,
                timeout_secs = inner.config.connect_timeout.as_secs(),
                "Connect timed out"
            ),
        }

        inner.set_state(SessionState::Reconnecting);
        let delay = backoff.next_delay();
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = backoff.attempt(),
            "Waiting before reconnect"
        );

        let wait = sleep(delay);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break 'session,
                () = &mut wait => break,
                envelope = commands.recv() => match envelope {
                    Some(envelope) => hold_pending(&inner, &mut pending, envelope),
                    None => break 'session,
                },
            }
        }
    }

    if let Some(envelope) = pending.take() {
        envelope.resolve(Err(CoreError::Cancelled));
    }
    while let Ok(envelope) = commands.try_recv() {
        envelope.resolve(Err(CoreError::Cancelled));
    }
    inner.set_state(SessionState::Disconnected);
    debug!(endpoint = %endpoint, "Session task exiting");
}

/// Keep a command for when the device wakes up.
fn hold_pending(
    inner: &SessionInner,
    pending: &mut Option<CommandEnvelope>,
    envelope: CommandEnvelope,
) {
    if inner.config.pending_policy == PendingPolicy::FailFast {
        envelope.resolve(Err(CoreError::NotReady {
            state: inner.state(),
        }));
        return;
    }

    debug!(id = envelope.id, topic = envelope.command.topic(), "Holding command until awake");
    if let Some(replaced) = pending.replace(envelope) {
        debug!(id = replaced.id, "Pending command replaced by a newer one");
        replaced.resolve(Err(CoreError::Cancelled));
    }
}

// ── One connection ───────────────────────────────────────────────────

enum LinkEnd {
    /// Cancelled by `stop()`.
    Shutdown,
    Lost(String),
}

struct Outbound {
    bytes: Bytes,
    /// Pause after writing this frame.
    settle: Duration,
}

struct Waiter {
    envelope: CommandEnvelope,
    deadline: Instant,
}

struct Deadlines {
    wake: Instant,
    keepalive: Instant,
    poll: Instant,
    probe: Instant,
    reply: Instant,
}

struct Link<'a> {
    inner: &'a SessionInner,
    outbound: mpsc::UnboundedSender<Outbound>,
    waiters: VecDeque<Waiter>,
    awake_since: Option<Instant>,
    last_sent: Instant,
    last_heard: Instant,
    probe_deadline: Option<Instant>,
    next_wake: Instant,
}

/// Serve one open connection until it fails or the session is cancelled.
/// Returns how it ended and how long the device was awake.
async fn run_link(
    inner: &SessionInner,
    connection: Connection,
    commands: &mut mpsc::Receiver<CommandEnvelope>,
    pending: &mut Option<CommandEnvelope>,
    cancel: &CancellationToken,
) -> (LinkEnd, Duration) {
    let Connection { sink, mut stream } = connection;
    let (outbound, queue) = mpsc::unbounded_channel();
    let mut writer = tokio::spawn(write_frames(sink, queue));

    let now = Instant::now();
    let mut link = Link {
        inner,
        outbound,
        waiters: VecDeque::new(),
        awake_since: None,
        last_sent: now,
        last_heard: now,
        probe_deadline: None,
        next_wake: now + inner.config.wake_timeout,
    };

    inner.set_state(SessionState::AwaitingWake);
    link.send_wake_sequence();

    let end = loop {
        let timers = link.deadlines(Instant::now() + IDLE_TIMER);

        tokio::select! {
            biased;
            () = cancel.cancelled() => break LinkEnd::Shutdown,
            result = &mut writer => break LinkEnd::Lost(writer_exit(result)),
            frame = stream.next() => match frame {
                Some(Ok(bytes)) => link.handle_frame(&bytes, pending),
                Some(Err(e)) => break LinkEnd::Lost(e.to_string()),
                None => break LinkEnd::Lost("device closed the connection".into()),
            },
            envelope = commands.recv() => match envelope {
                Some(envelope) => link.handle_command(envelope, pending),
                None => break LinkEnd::Shutdown,
            },
            () = sleep_until(timers.wake) => link.resend_wake_sequence(),
            () = sleep_until(timers.keepalive) => link.send_heartbeat(),
            () = sleep_until(timers.poll) => link.send_probe(),
            () = sleep_until(timers.probe) => break LinkEnd::Lost(format!(
                "no reply to status query within {}s",
                inner.config.probe_timeout.as_secs()
            )),
            () = sleep_until(timers.reply) => link.expire_waiters(),
        }
    };

    if matches!(end, LinkEnd::Lost(_)) {
        inner.set_state(SessionState::Reconnecting);
    }

    let awake_for = link
        .awake_since
        .map(|since| since.elapsed())
        .unwrap_or_default();
    link.cancel_waiters();
    // Dropping the link drops the last sender, so the writer closes the sink.
    drop(link);

    if !writer.is_finished() && timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        debug!("Writer did not drain in time, aborting");
        writer.abort();
    }
    drop(stream);

    (end, awake_for)
}

impl Link<'_> {
    fn deadlines(&self, idle: Instant) -> Deadlines {
        let config = &self.inner.config;
        let awake = self.awake_since.is_some();

        Deadlines {
            wake: if awake { idle } else { self.next_wake },
            keepalive: if awake {
                self.last_sent + config.keepalive_interval
            } else {
                idle
            },
            poll: if awake && self.probe_deadline.is_none() {
                self.last_heard + config.poll_interval
            } else {
                idle
            },
            probe: self.probe_deadline.unwrap_or(idle),
            reply: self
                .waiters
                .iter()
                .map(|w| w.deadline)
                .min()
                .unwrap_or(idle),
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────

    fn send(&mut self, command: &Command, settle: Duration) -> Result<(), CoreError> {
        let identity = self.inner.store.identity();
        let bytes = command.frame(&identity).encode()?;
        self.outbound
            .send(Outbound { bytes, settle })
            .map_err(|_| CoreError::Cancelled)?;
        self.last_sent = Instant::now();
        trace!(topic = command.topic(), "Frame queued");
        Ok(())
    }

    fn send_wake_sequence(&mut self) {
        let spacing = self.inner.config.wake_frame_spacing;
        for command in Command::wake_sequence() {
            if let Err(e) = self.send(&command, spacing) {
                warn!(error = %e, topic = command.topic(), "Cannot queue wake frame");
                return;
            }
        }
    }

    fn resend_wake_sequence(&mut self) {
        info!("Device has not answered, re-sending wake sequence");
        self.send_wake_sequence();
        self.next_wake = Instant::now() + self.inner.config.wake_retry_interval;
    }

    fn send_heartbeat(&mut self) {
        trace!("Keepalive heartbeat");
        if let Err(e) = self.send(&Command::AppHeartbeat, Duration::ZERO) {
            warn!(error = %e, "Cannot queue heartbeat");
        }
    }

    fn send_probe(&mut self) {
        info!(
            silent_secs = self.last_heard.elapsed().as_secs(),
            "No broadcasts, querying status"
        );
        if let Err(e) = self.send(&Command::GetBaseStatus, Duration::ZERO) {
            warn!(error = %e, "Cannot queue status query");
        }
        self.probe_deadline = Some(Instant::now() + self.inner.config.probe_timeout);
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn handle_command(&mut self, envelope: CommandEnvelope, pending: &mut Option<CommandEnvelope>) {
        if self.awake_since.is_some() {
            self.dispatch(envelope);
        } else {
            hold_pending(self.inner, pending, envelope);
        }
    }

    fn dispatch(&mut self, envelope: CommandEnvelope) {
        let config = &self.inner.config;
        let wait = match envelope.command {
            Command::GetMap | Command::GetAllMaps => config.map_command_timeout,
            _ => config.command_timeout,
        };

        if let Err(e) = self.send(&envelope.command, Duration::ZERO) {
            envelope.resolve(Err(e));
            return;
        }
        debug!(id = envelope.id, topic = envelope.command.topic(), "Command sent");
        self.record_local_setting(&envelope.command);
        self.waiters.push_back(Waiter {
            envelope,
            deadline: Instant::now() + wait,
        });
    }

    fn expire_waiters(&mut self) {
        let now = Instant::now();
        let (expired, waiting): (VecDeque<_>, VecDeque<_>) =
            self.waiters.drain(..).partition(|w| w.deadline <= now);
        self.waiters = waiting;

        for waiter in expired {
            debug!(
                id = waiter.envelope.id,
                topic = waiter.envelope.command.topic(),
                "No reply, command unconfirmed"
            );
            waiter.envelope.resolve(Ok(CommandOutcome::Unconfirmed));
        }
    }

    fn cancel_waiters(&mut self) {
        for waiter in self.waiters.drain(..) {
            waiter.envelope.resolve(Err(CoreError::Cancelled));
        }
    }

    // ── Inbound ──────────────────────────────────────────────────────

    fn handle_frame(&mut self, bytes: &Bytes, pending: &mut Option<CommandEnvelope>) {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, len = bytes.len(), "Dropping undecodable frame");
                return;
            }
        };

        self.last_heard = Instant::now();
        self.probe_deadline = None;
        self.adopt_identity(DeviceIdentity::from_topic(&frame.topic));

        let message = match Message::from_frame(&frame) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, topic = frame.short_topic(), "Dropping undecodable payload");
                return;
            }
        };
        trace!(kind = message.kind(), topic = frame.short_topic(), "Frame received");

        match message {
            Message::Status(update) => {
                self.apply_status(&update);
                self.mark_awake(pending);
            }
            Message::Map(broadcast) => {
                self.apply_map(&broadcast.payload);
                self.mark_awake(pending);
            }
            Message::CommandAck(ack) => self.handle_ack(ack, pending),
            Message::Unknown { topic, .. } => trace!(topic = %topic, "Ignoring unhandled topic"),
        }
    }

    fn handle_ack(&mut self, ack: CommandAck, pending: &mut Option<CommandEnvelope>) {
        if let Some(update) = ack.status_update() {
            self.apply_status(&update);
        }
        if let Some(info) = ack.device_info() {
            self.adopt_identity(Some(info.identity()));
            if let Some(status) = self.inner.store.apply_device_info(&info) {
                self.inner.publish(DeviceEvent::Status(status));
            }
        }
        if let Some(payload) = ack.map_payload() {
            self.apply_map(&payload);
        }

        let success = ack.is_success();
        match self
            .waiters
            .iter()
            .position(|w| w.envelope.command.topic() == ack.topic)
            .and_then(|index| self.waiters.remove(index))
        {
            Some(waiter) => {
                debug!(
                    id = waiter.envelope.id,
                    topic = %ack.topic,
                    result = ?ack.result,
                    "Command acknowledged"
                );
                waiter
                    .envelope
                    .resolve(Ok(CommandOutcome::Acknowledged(ack)));
            }
            None => trace!(topic = %ack.topic, result = ?ack.result, "Reply without a waiting command"),
        }

        if success {
            self.mark_awake(pending);
        }
    }

    fn mark_awake(&mut self, pending: &mut Option<CommandEnvelope>) {
        if self.awake_since.is_some() {
            return;
        }
        self.awake_since = Some(Instant::now());
        self.inner.set_state(SessionState::Awake);

        if let Some(envelope) = pending.take() {
            debug!(id = envelope.id, "Sending command held while asleep");
            self.dispatch(envelope);
        }
    }

    /// Fan speed and mop humidity are never reported back, so the value
    /// written to the robot becomes the cached one.
    fn record_local_setting(&self, command: &Command) {
        let store = &self.inner.store;
        let status = match *command {
            Command::SetFanSpeed(speed) => store.modify_status(|s, at| s.set_fan_speed(speed, at)),
            Command::SetMopHumidity(humidity) => {
                store.modify_status(|s, at| s.set_mop_humidity(humidity, at))
            }
            _ => return,
        };
        if let Some(status) = status {
            self.inner.publish(DeviceEvent::Status(status));
        }
    }

    fn apply_status(&self, update: &StatusUpdate) {
        if let Some(status) = self.inner.store.apply_status(update) {
            self.inner.publish(DeviceEvent::Status(status));
        }
    }

    /// Decode and render a map; a bad payload leaves the previous map.
    fn apply_map(&self, payload: &[u8]) {
        match map::decode_map(payload) {
            Ok(model) => {
                let image = map::render(&model, &self.inner.config.theme);
                let snapshot = self.inner.store.store_map(model, image);
                debug!(
                    generation = snapshot.generation,
                    rooms = snapshot.model.rooms.len(),
                    width = snapshot.image.width,
                    height = snapshot.image.height,
                    "Map updated"
                );
                self.inner.publish(DeviceEvent::MapReady(snapshot));
            }
            Err(e) => warn!(error = %e, len = payload.len(), "Map payload rejected, keeping previous map"),
        }
    }

    fn adopt_identity(&self, seen: Option<DeviceIdentity>) {
        let Some(seen) = seen else { return };
        let (product_key, device_id) = (seen.product_key.clone(), seen.device_id.clone());
        if self.inner.store.set_identity(seen) {
            info!(
                product_key = %product_key,
                device_id = %device_id,
                "Using device identity reported by the robot"
            );
        }
    }
}

// ── Writer ───────────────────────────────────────────────────────────

async fn write_frames(
    mut sink: FrameSink,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
) -> Result<(), narwal_api::Error> {
    while let Some(Outbound { bytes, settle }) = queue.recv().await {
        sink.send(bytes).await?;
        if !settle.is_zero() {
            sleep(settle).await;
        }
    }
    sink.close().await
}

fn writer_exit(result: Result<Result<(), narwal_api::Error>, JoinError>) -> String {
    match result {
        Ok(Ok(())) => "writer stopped".into(),
        Ok(Err(e)) => e.to_string(),
        Err(e) => format!("writer task failed: {e}"),
    }
}
