//! Relay connection lifecycle and inbound message handling.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::Notify;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::dispatch::run_request;
use crate::validator::verify;
use crate::{
    ActionRunner, AuthFrame, CallbackEntry, GlobalConfigProvider, InboundFrame, ReceiverConfig,
    ReceiverError, ReceiverResult, ResolvedActionRequest, SignedActionRequest,
};

const TRANSPORT_TARGET: &str = "relay_receiver::transport";

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No loop running.
    Stopped,
    /// Opening the WebSocket.
    Connecting,
    /// Authenticated and receiving.
    Open,
    /// The connection ended; waiting out the reconnect delay.
    Closing,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Connecting => 1,
            Self::Open => 2,
            Self::Closing => 3,
        }
    }
}

/// Per-message result of [`RelayReceiver::on_message`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundOutcome {
    /// Requests handed to the action runner successfully.
    pub dispatched: usize,
    /// Signed requests dropped by verification.
    pub rejected: usize,
    /// Frames or entries that failed to decode, or whose dispatch failed.
    pub failed: usize,
}

/// Whether the reconnect loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Stopped,
}

struct LifecycleCell {
    running: AtomicBool,
    wake: Notify,
}

impl LifecycleCell {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            wake: Notify::new(),
        }
    }

    fn get(&self) -> Lifecycle {
        if self.running.load(Ordering::Acquire) {
            Lifecycle::Running
        } else {
            Lifecycle::Stopped
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.wake.notify_one();
    }
}

struct Shared {
    config: ReceiverConfig,
    runner: Arc<dyn ActionRunner>,
    global: Arc<dyn GlobalConfigProvider>,
    lifecycle: LifecycleCell,
    state: AtomicU8,
    started: AtomicBool,
}

/// WebSocket relay receiver with reconnect-forever semantics.
///
/// Cloning is cheap; clones share the same lifecycle.
#[derive(Clone)]
pub struct RelayReceiver {
    shared: Arc<Shared>,
}

/// Handle to a started receiver thread.
pub struct ReceiverHandle {
    receiver: RelayReceiver,
    thread: thread::JoinHandle<()>,
}

impl ReceiverHandle {
    /// See [`RelayReceiver::stop`].
    pub fn stop(&self) {
        self.receiver.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the receiver thread to exit. Only returns after `stop` and
    /// the end of the current connection.
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

impl RelayReceiver {
    /// Create a receiver. Nothing happens until [`start`](Self::start).
    pub fn new(
        config: ReceiverConfig,
        runner: Arc<dyn ActionRunner>,
        global: Arc<dyn GlobalConfigProvider>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                runner,
                global,
                lifecycle: LifecycleCell::new(),
                state: AtomicU8::new(ConnectionState::Stopped.as_u8()),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// False once [`stop`](Self::stop) has been called.
    pub fn is_active(&self) -> bool {
        self.shared.lifecycle.get() == Lifecycle::Running
    }

    fn set_state(&self, state: ConnectionState) {
        self.shared.state.store(state.as_u8(), Ordering::Release);
    }

    /// Launch the reconnect loop on a dedicated thread.
    ///
    /// Returns `Ok(None)` without starting anything when incoming processing
    /// is disabled, the relay address is empty, or the receiver was already
    /// started. A relay address that is not a WebSocket URL is an error.
    pub fn start(&self) -> ReceiverResult<Option<ReceiverHandle>> {
        let config = &self.shared.config;
        if config.is_send_only() {
            if config.incoming_enabled {
                warn!("Relay address empty, incoming receiver not started");
            } else {
                info!("Outgoing messages only mode, incoming receiver not started");
            }
            return Ok(None);
        }
        config.validate()?;
        if self.shared.started.swap(true, Ordering::AcqRel) {
            warn!("Relay receiver already started");
            return Ok(None);
        }

        let receiver = self.clone();
        let thread = thread::Builder::new()
            .name("relay-receiver".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "Failed to build relay receiver runtime");
                        return;
                    }
                };
                runtime.block_on(receiver.run_forever());
            })?;

        Ok(Some(ReceiverHandle {
            receiver: self.clone(),
            thread,
        }))
    }

    /// Ask the loop to exit.
    ///
    /// An open connection is not closed: the loop exits once it ends on its
    /// own, so a quiet socket can delay shutdown until the next read returns.
    /// A pending reconnect delay is cut short.
    pub fn stop(&self) {
        info!("Stopping incoming receiver");
        self.shared.lifecycle.stop();
    }

    /// Connect, receive until the connection ends, wait, repeat. Returns only
    /// after [`stop`](Self::stop).
    pub async fn run_forever(&self) {
        let config = &self.shared.config;
        info!(url = %config.relay_address, "Starting relay receiver");

        while self.shared.lifecycle.get() == Lifecycle::Running {
            self.set_state(ConnectionState::Connecting);
            match self.run_session().await {
                Ok(()) => info!("Relay websocket closed"),
                Err(e) => self.on_error(&e),
            }
            self.set_state(ConnectionState::Closing);

            if self.shared.lifecycle.get() == Lifecycle::Stopped {
                break;
            }

            info!(
                delay_ms = u64::try_from(config.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to relay after delay"
            );
            tokio::select! {
                _ = tokio::time::sleep(config.reconnect_delay) => {}
                _ = self.shared.lifecycle.wake.notified() => {}
            }
        }

        self.set_state(ConnectionState::Stopped);
        info!("Relay receiver stopped");
    }

    /// One connection lifetime: open, authenticate, receive until closed.
    async fn run_session(&self) -> ReceiverResult<()> {
        let address = self.shared.config.relay_address.as_str();
        debug!(url = %address, "Connecting to relay");

        let (ws_stream, _) = connect_async(address).await?;
        let (mut write, mut read) = ws_stream.split();
        self.set_state(ConnectionState::Open);

        let auth_json = self.on_open().to_json()?;
        self.trace_frame("out", &auth_json);
        write.send(Message::Text(auth_json.into())).await?;

        while let Some(frame) = read.next().await {
            match frame? {
                Message::Text(text) => {
                    self.trace_frame("in", &text);
                    self.on_message(&text);
                }
                Message::Binary(data) => match std::str::from_utf8(&data) {
                    Ok(text) => {
                        self.trace_frame("in", text);
                        self.on_message(text);
                    }
                    Err(_) => warn!(len = data.len(), "Ignoring non-UTF-8 binary frame"),
                },
                Message::Ping(data) => write.send(Message::Pong(data)).await?,
                Message::Close(frame) => {
                    debug!(frame = ?frame, "Relay sent close frame");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Build the auth frame from the current global configuration.
    fn on_open(&self) -> AuthFrame {
        let frame = AuthFrame::from_global(&self.shared.global.global_config());
        info!(
            target_id = %frame.target_id,
            claimed = frame.account_id.is_some(),
            "Connected to relay, authenticating"
        );
        frame
    }

    fn on_error(&self, error: &ReceiverError) {
        info!(error = %error, "Relay websocket error");
    }

    fn trace_frame(&self, direction: &'static str, frame: &str) {
        if self.shared.config.transport_tracing {
            debug!(target: TRANSPORT_TARGET, direction, frame, "Relay frame");
        }
    }

    /// Handle one inbound text frame. Never fails: every problem is logged
    /// and counted in the returned outcome.
    pub fn on_message(&self, raw: &str) -> InboundOutcome {
        debug!(len = raw.len(), "Received incoming message");
        let mut outcome = InboundOutcome::default();

        match InboundFrame::decode(raw) {
            Ok(InboundFrame::Callback(entries)) => {
                for (index, entry) in entries.into_iter().enumerate() {
                    match self.dispatch_callback_entry(entry) {
                        Ok(()) => outcome.dispatched += 1,
                        Err(e) => {
                            outcome.failed += 1;
                            error!(
                                entry = index,
                                error = %e,
                                raw_message = %raw,
                                "Failed to run incoming callback entry"
                            );
                        }
                    }
                }
            }
            Ok(InboundFrame::Direct(request)) => match self.dispatch_direct(request) {
                Ok(()) => outcome.dispatched += 1,
                Err(ReceiverError::Validation(_)) => outcome.rejected += 1,
                Err(e) => {
                    outcome.failed += 1;
                    error!(error = %e, raw_message = %raw, "Failed to run incoming action request");
                }
            },
            Err(e) => {
                outcome.failed += 1;
                error!(error = %e, raw_message = %raw, "Failed to parse incoming message");
            }
        }

        outcome
    }

    // Callback envelopes were authenticated by the system that produced them.
    fn dispatch_callback_entry(&self, entry: Value) -> ReceiverResult<()> {
        let request = CallbackEntry::from_value(entry)?.resolve()?;
        self.dispatch(request)
    }

    fn dispatch_direct(&self, request: SignedActionRequest) -> ReceiverResult<()> {
        let global = self.shared.global.global_config();
        let window = self.shared.config.request_time_window_secs;

        if let Err(e) = verify(&request, global.signing_key(), Utc::now().timestamp(), window) {
            let body = &request.body;
            error!(
                account_id = %body.account_id,
                cluster_name = %body.cluster_name,
                action_name = %body.action_name,
                timestamp = body.timestamp,
                reason = %e,
                "Rejected action request"
            );
            return Err(e.into());
        }

        self.dispatch(ResolvedActionRequest::from_verified(request.body))
    }

    fn dispatch(&self, request: ResolvedActionRequest) -> ReceiverResult<()> {
        request.ensure_dispatchable()?;
        info!(
            action_name = %request.action_name,
            target_id = %request.target_id,
            param_count = request.action_params.len(),
            sinks = ?request.sinks,
            "Running incoming action"
        );
        run_request(self.shared.runner.as_ref(), request)
    }
}
