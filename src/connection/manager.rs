//! Connection Manager: lifecycle, state machine and reconnection.
//!
//! One supervisor task owns the link for the whole process:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Open ──close/error──▶ Disconnected
//!                               │                                         ▲
//!                               └──────────────failure────────────────────┘
//! any state ──shutdown──▶ Closed (terminal)
//! ```
//!
//! After every failure or close the supervisor arms a one-shot timer for the
//! current backoff delay, then retries. The timer and the open link both
//! race a shutdown watch channel, so `shutdown()` cancels either one.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::backoff::Backoff;
use super::errors::ConnectionError;
use super::transport::{Connector, Link};

// ─── Settings ────────────────────────────────────────────────────────────────

/// Path segment the coordinator serves distributed nodes on.
const ENDPOINT_PATH: &str = "vcp-distributed-server";

/// Validated coordinator endpoint and pre-shared credential.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    base_url: String,
    key: String,
}

impl ConnectionSettings {
    /// Validate endpoint and credential. Blank values count as missing.
    pub fn new(
        base_url: Option<&str>,
        key: Option<&str>,
    ) -> Result<Self, ConnectionError> {
        let base_url = base_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConnectionError::ConfigMissing {
                field: "Main_Server_URL",
            })?;
        let key = key
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConnectionError::ConfigMissing { field: "VCP_Key" })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        })
    }

    /// Coordinator base URL. Safe to log.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full endpoint URL with the credential embedded. Never log this.
    pub fn endpoint_url(&self) -> String {
        format!("{}/{ENDPOINT_PATH}/VCP_Key={}", self.base_url, self.key)
    }
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("base_url", &self.base_url)
            .field("key", &"<redacted>")
            .finish()
    }
}

// ─── State & Events ──────────────────────────────────────────────────────────

/// Lifecycle state of the coordinator connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Terminal. Entered only through `shutdown()`.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Signals delivered to the Protocol Handler, in link order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A link was opened. Always precedes that link's frames.
    Opened,
    /// Raw inbound text frame.
    Frame(String),
}

// ─── ConnectionManager ───────────────────────────────────────────────────────

/// Mutable connection state. Every transition happens under this lock.
#[derive(Debug)]
struct LinkState {
    state: ConnectionState,
    backoff: Backoff,
    /// Queue feeding the open link's sink. `Some` only while `Open`.
    writer: Option<mpsc::UnboundedSender<String>>,
    supervisor: Option<JoinHandle<()>>,
}

struct Inner {
    settings: ConnectionSettings,
    connector: Arc<dyn Connector>,
    link: Mutex<LinkState>,
    events: Mutex<Option<mpsc::UnboundedSender<ConnectionEvent>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        // A poisoned lock only means a panic elsewhere; the state is still usable.
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn events(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<ConnectionEvent>>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

/// Owns the coordinator connection. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("base_url", &self.inner.settings.base_url())
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionManager {
    /// Create a manager in `Disconnected` and the event receiver the
    /// Protocol Handler consumes.
    pub fn new(
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        Self::with_backoff(settings, connector, Backoff::default())
    }

    /// Like [`ConnectionManager::new`] with a custom backoff policy.
    pub fn with_backoff(
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
        backoff: Backoff,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        let inner = Inner {
            settings,
            connector,
            link: Mutex::new(LinkState {
                state: ConnectionState::Disconnected,
                backoff,
                writer: None,
                supervisor: None,
            }),
            events: Mutex::new(Some(events_tx)),
            shutdown_tx,
        };

        (
            Self {
                inner: Arc::new(inner),
            },
            events_rx,
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Delay the next scheduled reconnect would wait.
    pub fn current_backoff(&self) -> Duration {
        self.inner.lock().backoff.current()
    }

    /// Start connecting.
    ///
    /// No-op unless the state is `Disconnected` with no reconnect timer
    /// armed, so attempts never overlap. Returns whether an attempt started.
    pub fn connect(&self) -> bool {
        let mut link = self.inner.lock();

        if link.state != ConnectionState::Disconnected || self.inner.is_shutting_down() {
            return false;
        }
        if link
            .supervisor
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            return false;
        }

        let Some(events) = self.inner.events().clone() else {
            return false;
        };

        link.state = ConnectionState::Connecting;
        let inner = Arc::clone(&self.inner);
        link.supervisor = Some(tokio::spawn(supervise(inner, events)));
        true
    }

    /// Queue a text frame on the open link.
    ///
    /// Fails with `NotConnected` when the state is not `Open`; the frame is
    /// dropped and never retried.
    pub fn send(&self, frame: String) -> Result<(), ConnectionError> {
        let link = self.inner.lock();

        let not_connected = || ConnectionError::NotConnected {
            state: link.state.to_string(),
        };

        if link.state != ConnectionState::Open {
            tracing::error!(
                state = %link.state,
                "cannot send message, connection is not open"
            );
            return Err(not_connected());
        }

        match &link.writer {
            Some(writer) if writer.send(frame).is_ok() => Ok(()),
            _ => {
                tracing::error!("cannot send message, link writer is gone");
                Err(not_connected())
            }
        }
    }

    /// Cancel any armed reconnect timer, close the open link and enter the
    /// terminal `Closed` state. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.shutdown_tx.send_replace(true);

        let supervisor = self.inner.lock().supervisor.take();
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "connection supervisor ended abnormally");
            }
        }

        {
            let mut link = self.inner.lock();
            link.state = ConnectionState::Closed;
            link.writer = None;
        }

        // Dropping the sender ends the Protocol Handler's loop.
        self.inner.events().take();

        tracing::info!(base_url = %self.inner.settings.base_url(), "connection closed");
    }
}

// ─── Supervisor ──────────────────────────────────────────────────────────────

/// Why a link stopped pumping.
#[derive(Debug, PartialEq, Eq)]
enum PumpExit {
    RemoteClosed,
    Fault(String),
    Shutdown,
}

/// Connect, pump, back off, repeat until shutdown.
async fn supervise(inner: Arc<Inner>, events: mpsc::UnboundedSender<ConnectionEvent>) {
    let mut shutdown_rx = inner.shutdown_tx.subscribe();
    let url = inner.settings.endpoint_url();
    let base_url = inner.settings.base_url().to_string();

    loop {
        tracing::info!(base_url = %base_url, "attempting to connect to main server");

        let attempt = tokio::select! {
            _ = shutdown_requested(&mut shutdown_rx) => return,
            attempt = inner.connector.connect(&url) => attempt,
        };

        match attempt {
            Ok(link) => {
                let (writer_tx, writer_rx) = mpsc::unbounded_channel();
                {
                    let mut state = inner.lock();
                    state.state = ConnectionState::Open;
                    state.backoff.reset();
                    state.writer = Some(writer_tx);
                }
                tracing::info!(base_url = %base_url, "connected to main server");
                let _ = events.send(ConnectionEvent::Opened);

                let exit = pump(link, writer_rx, &events, &mut shutdown_rx).await;

                {
                    let mut state = inner.lock();
                    state.writer = None;
                    if exit != PumpExit::Shutdown {
                        state.state = ConnectionState::Disconnected;
                    }
                }

                match exit {
                    PumpExit::Shutdown => return,
                    PumpExit::RemoteClosed => {
                        tracing::info!(base_url = %base_url, "disconnected from main server");
                    }
                    PumpExit::Fault(reason) => {
                        tracing::error!(base_url = %base_url, error = %reason, "connection error");
                    }
                }
            }
            Err(e) => {
                inner.lock().state = ConnectionState::Disconnected;
                tracing::error!(base_url = %base_url, error = %e, "failed to connect to main server");
            }
        }

        if inner.is_shutting_down() {
            return;
        }

        // Schedule the reconnect: wait the current delay, grow it for next time.
        let delay = inner.lock().backoff.next_delay();
        tracing::info!(
            delay_secs = delay.as_secs_f64(),
            "attempting to reconnect after delay"
        );

        tokio::select! {
            _ = shutdown_requested(&mut shutdown_rx) => return,
            _ = tokio::time::sleep(delay) => {}
        }

        {
            let mut state = inner.lock();
            if state.state != ConnectionState::Disconnected {
                return;
            }
            state.state = ConnectionState::Connecting;
        }
    }
}

/// Resolves once shutdown has been requested.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// Move frames between the link and the manager until it ends.
async fn pump(
    mut link: Link,
    mut writer_rx: mpsc::UnboundedReceiver<String>,
    events: &mpsc::UnboundedSender<ConnectionEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> PumpExit {
    loop {
        tokio::select! {
            _ = shutdown_requested(&mut *shutdown_rx) => {
                if let Err(e) = link.sink.close().await {
                    tracing::debug!(error = %e, "error while closing link");
                }
                return PumpExit::Shutdown;
            }
            Some(frame) = writer_rx.recv() => {
                if let Err(e) = link.sink.send(frame).await {
                    return PumpExit::Fault(e.to_string());
                }
            }
            inbound = link.stream.next() => match inbound {
                Some(Ok(frame)) => {
                    let _ = events.send(ConnectionEvent::Frame(frame));
                }
                Some(Err(e)) => return PumpExit::Fault(e.to_string()),
                None => return PumpExit::RemoteClosed,
            },
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
