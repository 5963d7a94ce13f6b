//! Live-update push channel with auto-reconnect.
//!
//! Maintains at most one websocket connection to the platform's event
//! endpoint, authenticated with the current access token. Inbound
//! frames are parsed into [`PushEvent`]s and fanned out through a
//! [`tokio::sync::broadcast`] channel; connection-state transitions are
//! published through a `watch` channel for the header indicator.
//!
//! `connect()` is idempotent: it always tears down any existing
//! connection first, so calling it again after a token refresh is the
//! normal way to re-authenticate the stream.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::incidents::IncidentRecord;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── Event types ──────────────────────────────────────────────────────

/// What a push frame announced. New and updated incidents are handled
/// identically downstream; the kind is kept for observers that care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    New,
    Updated,
}

/// A parsed incident event from the push stream.
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub kind: PushKind,
    pub record: IncidentRecord,
}

/// Connection state observable by consumers. Drives the header
/// indicator only -- data correctness never depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting {
        attempt: u32,
    },
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── PushChannel ──────────────────────────────────────────────────────

struct ActiveConnection {
    cancel: CancellationToken,
    token: SecretString,
}

/// Handle to the (at most one) live push connection.
pub struct PushChannel {
    ws_url: Url,
    reconnect: ReconnectConfig,
    state: Arc<watch::Sender<ChannelState>>,
    events: broadcast::Sender<Arc<PushEvent>>,
    active: Mutex<Option<ActiveConnection>>,
}

impl PushChannel {
    /// Create a channel for the given websocket URL. Nothing is opened
    /// until [`connect`](Self::connect) is called.
    pub fn new(ws_url: Url, reconnect: ReconnectConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            ws_url,
            reconnect,
            state: Arc::new(state),
            events,
            active: Mutex::new(None),
        }
    }

    /// Derive the websocket URL from the platform's HTTP base URL.
    pub fn endpoint_for(base: &Url) -> Result<Url, Error> {
        let mut url = base.join("/events")?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::PushConnect(format!("cannot derive ws URL from {base}")))?;
        Ok(url)
    }

    /// Open (or re-open) the connection with the given access token.
    ///
    /// Any prior connection is torn down first -- its cancellation
    /// fires synchronously before the new task is spawned, so exactly
    /// one subscription is ever live.
    pub fn connect(&self, token: &SecretString) {
        let cancel = CancellationToken::new();
        {
            let mut active = self
                .active
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(prior) = active.take() {
                prior.cancel.cancel();
            }
            *active = Some(ActiveConnection {
                cancel: cancel.clone(),
                token: token.clone(),
            });
        }

        let _ = self.state.send(ChannelState::Connecting);

        let ws_url = self.ws_url.clone();
        let reconnect = self.reconnect.clone();
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let token = token.clone();
        tokio::spawn(async move {
            ws_loop(ws_url, token, events, reconnect, cancel, state).await;
        });
    }

    /// Tear down the connection. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        let prior = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(prior) = prior {
            prior.cancel.cancel();
        }
        let _ = self.state.send(ChannelState::Disconnected);
    }

    /// The token the current connection was opened with, if any.
    ///
    /// The session manager compares this against a freshly rotated
    /// token to decide whether a reconnect is needed.
    pub fn active_token(&self) -> Option<SecretString> {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .map(|a| a.token.clone())
    }

    /// Subscribe to connection-state transitions.
    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// The current connection state.
    pub fn current_state(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    /// Get a new broadcast receiver for the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PushEvent>> {
        self.events.subscribe()
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect, read until the stream drops, back off, repeat.
async fn ws_loop(
    ws_url: Url,
    token: SecretString,
    event_tx: broadcast::Sender<Arc<PushEvent>>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    state: Arc<watch::Sender<ChannelState>>,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&ws_url, &token, &event_tx, &cancel, &state) => {
                if cancel.is_cancelled() {
                    // A newer connection owns the state channel now.
                    break;
                }
                match result {
                    // Clean disconnect (server close frame or stream ended).
                    // Reset the attempt counter, but still wait the initial
                    // delay: a backend that accepts the handshake and then
                    // closes must not be redialled in a tight loop.
                    Ok(()) => {
                        tracing::info!("push stream disconnected cleanly, reconnecting");
                        attempt = 0;
                        let _ = state.send(ChannelState::Reconnecting { attempt });
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(reconnect.initial_delay) => {}
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "push stream error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(max_retries = max, "push reconnection limit reached");
                                let _ = state.send(ChannelState::Disconnected);
                                break;
                            }
                        }

                        let _ = state.send(ChannelState::Reconnecting { attempt });
                        let delay = backoff_delay(attempt, &reconnect);
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}

/// Establish a single connection and read frames until it drops.
async fn connect_and_read(
    url: &Url,
    token: &SecretString,
    event_tx: &broadcast::Sender<Arc<PushEvent>>,
    cancel: &CancellationToken,
    state: &watch::Sender<ChannelState>,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting push stream");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::PushConnect(e.to_string()))?;

    let request = ClientRequestBuilder::new(uri)
        .with_header("Authorization", format!("Bearer {}", token.expose_secret()));

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::PushConnect(e.to_string()))?;

    tracing::info!("push stream connected");
    if !cancel.is_cancelled() {
        let _ = state.send(ChannelState::Connected);
    }

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_dispatch(&text, event_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite replies with pong automatically
                        tracing::trace!("push ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "push close frame");
                        } else {
                            tracing::info!("push close frame (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::PushConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("push stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Wire envelope: `{ "event": "incident_new", "data": {...} }`,
/// where the payload may itself be wrapped one level under `data`.
#[derive(Debug, Deserialize)]
struct PushFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Parse one text frame and dispatch at most one event.
///
/// The same incident arriving under two event names reaches consumers
/// once per frame by construction -- there is a single parse path, not
/// competing named handlers plus a catch-all.
fn parse_and_dispatch(text: &str, event_tx: &broadcast::Sender<Arc<PushEvent>>) {
    let frame: PushFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable push frame");
            return;
        }
    };

    let Some((kind, exact)) = classify_event(&frame.event) else {
        tracing::trace!(event = %frame.event, "ignoring non-incident push event");
        return;
    };

    // Payload may be wrapped one more level: { data: { data: {...} } }.
    let payload = match frame.data.get("data") {
        Some(inner) if inner.is_object() => inner,
        _ => &frame.data,
    };

    let record: IncidentRecord = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, event = %frame.event, "push payload is not incident-shaped");
            return;
        }
    };

    // The catch-all name match demands more evidence than the exact
    // names do: an unknown event only counts if it also has a category.
    if !exact && record.category.is_empty() {
        tracing::debug!(event = %frame.event, "fuzzy-matched event lacks category, dropping");
        return;
    }

    tracing::debug!(id = %record.id, ?kind, "push incident received");
    // Send errors just mean no active subscribers right now.
    let _ = event_tx.send(Arc::new(PushEvent { kind, record }));
}

/// Map an event name to a push kind.
///
/// Exact names first; otherwise a substring match tolerates a backend
/// whose event taxonomy drifts ("incident_created", "new_alert", ...).
/// The bool is `true` for an exact match.
fn classify_event(event: &str) -> Option<(PushKind, bool)> {
    match event {
        "incident_new" => Some((PushKind::New, true)),
        "incident_update" => Some((PushKind::Updated, true)),
        _ if event.contains("new") => Some((PushKind::New, false)),
        _ if event.contains("update") => Some((PushKind::Updated, false)),
        _ => None,
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with deterministic jitter:
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`.
fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
    let capped = base.min(config.max_delay.as_secs_f64());

    // Seeded from the attempt number -- no RNG needed for backoff spread.
    let jitter = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────
