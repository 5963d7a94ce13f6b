// ── Session lifecycle ──
//
// Owns authentication state and the coordination between the HTTP
// client, the incident repository, and the push channel: login unlocks
// fetch and connect, token rotation re-arms the push subscription, and
// a dead refresh token tears everything down.

use std::sync::{Arc, Mutex as StdMutex};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vigil_api::{
    ApiClient, ChannelState, PushChannel, ReconnectConfig, SessionHooks, TokenPair,
    TransportConfig, UserProfile,
};

use crate::config::{ClientConfig, TlsVerification};
use crate::convert;
use crate::error::CoreError;
use crate::store::{IncidentRepository, OverrideStore};

// ── SessionState ─────────────────────────────────────────────────────

/// Authentication state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated {
        user: Option<UserProfile>,
    },
}

// ── Token persistence ────────────────────────────────────────────────

/// Durable backend for the session's token pair. Implemented by the
/// config crate (keyring with a file fallback) and by an in-memory
/// store for tests.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<TokenPair>;
    fn save(&self, tokens: &TokenPair);
    fn clear(&self);
}

/// In-memory token store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    saved: StdMutex<Option<TokenPair>>,
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<TokenPair> {
        self.saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn save(&self, tokens: &TokenPair) {
        *self
            .saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(tokens.clone());
    }

    fn clear(&self) {
        *self
            .saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }
}

// ── Token-lifecycle signals ──────────────────────────────────────────

/// What the HTTP layer reports back through [`SessionHooks`].
#[derive(Debug)]
enum SessionSignal {
    TokenRefreshed(TokenPair),
    SessionExpired,
}

/// Bridges the synchronous hook callbacks onto the session's async
/// signal pump.
struct SignalHooks {
    tx: mpsc::UnboundedSender<SessionSignal>,
}

impl SessionHooks for SignalHooks {
    fn token_refreshed(&self, tokens: &TokenPair) {
        let _ = self.tx.send(SessionSignal::TokenRefreshed(tokens.clone()));
    }

    fn session_expired(&self) {
        let _ = self.tx.send(SessionSignal::SessionExpired);
    }
}

// ── SessionManager ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Wires the API client,
/// incident repository, and push channel together and drives their
/// shared lifecycle.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: ClientConfig,
    api: Arc<ApiClient>,
    repo: Arc<IncidentRepository>,
    channel: Arc<PushChannel>,
    token_store: Arc<dyn TokenStore>,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    /// Debounce guard for the current pending push (re)connect --
    /// cancelled and replaced whenever a newer trigger arrives.
    pending_connect: StdMutex<Option<CancellationToken>>,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionSignal>>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a session manager from configuration. Does NOT
    /// authenticate -- call [`login`](Self::login) or
    /// [`restore`](Self::restore).
    pub fn new(
        config: ClientConfig,
        token_store: Arc<dyn TokenStore>,
        override_store: Arc<dyn OverrideStore>,
    ) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: match &config.tls {
                TlsVerification::SystemDefaults => vigil_api::TlsMode::System,
                TlsVerification::CustomCa(path) => vigil_api::TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => vigil_api::TlsMode::DangerAcceptInvalid,
            },
            timeout: config.timeout,
        };

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let hooks: Arc<dyn SessionHooks> = Arc::new(SignalHooks { tx: signal_tx });

        let api = Arc::new(ApiClient::new(
            config.url.clone(),
            &transport,
            Some(hooks),
        )?);
        let repo = Arc::new(IncidentRepository::new(
            Arc::clone(&api),
            override_store,
            config.rollback,
        ));
        let ws_url = PushChannel::endpoint_for(&config.url)?;
        let channel = Arc::new(PushChannel::new(ws_url, ReconnectConfig::default()));
        let (state, _) = watch::channel(SessionState::Anonymous);

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                api,
                repo,
                channel,
                token_store,
                state,
                cancel: CancellationToken::new(),
                pending_connect: StdMutex::new(None),
                signal_rx: Mutex::new(Some(signal_rx)),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Authenticate with username/password.
    ///
    /// On success: tokens are persisted, the incident snapshot is
    /// fetched, and the push channel is armed. The initial fetch failing
    /// does not fail the login -- the repository surfaces it for retry.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<Option<UserProfile>, CoreError> {
        let _ = self.inner.state.send(SessionState::Authenticating);

        let outcome = match self.inner.api.login(username, password).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let _ = self.inner.state.send(SessionState::Anonymous);
                return Err(err.into());
            }
        };

        self.inner.token_store.save(&outcome.tokens);
        let _ = self.inner.state.send(SessionState::Authenticated {
            user: outcome.user.clone(),
        });
        info!(username, "session authenticated");

        self.start_tasks().await;

        if let Err(err) = self.inner.repo.fetch_all().await {
            warn!(error = %err, "initial incident fetch failed");
        }
        if self.inner.config.push_enabled {
            self.schedule_connect();
        }

        Ok(outcome.user)
    }

    /// Restore a previous session from persisted tokens.
    ///
    /// Returns `false` when no tokens are saved. A stale access token
    /// is fine: the first authenticated request will run through the
    /// refresh machinery, and a dead refresh token ends in the usual
    /// expiry teardown.
    pub async fn restore(&self) -> bool {
        let Some(tokens) = self.inner.token_store.load() else {
            return false;
        };

        self.inner.api.set_tokens(tokens);
        let _ = self
            .inner
            .state
            .send(SessionState::Authenticated { user: None });
        info!("session restored from persisted tokens");

        self.start_tasks().await;

        if let Err(err) = self.inner.repo.fetch_all().await {
            warn!(error = %err, "incident fetch after restore failed");
        }
        if self.inner.config.push_enabled {
            self.schedule_connect();
        }

        true
    }

    /// Drop the session: credentials cleared everywhere, push channel
    /// closed. The already-fetched incident list is left in place.
    pub fn logout(&self) {
        self.cancel_pending_connect();
        self.inner.channel.disconnect();
        self.inner.api.clear_tokens();
        self.inner.token_store.clear();
        let _ = self.inner.state.send(SessionState::Anonymous);
        info!("logged out");
    }

    /// Tear down all background tasks. The manager is not reusable
    /// afterwards.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.cancel_pending_connect();
        self.inner.channel.disconnect();
        for handle in self.inner.task_handles.lock().await.drain(..) {
            handle.abort();
        }
    }

    // ── Observability ────────────────────────────────────────────────

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Push-channel connection state (header indicator).
    pub fn channel_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.channel.state()
    }

    /// The incident repository backing this session.
    pub fn repository(&self) -> &Arc<IncidentRepository> {
        &self.inner.repo
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // ── Background tasks ─────────────────────────────────────────────

    /// Spawn the signal pump, push-event pump, and periodic refresh.
    /// Idempotent: the signal receiver is taken on the first call.
    async fn start_tasks(&self) {
        let Some(signal_rx) = self.inner.signal_rx.lock().await.take() else {
            return;
        };

        let mut handles = self.inner.task_handles.lock().await;

        {
            let manager = self.clone();
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(signal_pump(manager, signal_rx, cancel)));
        }

        if self.inner.config.push_enabled {
            let repo = Arc::clone(&self.inner.repo);
            let events = self.inner.channel.subscribe();
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(push_pump(repo, events, cancel)));
        }

        let interval_secs = self.inner.config.refresh_interval_secs;
        if interval_secs > 0 {
            let manager = self.clone();
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(refresh_task(manager, interval_secs, cancel)));
        }
    }

    /// Debounced push-channel (re)connect with the current access token.
    ///
    /// Rapid token rotation collapses into a single reconnect: each new
    /// trigger cancels the previous pending one, and only the last
    /// survivor actually dials. A rotation that leaves the channel's
    /// active token unchanged is a no-op.
    fn schedule_connect(&self) {
        let Some(access) = self.inner.api.access_token() else {
            return;
        };

        if let Some(active) = self.inner.channel.active_token() {
            if active.expose_secret() == access.expose_secret()
                && self.inner.channel.current_state() != ChannelState::Disconnected
            {
                debug!("push channel already carries the current token");
                return;
            }
        }

        let guard = self.inner.cancel.child_token();
        {
            let mut pending = self
                .inner
                .pending_connect
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(prior) = pending.take() {
                prior.cancel();
            }
            *pending = Some(guard.clone());
        }

        let channel = Arc::clone(&self.inner.channel);
        let debounce = self.inner.config.reconnect_debounce;
        tokio::spawn(async move {
            tokio::select! {
                () = guard.cancelled() => {}
                () = tokio::time::sleep(debounce) => channel.connect(&access),
            }
        });
    }

    fn cancel_pending_connect(&self) {
        let prior = self
            .inner
            .pending_connect
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(prior) = prior {
            prior.cancel();
        }
    }
}

// ── Task bodies ──────────────────────────────────────────────────────

/// Reacts to token-lifecycle events reported by the HTTP layer.
async fn signal_pump(
    manager: SessionManager,
    mut signals: mpsc::UnboundedReceiver<SessionSignal>,
    cancel: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            () = cancel.cancelled() => return,
            signal = signals.recv() => match signal {
                Some(signal) => signal,
                None => return,
            },
        };

        match signal {
            SessionSignal::TokenRefreshed(tokens) => {
                debug!("access token rotated");
                manager.inner.token_store.save(&tokens);
                if manager.inner.config.push_enabled {
                    manager.schedule_connect();
                }
            }
            SessionSignal::SessionExpired => {
                warn!("refresh token rejected, session expired");
                manager.cancel_pending_connect();
                manager.inner.channel.disconnect();
                manager.inner.token_store.clear();
                let _ = manager.inner.state.send(SessionState::Anonymous);
            }
        }
    }
}

/// Applies pushed incidents to the repository, exactly one upsert per
/// received event.
async fn push_pump(
    repo: Arc<IncidentRepository>,
    mut events: tokio::sync::broadcast::Receiver<Arc<vigil_api::PushEvent>>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Ok(event) => {
                if let Some(incident) = convert::incident_from_record(event.record.clone()) {
                    repo.upsert(incident);
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "push pump lagged behind the event stream");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Periodic full refetch while a session is active.
async fn refresh_task(manager: SessionManager, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; the login/restore path already
    // fetched, so skip it.
    interval.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        if !manager.inner.api.has_tokens() {
            continue;
        }
        if let Err(err) = manager.inner.repo.fetch_all().await {
            warn!(error = %err, "periodic incident refresh failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pair(access: &str, refresh: Option<&str>) -> TokenPair {
        TokenPair {
            access: SecretString::from(access.to_owned()),
            refresh: refresh.map(|r| SecretString::from(r.to_owned())),
        }
    }

    #[test]
    fn memory_token_store_round_trips() {
        let store = MemoryTokenStore::default();
        assert!(store.load().is_none());

        store.save(&pair("acc", Some("ref")));
        let loaded = store.load().unwrap();
        assert_eq!(loaded.access.expose_secret(), "acc");
        assert_eq!(loaded.refresh.unwrap().expose_secret(), "ref");

        store.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn signal_hooks_forward_both_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hooks = SignalHooks { tx };

        hooks.token_refreshed(&pair("fresh", None));
        hooks.session_expired();

        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionSignal::TokenRefreshed(_)
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionSignal::SessionExpired
        ));
    }

    #[tokio::test]
    async fn restore_without_saved_tokens_stays_anonymous() {
        let manager = SessionManager::new(
            ClientConfig {
                url: "https://vigil.test".parse().unwrap(),
                push_enabled: false,
                refresh_interval_secs: 0,
                ..ClientConfig::default()
            },
            Arc::new(MemoryTokenStore::default()),
            Arc::new(crate::store::MemoryOverrideStore::default()),
        )
        .unwrap();

        assert!(!manager.restore().await);
        assert_eq!(manager.current_state(), SessionState::Anonymous);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_token_rotation_collapses_to_one_pending_connect() {
        let manager = SessionManager::new(
            ClientConfig {
                url: "https://vigil.test".parse().unwrap(),
                refresh_interval_secs: 0,
                ..ClientConfig::default()
            },
            Arc::new(MemoryTokenStore::default()),
            Arc::new(crate::store::MemoryOverrideStore::default()),
        )
        .unwrap();

        manager.inner.api.set_tokens(pair("first", None));
        manager.schedule_connect();
        manager.inner.api.set_tokens(pair("second", None));
        manager.schedule_connect();

        // Only the second trigger survives its debounce window; it will
        // dial the (unreachable) endpoint, flipping the channel out of
        // Disconnected exactly once.
        let mut channel_state = manager.channel_state();
        tokio::time::sleep(manager.inner.config.reconnect_debounce * 2).await;
        channel_state.changed().await.unwrap();
        assert_eq!(
            manager.inner.channel.active_token().unwrap().expose_secret(),
            "second"
        );
        manager.shutdown().await;
    }
}
