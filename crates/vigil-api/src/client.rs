// REST client for the incident platform.
//
// Wraps `reqwest::Client` with bearer authentication and the
// refresh-and-retry-once policy: any authenticated request that comes
// back 401 triggers exactly one token refresh, after which the original
// request is re-issued exactly once. A second 401, or a failed refresh,
// surfaces as `Error::SessionExpired` and notifies the session hooks.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::normalize;
use crate::transport::TransportConfig;

pub(crate) const LOGIN_PATH: &str = "/api/auth/login";
pub(crate) const REFRESH_PATH: &str = "/api/auth/refresh";

/// A persisted access/refresh token pair.
///
/// The refresh token is optional -- some deployments issue only an
/// access token, in which case a 401 is immediately terminal.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: SecretString,
    pub refresh: Option<SecretString>,
}

/// Callbacks the HTTP layer invokes on token-lifecycle events.
///
/// This is the seam that breaks the circular dependency between the
/// HTTP client and the session state: the client never imports session
/// types, it only calls this interface. The session manager implements
/// it to persist rotated tokens and to force a logout when the refresh
/// token dies.
pub trait SessionHooks: Send + Sync {
    /// A refresh succeeded; `tokens` is the full pair now in effect.
    fn token_refreshed(&self, tokens: &TokenPair);

    /// The refresh token was rejected. Credentials are already cleared
    /// from the client by the time this fires.
    fn session_expired(&self);
}

/// Bearer-authenticated HTTP client for the incident platform.
///
/// Thread-safe and cheap to share behind an `Arc`. The token pair
/// lives in an `ArcSwapOption` so rotation never blocks readers.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: ArcSwapOption<TokenPair>,
    hooks: Option<Arc<dyn SessionHooks>>,
}

impl ApiClient {
    /// Create a client for the given platform base URL.
    ///
    /// `hooks` is injected at construction -- there is no late-bound
    /// setter, so the wiring order is explicit at the call site.
    pub fn new(
        base_url: Url,
        transport: &TransportConfig,
        hooks: Option<Arc<dyn SessionHooks>>,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            tokens: ArcSwapOption::empty(),
            hooks,
        })
    }

    /// The platform base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying HTTP client (for auth flows that bypass the
    /// bearer/retry plumbing).
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Install a token pair (after login, or when restoring a session).
    pub fn set_tokens(&self, tokens: TokenPair) {
        self.tokens.store(Some(Arc::new(tokens)));
    }

    /// Drop all credentials (logout).
    pub fn clear_tokens(&self) {
        self.tokens.store(None);
    }

    /// The access token currently in effect, if any.
    pub fn access_token(&self) -> Option<SecretString> {
        self.tokens.load().as_ref().map(|t| t.access.clone())
    }

    /// Whether a token pair is installed.
    pub fn has_tokens(&self) -> bool {
        self.tokens.load().is_some()
    }

    // ── Request plumbing ─────────────────────────────────────────────

    /// Send an authenticated request and parse the JSON body.
    ///
    /// On 401 (outside the auth endpoints, which never reach this
    /// method), refreshes the access token once and retries once.
    pub(crate) async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let url = self.base_url.join(path)?;

        let resp = self
            .dispatch(method.clone(), url.clone(), body, self.access_token())
            .await?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return Self::parse_body(resp).await;
        }

        debug!(%url, "got 401, attempting token refresh");
        let access = self.refresh_access_token().await?;

        let retry = self.dispatch(method, url, body, Some(access)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            // The refreshed token was rejected too. Do not loop.
            self.expire_session();
            return Err(Error::SessionExpired);
        }
        Self::parse_body(retry).await
    }

    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        bearer: Option<SecretString>,
    ) -> Result<reqwest::Response, Error> {
        let mut req = self.http.request(method, url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token.expose_secret());
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        req.send().await.map_err(Error::Transport)
    }

    /// Parse a response body as JSON, mapping non-success statuses to
    /// `Error::Api` with a best-effort message from the body.
    pub(crate) async fn parse_body(resp: reqwest::Response) -> Result<Value, Error> {
        let status = resp.status();
        let text = resp.text().await.map_err(Error::Transport)?;

        let value: Value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text.clone(),
            })?
        };

        if status.is_success() {
            return Ok(value);
        }

        Err(Error::Api {
            status: status.as_u16(),
            message: normalize::error_message(&value)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").into()),
        })
    }

    // ── Token refresh ────────────────────────────────────────────────

    /// Exchange the refresh token for a new access token.
    ///
    /// On success the stored pair is rotated (keeping the old refresh
    /// token if the response omits one) and the hooks are notified.
    /// On any failure the session is expired: tokens cleared, hooks
    /// notified, `Error::SessionExpired` returned.
    async fn refresh_access_token(&self) -> Result<SecretString, Error> {
        let refresh = self.tokens.load().as_ref().and_then(|t| t.refresh.clone());
        let Some(refresh) = refresh else {
            warn!("401 with no refresh token available");
            self.expire_session();
            return Err(Error::SessionExpired);
        };

        match self.request_refresh(&refresh).await {
            Ok((access, new_refresh)) => {
                let access = SecretString::from(access);
                let tokens = TokenPair {
                    access: access.clone(),
                    refresh: new_refresh.map(SecretString::from).or(Some(refresh)),
                };
                self.tokens.store(Some(Arc::new(tokens.clone())));
                if let Some(hooks) = &self.hooks {
                    hooks.token_refreshed(&tokens);
                }
                debug!("access token refreshed");
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                self.expire_session();
                Err(Error::SessionExpired)
            }
        }
    }

    async fn request_refresh(
        &self,
        refresh: &SecretString,
    ) -> Result<(String, Option<String>), Error> {
        let url = self.base_url.join(REFRESH_PATH)?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(refresh.expose_secret())
            .json(&Value::Object(serde_json::Map::new()))
            .send()
            .await
            .map_err(Error::Transport)?;

        let value = Self::parse_body(resp).await?;
        normalize::token_pair(&value).ok_or_else(|| Error::Deserialization {
            message: "refresh response carried no access token".into(),
            body: value.to_string(),
        })
    }

    fn expire_session(&self) {
        self.clear_tokens();
        if let Some(hooks) = &self.hooks {
            hooks.session_expired();
        }
    }
}
