// Auth endpoints: login and (indirectly) refresh.
//
// Login never carries a bearer token and never triggers the
// refresh-and-retry path -- a 401 here means bad credentials, not an
// expired session. The refresh endpoint lives in `client.rs` because
// it is part of the retry machinery, not a user-facing operation.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::client::{ApiClient, LOGIN_PATH, TokenPair};
use crate::error::Error;
use crate::normalize;

/// The authenticated analyst, as reported by the login response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: Option<UserProfile>,
}

impl ApiClient {
    /// Authenticate with username/password.
    ///
    /// On success the returned token pair is also installed on the
    /// client, so subsequent requests are authenticated immediately.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, Error> {
        let url = self.base_url().join(LOGIN_PATH)?;
        debug!(%url, username, "logging in");

        let body = json!({
            "username": username,
            "password": password.expose_secret(),
        });

        let resp = self
            .http()
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let value = match Self::parse_body(resp).await {
            Ok(value) => value,
            Err(Error::Api { message, .. }) => {
                return Err(Error::Authentication { message });
            }
            Err(e) => return Err(e),
        };

        let Some((access, refresh)) = normalize::token_pair(&value) else {
            return Err(Error::Authentication {
                message: "login response carried no access token".into(),
            });
        };

        let tokens = TokenPair {
            access: SecretString::from(access),
            refresh: refresh.map(SecretString::from),
        };
        self.set_tokens(tokens.clone());

        let user = value
            .get("user")
            .and_then(|u| serde_json::from_value(u.clone()).ok());

        debug!("login successful");
        Ok(LoginOutcome { tokens, user })
    }
}
