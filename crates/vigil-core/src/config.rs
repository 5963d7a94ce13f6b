// ── Runtime client configuration ──
//
// These types describe *how* to talk to an incident backend. They carry
// connection tuning only, never credentials, and never touch disk. The
// embedding application builds a `ClientConfig` and hands it in.

use std::time::Duration;

use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict). Default.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed lab backends).
    DangerAcceptInvalid,
}

/// What to do with an optimistic status override when the server
/// rejects the corresponding update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RollbackPolicy {
    /// Keep the local override; the analyst's choice stands and the
    /// failure is surfaced for retry. Default.
    #[default]
    KeepLocal,
    /// Revert the override to the pre-edit effective status when the
    /// server definitively rejects the update (4xx other than auth or
    /// throttling). Transient failures still keep the local value.
    RevertOnRejection,
}

/// Configuration for one backend session.
///
/// Built by the embedding application, passed to `SessionManager` --
/// core never reads config files.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (e.g. `https://vigil.example.com`).
    pub url: Url,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Request timeout.
    pub timeout: Duration,
    /// How often to refetch the full incident snapshot (seconds). 0 = never.
    pub refresh_interval_secs: u64,
    /// Enable the live push channel.
    pub push_enabled: bool,
    /// Quiet period that absorbs rapid token-rotation churn before the
    /// push channel is (re)connected.
    pub reconnect_debounce: Duration,
    /// Optimistic-update failure handling.
    pub rollback: RollbackPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("https://localhost:8443").unwrap_or_else(|_| unreachable!()),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            refresh_interval_secs: 300,
            push_enabled: true,
            reconnect_debounce: Duration::from_millis(300),
            rollback: RollbackPolicy::default(),
        }
    }
}
