// vigil-api: async client for the incident platform's REST + push API.

pub mod auth;
pub mod client;
pub mod error;
pub mod incidents;
pub mod normalize;
pub mod push;
pub mod transport;

pub use auth::{LoginOutcome, UserProfile};
pub use client::{ApiClient, SessionHooks, TokenPair};
pub use error::Error;
pub use incidents::IncidentRecord;
pub use push::{ChannelState, PushChannel, PushEvent, PushKind, ReconnectConfig};
pub use transport::{TlsMode, TransportConfig};
