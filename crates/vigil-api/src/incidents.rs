// Incident endpoints: list and status update.
//
// Both go through `send_json`, so a 401 on either triggers the
// refresh-and-retry-once policy. Responses are normalized through
// `normalize` -- callers never see the raw wrapping.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::normalize;

/// Wire-level incident record, as the platform sends it.
///
/// `id` and `severity` are required -- a payload without them is not
/// an incident. Everything else is tolerated as missing, because push
/// events and PATCH responses are not always complete. `vigil-core`
/// converts this into its typed domain model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentRecord {
    pub id: String,
    pub severity: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub status: String,
}

impl ApiClient {
    /// Fetch the full incident list.
    ///
    /// A structurally unexpected response yields an empty list, not an
    /// error -- the repository treats "the server sent nonsense" the
    /// same as "the server sent nothing".
    pub async fn list_incidents(&self) -> Result<Vec<IncidentRecord>, Error> {
        let value = self
            .send_json(Method::GET, "/api/incidents", None)
            .await?;
        let records = normalize::incident_list(&value);
        debug!(count = records.len(), "fetched incidents");
        Ok(records)
    }

    /// Update one incident's status on the server.
    ///
    /// Returns the server's view of the incident when the response
    /// carries one; `None` when the body was empty or unrecognizable
    /// (the update still succeeded -- HTTP errors surface as `Err`).
    pub async fn update_incident_status(
        &self,
        id: &str,
        status: &str,
    ) -> Result<Option<IncidentRecord>, Error> {
        let path = format!("/api/incidents/{id}");
        let body = json!({ "status": status });
        let value = self.send_json(Method::PATCH, &path, Some(&body)).await?;
        Ok(normalize::incident(&value))
    }
}
