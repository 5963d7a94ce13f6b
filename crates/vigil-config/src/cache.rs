// ── Status-override cache ──
//
// File-backed implementation of `vigil_core::OverrideStore`. One JSON
// blob, read-modify-write, tolerant of a missing or corrupt file: the
// cache is a convenience layer, never a source of failures.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use vigil_core::{OverrideStore, Status};

/// Persists the status-override map as `overrides.json` under the
/// local-state directory.
pub struct FileOverrideStore {
    path: PathBuf,
}

impl FileOverrideStore {
    /// Cache under the platform-conventional state directory.
    pub fn new() -> Self {
        Self::at(crate::state_dir().join("overrides.json"))
    }

    /// Cache at an explicit path (tests, portable setups).
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Default for FileOverrideStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OverrideStore for FileOverrideStore {
    fn load(&self) -> HashMap<String, Status> {
        let Ok(bytes) = std::fs::read(&self.path) else {
            return HashMap::new();
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "ignoring corrupt override cache");
                HashMap::new()
            }
        }
    }

    fn save(&self, map: &HashMap<String, Status>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash mid-write cannot truncate the cache.
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(map)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)
    }
}
