//! Background shell processes, tracked per session outside the timeline.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundProcess {
    pub bash_id: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub started_at: i64,
}

/// Lifecycle is `started -> killed | exited`. A kill removes the entry
/// immediately, before the backend confirms it; there is no rollback.
#[derive(Debug, Default)]
pub struct BackgroundActivityTracker {
    processes: HashMap<String, Vec<BackgroundProcess>>,
}

impl BackgroundActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processes(&self, session_id: &str) -> &[BackgroundProcess] {
        self.processes
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Registers a started process. A repeated start for the same bash id
    /// replaces the earlier entry.
    pub fn start(&mut self, session_id: &str, process: BackgroundProcess) {
        let entries = self.processes.entry(session_id.to_string()).or_default();
        match entries
            .iter_mut()
            .find(|existing| existing.bash_id == process.bash_id)
        {
            Some(existing) => *existing = process,
            None => entries.push(process),
        }
    }

    /// Backend-reported exit (or kill confirmation).
    pub fn exit(&mut self, session_id: &str, bash_id: &str) -> Option<BackgroundProcess> {
        let entries = self.processes.get_mut(session_id)?;
        let index = entries.iter().position(|process| process.bash_id == bash_id)?;
        let removed = entries.remove(index);
        if entries.is_empty() {
            self.processes.remove(session_id);
        }
        Some(removed)
    }

    /// User-initiated kill. Only the bash id is known, so every session is
    /// searched.
    pub fn kill(&mut self, bash_id: &str) -> Option<(String, BackgroundProcess)> {
        let session_id = self
            .processes
            .iter()
            .find(|(_, entries)| entries.iter().any(|process| process.bash_id == bash_id))
            .map(|(session_id, _)| session_id.clone())?;
        let removed = self.exit(&session_id, bash_id)?;
        Some((session_id, removed))
    }
}
