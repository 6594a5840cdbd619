//! Write-through cache of in-flight timelines for sessions that are not
//! visible.

use std::collections::HashMap;

use crate::timeline::SessionTimeline;

/// Holds a session's timeline while its stream is still running and it is
/// not on screen. The only eviction path is the session's terminal event; a
/// stream that never terminates keeps its entry for the life of the process.
///
/// Entries carry the freeze flag, so a turn that ended while hidden stays
/// ended when the session comes back.
#[derive(Debug, Default)]
pub struct SessionLifecycleCache {
    entries: HashMap<String, SessionTimeline>,
}

impl SessionLifecycleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.contains_key(session_id)
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Called after every timeline mutation. Writes through whenever the
    /// session is not the visible one.
    pub fn on_timeline_changed(
        &mut self,
        session_id: &str,
        visible_session_id: Option<&str>,
        timeline: &SessionTimeline,
    ) -> bool {
        if visible_session_id == Some(session_id) {
            return false;
        }
        tracing::debug!(
            session_id,
            messages = timeline.messages.len(),
            frozen = timeline.frozen,
            "caching in-flight timeline"
        );
        self.entries
            .insert(session_id.to_string(), timeline.clone());
        true
    }

    /// Cached timeline for a session being brought on screen, if any. A hit
    /// replaces the reload from the session store.
    pub fn on_session_activated(&self, session_id: &str) -> Option<SessionTimeline> {
        self.entries.get(session_id).cloned()
    }

    pub fn on_stream_terminal(&mut self, session_id: &str) -> bool {
        let evicted = self.entries.remove(session_id).is_some();
        if evicted {
            tracing::debug!(session_id, "evicted cached timeline");
        }
        evicted
    }
}
