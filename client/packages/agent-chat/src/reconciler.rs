//! Folds the multiplexed event stream into per-session state.
//!
//! Every event targets one session: the one it is tagged with, or the visible
//! session when untagged. Events for the visible session drive the timeline
//! and raise UI signals. Events for any other session are filtered:
//!
//! * `context_usage` is always recorded.
//! * `error` and `result` always end that session's turn; `result` also evicts
//!   its cached timeline.
//! * A session that was switched away from mid-stream (it has a cache entry)
//!   keeps folding timeline events, written through to the cache, without
//!   signals. Compaction markers are the exception: they only ever land on
//!   the visible timeline.
//! * Everything else is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use agent_chat_error::{BackendErrorKind, ClientError};
use agent_chat_stream_schema::{
    classify, ApprovePlanRequest, ChatRequest, ErrorData, KillBackgroundProcessRequest,
    OutboundRequest, PermissionMode, SetPermissionModeRequest, StopGenerationRequest,
    StreamEvent, ToolUseData,
};
use serde::Serialize;
use serde_json::Value;

use crate::attribution::{Attribution, ToolAttributionResolver};
use crate::background::{BackgroundActivityTracker, BackgroundProcess};
use crate::cache::SessionLifecycleCache;
use crate::compaction::{self, COMPACTION_SENTINEL_ID};
use crate::config::ClientConfig;
use crate::plan::PlanApprovalHandshake;
use crate::session::{ContextUsageSnapshot, Session};
use crate::sink::RequestSink;
use crate::store::{parse_timestamp_ms, PersistedMessage, StoredSession};
use crate::timeline::{
    system_clock, Clock, CommandStatus, ContentUnit, LongRunningCommand, Message, Role,
    SessionTimeline, SessionTimelineStore, ToolInvocation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Info,
    Warning,
    Error,
}

/// UI-facing side effects of one reducer step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    Toast {
        level: ToastLevel,
        message: String,
    },
    PlanApprovalRequested {
        #[serde(rename = "sessionId")]
        session_id: String,
        plan: String,
    },
    PermissionModeChanged {
        #[serde(rename = "sessionId")]
        session_id: String,
        mode: PermissionMode,
    },
    TimelineChanged {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

impl Signal {
    pub(crate) fn toast(level: ToastLevel, message: impl Into<String>) -> Self {
        Self::Toast {
            level,
            message: message.into(),
        }
    }

    fn timeline_changed(session_id: &str) -> Self {
        Self::TimelineChanged {
            session_id: session_id.to_string(),
        }
    }
}

/// Everything rendering needs for the visible session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleSnapshot {
    pub session_id: Option<String>,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub live_token_count: u64,
    pub context_usage: Option<ContextUsageSnapshot>,
    pub background_processes: Vec<BackgroundProcess>,
    pub pending_plan: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    AlreadyVisible,
    /// The in-flight timeline came back from the cache.
    Restored,
    /// Nothing cached; history must be fetched from the session store.
    NeedsHistory,
}

pub struct Reconciler {
    config: ClientConfig,
    visible: Option<String>,
    sessions: HashMap<String, Session>,
    timelines: SessionTimelineStore,
    attribution: ToolAttributionResolver,
    background: BackgroundActivityTracker,
    cache: SessionLifecycleCache,
    plan: PlanApprovalHandshake,
    /// Session whose history fetch is outstanding.
    awaiting_history: Option<String>,
    sink: Arc<dyn RequestSink>,
}

impl Reconciler {
    pub fn new(config: ClientConfig, sink: Arc<dyn RequestSink>) -> Self {
        Self::with_clock(config, sink, system_clock)
    }

    pub fn with_clock(config: ClientConfig, sink: Arc<dyn RequestSink>, clock: Clock) -> Self {
        let attribution = ToolAttributionResolver::new(config.parent_tool_name.clone());
        Self {
            config,
            visible: None,
            sessions: HashMap::new(),
            timelines: SessionTimelineStore::with_clock(clock),
            attribution,
            background: BackgroundActivityTracker::new(),
            cache: SessionLifecycleCache::new(),
            plan: PlanApprovalHandshake::new(),
            awaiting_history: None,
            sink,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn visible_session_id(&self) -> Option<&str> {
        self.visible.as_deref()
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn messages(&self, session_id: &str) -> &[Message] {
        self.timelines.messages(session_id)
    }

    pub fn background_processes(&self, session_id: &str) -> &[BackgroundProcess] {
        self.background.processes(session_id)
    }

    pub fn is_cached(&self, session_id: &str) -> bool {
        self.cache.contains(session_id)
    }

    pub fn snapshot(&self) -> VisibleSnapshot {
        let Some(session_id) = self.visible.as_deref() else {
            return VisibleSnapshot::default();
        };
        let session = self.sessions.get(session_id);
        VisibleSnapshot {
            session_id: Some(session_id.to_string()),
            messages: self.timelines.messages(session_id).to_vec(),
            is_loading: session.is_some_and(|session| session.is_loading),
            live_token_count: session.map_or(0, |session| session.live_token_count),
            context_usage: session.and_then(|session| session.context_usage.clone()),
            background_processes: self.background.processes(session_id).to_vec(),
            pending_plan: self.plan.pending_plan(session_id).map(str::to_string),
        }
    }

    fn is_visible(&self, session_id: &str) -> bool {
        self.visible.as_deref() == Some(session_id)
    }

    fn session_mut(&mut self, session_id: &str) -> &mut Session {
        let mode = self.config.default_mode;
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id, mode))
    }

    /// Runs after every timeline mutation so hidden sessions stay cached.
    fn after_mutation(&mut self, session_id: &str) {
        if let Some(timeline) = self.timelines.get(session_id) {
            self.cache
                .on_timeline_changed(session_id, self.visible.as_deref(), timeline);
        }
    }

    // Stream events

    /// Classifies and applies one raw stream record. Unknown and malformed
    /// records are no-ops.
    pub fn apply(&mut self, raw: &Value) -> Vec<Signal> {
        match classify(raw).into_event() {
            Some(event) => self.apply_event(event),
            None => Vec::new(),
        }
    }

    pub fn apply_event(&mut self, event: StreamEvent) -> Vec<Signal> {
        let target = event
            .session_id()
            .map(str::to_string)
            .or_else(|| self.visible.clone());
        let Some(session_id) = target else {
            tracing::debug!(kind = event.kind(), "no target session; dropping event");
            return Vec::new();
        };

        if self.is_visible(&session_id) {
            self.apply_visible(&session_id, event)
        } else {
            self.apply_hidden(&session_id, event);
            Vec::new()
        }
    }

    fn apply_visible(&mut self, session_id: &str, event: StreamEvent) -> Vec<Signal> {
        let mut signals = Vec::new();
        match event {
            StreamEvent::Result(_) => {
                self.session_mut(session_id).finish_turn();
                self.timelines.complete(session_id);
                self.cache.on_stream_terminal(session_id);
                signals.push(Signal::timeline_changed(session_id));
            }
            StreamEvent::Error(data) => {
                let (kind, unit) = error_unit(&data);
                tracing::warn!(
                    session_id,
                    error_kind = kind.as_code(),
                    message = %data.message,
                    "backend reported error"
                );
                self.session_mut(session_id).finish_turn();
                self.timelines.append_terminal(session_id, unit);
                self.after_mutation(session_id);
                signals.push(Signal::toast(
                    ToastLevel::Error,
                    format!("{}: {}", kind.title(), data.message),
                ));
                signals.push(Signal::timeline_changed(session_id));
            }
            StreamEvent::TimeoutWarning(data) => {
                signals.push(Signal::toast(ToastLevel::Warning, data.message));
            }
            StreamEvent::RetryAttempt(data) => {
                signals.push(Signal::toast(
                    ToastLevel::Info,
                    format!(
                        "Retrying ({}/{}): {}",
                        data.attempt, data.max_attempts, data.message
                    ),
                ));
            }
            StreamEvent::ExitPlanMode(data) => {
                self.plan.request(session_id, data.plan.clone());
                signals.push(Signal::PlanApprovalRequested {
                    session_id: session_id.to_string(),
                    plan: data.plan,
                });
            }
            StreamEvent::PermissionModeChanged(data) => {
                self.session_mut(session_id).permission_mode = data.mode;
                tracing::info!(session_id, mode = data.mode.as_str(), "permission mode confirmed");
                signals.push(Signal::PermissionModeChanged {
                    session_id: session_id.to_string(),
                    mode: data.mode,
                });
                signals.push(Signal::toast(
                    ToastLevel::Info,
                    format!("Permission mode set to {}", data.mode.as_str()),
                ));
            }
            StreamEvent::CompactStart(data) => {
                if data.trigger == "auto" {
                    signals.push(Signal::toast(
                        ToastLevel::Info,
                        "Context is nearly full; compacting conversation",
                    ));
                }
            }
            StreamEvent::ContextUsage(data) => {
                self.session_mut(session_id).context_usage = Some(ContextUsageSnapshot::from(&data));
            }
            StreamEvent::Keepalive(data) => {
                tracing::trace!(session_id, elapsed_seconds = data.elapsed_seconds, "keepalive");
            }
            event => {
                if self.apply_stream_event(session_id, event) {
                    self.after_mutation(session_id);
                    signals.push(Signal::timeline_changed(session_id));
                }
            }
        }
        signals
    }

    fn apply_hidden(&mut self, session_id: &str, event: StreamEvent) {
        match event {
            StreamEvent::ContextUsage(data) => {
                self.session_mut(session_id).context_usage = Some(ContextUsageSnapshot::from(&data));
            }
            StreamEvent::Result(_) => {
                self.session_mut(session_id).finish_turn();
                self.cache.on_stream_terminal(session_id);
                self.timelines.remove(session_id);
            }
            StreamEvent::Error(data) => {
                self.session_mut(session_id).finish_turn();
                if self.cache.contains(session_id) {
                    let (_, unit) = error_unit(&data);
                    self.timelines.append_terminal(session_id, unit);
                    self.after_mutation(session_id);
                }
            }
            StreamEvent::CompactLoading(_) | StreamEvent::CompactComplete(_) => {
                tracing::debug!(session_id, "dropping compaction marker for hidden session");
            }
            event if self.cache.contains(session_id) => {
                if self.apply_stream_event(session_id, event) {
                    self.after_mutation(session_id);
                }
            }
            event => {
                tracing::debug!(session_id, kind = event.kind(), "dropping event for hidden session");
            }
        }
    }

    /// Applies the events that build the timeline and background state.
    /// Returns whether the timeline changed.
    fn apply_stream_event(&mut self, session_id: &str, event: StreamEvent) -> bool {
        match event {
            StreamEvent::AssistantMessage(data) => {
                self.timelines.append(session_id, ContentUnit::text(data.content))
            }
            StreamEvent::ThinkingStart(_) => self.timelines.start_thinking_block(session_id),
            StreamEvent::ThinkingDelta(data) => {
                self.timelines.append(session_id, ContentUnit::thinking(data.content))
            }
            StreamEvent::ToolUse(data) => self.attribute_tool(session_id, data),
            StreamEvent::TokenUpdate(data) => {
                self.session_mut(session_id).live_token_count = data.output_tokens;
                false
            }
            StreamEvent::BackgroundProcessStarted(data) => {
                let started_at = data
                    .start_time
                    .as_deref()
                    .and_then(|value| parse_timestamp_ms(value).ok())
                    .unwrap_or_else(|| self.timelines.now());
                self.background.start(
                    session_id,
                    BackgroundProcess {
                        bash_id: data.bash_id,
                        command: data.command,
                        description: data.description,
                        started_at,
                    },
                );
                false
            }
            StreamEvent::BackgroundProcessKilled(data)
            | StreamEvent::BackgroundProcessExited(data) => {
                self.background.exit(session_id, &data.bash_id);
                false
            }
            StreamEvent::LongRunningCommandStarted(data) => self.timelines.append(
                session_id,
                ContentUnit::LongRunningCommand(LongRunningCommand {
                    bash_id: data.bash_id,
                    command: data.command,
                    command_type: data.kind,
                    accumulated_output: String::new(),
                    status: CommandStatus::Running,
                    exit_code: None,
                    error: None,
                }),
            ),
            StreamEvent::CommandOutputChunk(data) => {
                self.update_command(session_id, &data.bash_id, |command| {
                    command.accumulated_output.push_str(&data.output);
                })
            }
            StreamEvent::LongRunningCommandCompleted(data) => {
                self.update_command(session_id, &data.bash_id, |command| {
                    command.status = CommandStatus::Completed;
                    command.exit_code = data.exit_code;
                })
            }
            StreamEvent::LongRunningCommandFailed(data) => {
                self.update_command(session_id, &data.bash_id, |command| {
                    command.status = CommandStatus::Failed;
                    command.error = data.error.clone();
                })
            }
            StreamEvent::CompactLoading(_) => {
                self.timelines.remove_message(session_id, COMPACTION_SENTINEL_ID);
                let sentinel = compaction::sentinel_message(self.timelines.now());
                self.timelines.push_marker(session_id, sentinel);
                true
            }
            StreamEvent::CompactComplete(data) => {
                if !self.timelines.remove_message(session_id, COMPACTION_SENTINEL_ID) {
                    tracing::debug!(session_id, "compaction finished without a sentinel");
                }
                let divider = self.timelines.new_message(
                    Role::Assistant,
                    vec![ContentUnit::text(compaction::divider_text(data.pre_tokens))],
                    false,
                );
                self.timelines.push_marker(session_id, divider);
                true
            }
            event => {
                tracing::debug!(session_id, kind = event.kind(), "event has no timeline effect");
                false
            }
        }
    }

    fn attribute_tool(&mut self, session_id: &str, data: ToolUseData) -> bool {
        if self.timelines.is_frozen(session_id) {
            tracing::debug!(session_id, tool_id = %data.tool_id, "timeline frozen; dropping tool use");
            return false;
        }
        let attribution = self.attribution.resolve(
            self.timelines.open_units(session_id),
            &data.tool_id,
            &data.tool_name,
        );
        let invocation = ToolInvocation::new(data.tool_id, data.tool_name, data.tool_input);
        match attribution {
            Attribution::Duplicate => {
                tracing::debug!(session_id, tool_id = %invocation.id, "duplicate tool use");
                false
            }
            Attribution::TopLevel => self
                .timelines
                .append(session_id, ContentUnit::ToolInvocation(invocation)),
            Attribution::Nested { parent_index } => {
                self.timelines
                    .nest_invocation(session_id, parent_index, invocation)
            }
        }
    }

    fn update_command<F>(&mut self, session_id: &str, bash_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut LongRunningCommand),
    {
        let updated = self.timelines.replace_last(
            session_id,
            |unit| matches!(unit, ContentUnit::LongRunningCommand(command) if command.bash_id == bash_id),
            |unit| {
                if let ContentUnit::LongRunningCommand(command) = unit {
                    update(command);
                }
            },
        );
        if !updated {
            tracing::debug!(session_id, bash_id, "no running command with this id");
        }
        updated
    }

    // Session lifecycle

    /// Adds or refreshes a session known to the session store.
    pub fn register_session(&mut self, stored: &StoredSession) {
        let session = self.session_mut(&stored.id);
        session.mode = stored.mode;
        session.permission_mode = stored.permission_mode;
    }

    /// Makes `session_id` the visible session. A session left while still
    /// loading has its timeline captured in the cache; an idle one is
    /// released and reloads from the store next time.
    ///
    /// A cached timeline comes back as it was left, so a turn that ended
    /// while hidden stays frozen.
    pub fn activate_session(&mut self, session_id: &str) -> Activation {
        if self.is_visible(session_id) {
            return Activation::AlreadyVisible;
        }
        self.release_visible();
        self.visible = Some(session_id.to_string());
        self.session_mut(session_id);

        if let Some(timeline) = self.cache.on_session_activated(session_id) {
            tracing::info!(session_id, frozen = timeline.frozen, "activated session from cache");
            self.timelines.replace(session_id, timeline);
            return Activation::Restored;
        }
        tracing::info!(session_id, "activated session");
        self.timelines.replace(session_id, SessionTimeline::default());
        self.awaiting_history = Some(session_id.to_string());
        Activation::NeedsHistory
    }

    /// Leaves the current session without opening another, e.g. for a new
    /// chat.
    pub fn deactivate(&mut self) {
        self.release_visible();
    }

    fn release_visible(&mut self) {
        self.awaiting_history = None;
        let Some(previous) = self.visible.take() else {
            return;
        };
        let loading = self
            .sessions
            .get(&previous)
            .is_some_and(|session| session.is_loading);
        if loading {
            let timeline = self.timelines.get(&previous).cloned().unwrap_or_default();
            self.cache.on_timeline_changed(&previous, None, &timeline);
        } else {
            self.cache.on_stream_terminal(&previous);
            self.timelines.remove(&previous);
        }
    }

    /// Installs persisted history for the visible session. Only the first
    /// reply to the current activation is used; anything else (the user
    /// switched away, the session came from the cache, a duplicate fetch)
    /// is ignored. Anything streamed since activation stays after the
    /// history.
    pub fn hydrate_history(
        &mut self,
        session_id: &str,
        persisted: Vec<PersistedMessage>,
    ) -> Result<bool, ClientError> {
        if self.awaiting_history.as_deref() != Some(session_id) || !self.is_visible(session_id) {
            tracing::debug!(session_id, "ignoring stale history");
            return Ok(false);
        }
        self.awaiting_history = None;
        let mut messages = persisted
            .into_iter()
            .enumerate()
            .map(|(index, message)| message.into_message(format!("{session_id}_history_{index}")))
            .collect::<Result<Vec<_>, _>>()?;

        let live = self.timelines.remove(session_id).unwrap_or_default();
        messages.extend(live.messages);
        self.timelines.replace(
            session_id,
            SessionTimeline {
                messages,
                frozen: live.frozen,
            },
        );
        Ok(true)
    }

    // User actions

    pub fn send_message(&mut self, content: &str) -> Result<String, ClientError> {
        let session_id = self.visible.clone().ok_or(ClientError::NoActiveSession)?;
        self.timelines.push_user_message(&session_id, content);
        let session = self.session_mut(&session_id);
        session.is_loading = true;
        session.live_token_count = 0;
        self.sink.send(OutboundRequest::Chat(ChatRequest {
            session_id: session_id.clone(),
            content: content.to_string(),
            model: self.config.model.clone(),
            timezone: self.config.timezone.clone(),
        }));
        Ok(session_id)
    }

    /// Clears loading immediately; the backend's confirmation is not awaited.
    pub fn stop_generation(&mut self) -> Result<(), ClientError> {
        let session_id = self.visible.clone().ok_or(ClientError::NoActiveSession)?;
        self.session_mut(&session_id).is_loading = false;
        self.sink
            .send(OutboundRequest::StopGeneration(StopGenerationRequest { session_id }));
        Ok(())
    }

    /// Removes the process locally before the backend confirms. Returns
    /// whether a local entry existed.
    pub fn kill_background_process(&mut self, bash_id: &str) -> bool {
        let removed = self.background.kill(bash_id);
        if let Some((session_id, _)) = &removed {
            tracing::info!(session_id = %session_id, bash_id, "killing background process");
        }
        self.sink
            .send(OutboundRequest::KillBackgroundProcess(KillBackgroundProcessRequest {
                bash_id: bash_id.to_string(),
            }));
        removed.is_some()
    }

    pub fn approve_plan(&mut self) -> bool {
        let Some(session_id) = self.plan.approve() else {
            return false;
        };
        self.sink
            .send(OutboundRequest::ApprovePlan(ApprovePlanRequest { session_id }));
        true
    }

    /// Drops the pending plan and stops waiting on the turn. The backend is
    /// not told about any mode change.
    pub fn reject_plan(&mut self) -> bool {
        let Some(session_id) = self.plan.reject() else {
            return false;
        };
        self.session_mut(&session_id).is_loading = false;
        true
    }

    /// Asks the backend for a new permission mode. Local state follows the
    /// backend's `permission_mode_changed` confirmation.
    pub fn request_permission_mode(&mut self, mode: PermissionMode) -> Result<(), ClientError> {
        let session_id = self.visible.clone().ok_or(ClientError::NoActiveSession)?;
        self.sink
            .send(OutboundRequest::SetPermissionMode(SetPermissionModeRequest {
                session_id,
                mode,
            }));
        Ok(())
    }
}

fn error_unit(data: &ErrorData) -> (BackendErrorKind, ContentUnit) {
    let kind = BackendErrorKind::classify(data.error_type.as_deref(), &data.message);
    (
        kind,
        ContentUnit::Error {
            error_kind: kind,
            message: data.message.clone(),
        },
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct NullSink;

    impl RequestSink for NullSink {
        fn send(&self, _request: OutboundRequest) {}
    }

    fn reconciler() -> Reconciler {
        Reconciler::with_clock(ClientConfig::default(), Arc::new(NullSink), || 0)
    }

    #[test]
    fn idle_switch_drops_stale_cache_entry() {
        let mut reconciler = reconciler();
        reconciler.activate_session("x");
        reconciler.send_message("q").expect("send");
        reconciler.activate_session("y");
        assert_eq!(reconciler.activate_session("x"), Activation::Restored);

        // An error ends the turn without evicting.
        reconciler.apply(&json!({ "type": "error", "sessionId": "x", "message": "boom" }));
        assert!(reconciler.cache.contains("x"));

        reconciler.activate_session("y");
        assert!(!reconciler.cache.contains("x"));
        assert!(!reconciler.timelines.contains("x"));
    }

    #[test]
    fn error_kind_prefers_explicit_type() {
        let (kind, unit) = error_unit(&ErrorData {
            session_id: "x".to_string(),
            error_type: Some("authentication_error".to_string()),
            message: "request timed out".to_string(),
        });
        assert_eq!(kind, BackendErrorKind::Authentication);
        assert!(matches!(
            unit,
            ContentUnit::Error { error_kind: BackendErrorKind::Authentication, .. }
        ));
    }
}
