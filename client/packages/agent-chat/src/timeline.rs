//! Per-session message timelines and the delta folding rules.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use agent_chat_error::BackendErrorKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source of message timestamps, in milliseconds since the Unix epoch.
pub type Clock = fn() -> i64;

pub fn system_clock() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub timestamp: i64,
    pub units: Vec<ContentUnit>,
    /// Assistant message still accepting streamed units.
    pub open: bool,
}

impl Message {
    pub fn text(&self) -> String {
        self.units
            .iter()
            .filter_map(|unit| match unit {
                ContentUnit::Text { value } => Some(value.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentUnit {
    Text {
        value: String,
    },
    Thinking {
        value: String,
    },
    ToolInvocation(ToolInvocation),
    LongRunningCommand(LongRunningCommand),
    /// Backend-reported failure that ended the turn.
    Error {
        #[serde(rename = "errorKind")]
        error_kind: BackendErrorKind,
        message: String,
    },
}

impl ContentUnit {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    pub fn thinking(value: impl Into<String>) -> Self {
        Self::Thinking {
            value: value.into(),
        }
    }

    pub fn as_tool_invocation(&self) -> Option<&ToolInvocation> {
        match self {
            Self::ToolInvocation(invocation) => Some(invocation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub input: Value,
    pub nested: Vec<ToolInvocation>,
    /// Cleared once a text unit follows the invocation in its message.
    pub is_open: bool,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            nested: Vec::new(),
            is_open: true,
        }
    }

    fn close(&mut self) {
        self.is_open = false;
        for child in &mut self.nested {
            child.close();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LongRunningCommand {
    pub bash_id: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_type: Option<String>,
    pub accumulated_output: String,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTimeline {
    pub messages: Vec<Message>,
    /// Set by a terminal event. Content appends are refused until the next
    /// user message.
    pub frozen: bool,
}

impl SessionTimeline {
    fn open_assistant_mut(&mut self) -> Option<&mut Message> {
        self.messages
            .last_mut()
            .filter(|message| message.role == Role::Assistant && message.open)
    }

    fn close_open_message(&mut self) {
        if let Some(message) = self.open_assistant_mut() {
            message.open = false;
        }
    }
}

/// In-memory map from session id to its ordered messages.
#[derive(Debug)]
pub struct SessionTimelineStore {
    timelines: HashMap<String, SessionTimeline>,
    next_message_id: u64,
    clock: Clock,
}

impl Default for SessionTimelineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTimelineStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock)
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            timelines: HashMap::new(),
            next_message_id: 1,
            clock,
        }
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.timelines.contains_key(session_id)
    }

    pub fn messages(&self, session_id: &str) -> &[Message] {
        self.timelines
            .get(session_id)
            .map(|timeline| timeline.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_frozen(&self, session_id: &str) -> bool {
        self.timelines
            .get(session_id)
            .is_some_and(|timeline| timeline.frozen)
    }

    /// Units of the assistant message currently receiving stream content.
    pub fn open_units(&self, session_id: &str) -> &[ContentUnit] {
        self.timelines
            .get(session_id)
            .and_then(|timeline| timeline.messages.last())
            .filter(|message| message.role == Role::Assistant && message.open)
            .map(|message| message.units.as_slice())
            .unwrap_or(&[])
    }

    fn timeline_mut(&mut self, session_id: &str) -> &mut SessionTimeline {
        self.timelines.entry(session_id.to_string()).or_default()
    }

    fn next_id(&mut self) -> String {
        let id = self.next_message_id;
        self.next_message_id += 1;
        format!("msg_{id}")
    }

    pub fn new_message(&mut self, role: Role, units: Vec<ContentUnit>, open: bool) -> Message {
        Message {
            id: self.next_id(),
            role,
            timestamp: self.now(),
            units,
            open,
        }
    }

    /// Adds a streamed unit to the session's open assistant message, folding
    /// text and thinking deltas, or starts a new assistant message.
    ///
    /// Returns `false` when the timeline is frozen.
    pub fn append(&mut self, session_id: &str, unit: ContentUnit) -> bool {
        if self.is_frozen(session_id) {
            tracing::debug!(session_id, "timeline frozen; dropping streamed unit");
            return false;
        }
        self.append_unchecked(session_id, unit);
        true
    }

    fn append_unchecked(&mut self, session_id: &str, unit: ContentUnit) {
        let timeline = self.timeline_mut(session_id);
        if let Some(message) = timeline.open_assistant_mut() {
            fold_unit(message, unit);
            return;
        }
        let mut message = self.new_message(Role::Assistant, Vec::new(), true);
        fold_unit(&mut message, unit);
        self.timeline_mut(session_id).messages.push(message);
    }

    /// Starts a reasoning segment. Always a new unit, never folded.
    pub fn start_thinking_block(&mut self, session_id: &str) -> bool {
        if self.is_frozen(session_id) {
            return false;
        }
        let timeline = self.timeline_mut(session_id);
        if let Some(message) = timeline.open_assistant_mut() {
            message.units.push(ContentUnit::thinking(""));
            return true;
        }
        let message = self.new_message(Role::Assistant, vec![ContentUnit::thinking("")], true);
        self.timeline_mut(session_id).messages.push(message);
        true
    }

    /// Appends `invocation` to the nested list of the top-level unit at
    /// `parent_index` in the open assistant message. Returns `false` if the
    /// parent is missing or already holds an invocation with the same id.
    pub fn nest_invocation(
        &mut self,
        session_id: &str,
        parent_index: usize,
        invocation: ToolInvocation,
    ) -> bool {
        let Some(timeline) = self.timelines.get_mut(session_id) else {
            return false;
        };
        if timeline.frozen {
            return false;
        }
        let Some(message) = timeline.open_assistant_mut() else {
            return false;
        };
        let Some(ContentUnit::ToolInvocation(parent)) = message.units.get_mut(parent_index) else {
            return false;
        };
        if parent.nested.iter().any(|child| child.id == invocation.id) {
            return false;
        }
        parent.nested.push(invocation);
        true
    }

    /// Applies `transform` to the last unit of the last message matching
    /// `predicate`. No-op when nothing matches.
    pub fn replace_last<P, F>(&mut self, session_id: &str, predicate: P, transform: F) -> bool
    where
        P: Fn(&ContentUnit) -> bool,
        F: FnOnce(&mut ContentUnit),
    {
        let Some(unit) = self
            .timelines
            .get_mut(session_id)
            .and_then(|timeline| timeline.messages.last_mut())
            .and_then(|message| message.units.iter_mut().rev().find(|unit| predicate(&**unit)))
        else {
            return false;
        };
        transform(unit);
        true
    }

    /// Appends an immutable user message and reopens the timeline for the
    /// next assistant turn.
    pub fn push_user_message(&mut self, session_id: &str, content: &str) -> &Message {
        let message = self.new_message(Role::User, vec![ContentUnit::text(content)], false);
        let timeline = self.timeline_mut(session_id);
        timeline.close_open_message();
        timeline.frozen = false;
        timeline.messages.push(message);
        &timeline.messages[timeline.messages.len() - 1]
    }

    /// Appends a standalone closed message, such as a compaction marker.
    pub fn push_marker(&mut self, session_id: &str, message: Message) {
        let timeline = self.timeline_mut(session_id);
        timeline.close_open_message();
        timeline.messages.push(message);
    }

    pub fn remove_message(&mut self, session_id: &str, message_id: &str) -> bool {
        let Some(timeline) = self.timelines.get_mut(session_id) else {
            return false;
        };
        let before = timeline.messages.len();
        timeline.messages.retain(|message| message.id != message_id);
        timeline.messages.len() != before
    }

    /// Records a unit that ends the turn, even if the timeline is already
    /// frozen, then freezes it.
    pub fn append_terminal(&mut self, session_id: &str, unit: ContentUnit) {
        self.append_unchecked(session_id, unit);
        self.complete(session_id);
    }

    /// Closes the open assistant message and freezes the timeline.
    pub fn complete(&mut self, session_id: &str) {
        let timeline = self.timeline_mut(session_id);
        timeline.close_open_message();
        timeline.frozen = true;
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionTimeline> {
        self.timelines.get(session_id)
    }

    /// Installs a timeline wholesale, freeze state included.
    pub fn replace(&mut self, session_id: &str, timeline: SessionTimeline) {
        self.timelines.insert(session_id.to_string(), timeline);
    }

    pub fn remove(&mut self, session_id: &str) -> Option<SessionTimeline> {
        self.timelines.remove(session_id)
    }
}

fn fold_unit(message: &mut Message, unit: ContentUnit) {
    let closes_invocations = matches!(unit, ContentUnit::Text { .. });
    let unfolded = match (message.units.last_mut(), unit) {
        (Some(ContentUnit::Text { value }), ContentUnit::Text { value: delta }) => {
            value.push_str(&delta);
            None
        }
        (Some(ContentUnit::Thinking { value }), ContentUnit::Thinking { value: delta }) => {
            value.push_str(&delta);
            None
        }
        (_, unit) => Some(unit),
    };
    if let Some(unit) = unfolded {
        message.units.push(unit);
    }
    if closes_invocations {
        for unit in &mut message.units {
            if let ContentUnit::ToolInvocation(invocation) = unit {
                invocation.close();
            }
        }
    }
}
