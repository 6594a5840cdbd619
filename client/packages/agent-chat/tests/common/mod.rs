#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use agent_chat::{ClientConfig, ContentUnit, Message, OutboundRequest, Reconciler, RequestSink, Signal};
use serde_json::{json, Value};

pub const NOW_MS: i64 = 1_700_000_000_000;

pub fn fixed_clock() -> i64 {
    NOW_MS
}

/// Keeps every outbound request for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    requests: Mutex<Vec<OutboundRequest>>,
}

impl RecordingSink {
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().expect("sink lock").clone()
    }
}

impl RequestSink for RecordingSink {
    fn send(&self, request: OutboundRequest) {
        self.requests.lock().expect("sink lock").push(request);
    }
}

pub struct Harness {
    pub reconciler: Reconciler,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let sink = Arc::new(RecordingSink::default());
        let reconciler = Reconciler::with_clock(config, sink.clone(), fixed_clock);
        Self { reconciler, sink }
    }

    /// A harness with `session_id` already on screen.
    pub fn visible(session_id: &str) -> Self {
        let mut harness = Self::new();
        harness.reconciler.activate_session(session_id);
        harness
    }

    pub fn apply(&mut self, raw: Value) -> Vec<Signal> {
        self.reconciler.apply(&raw)
    }

    pub fn apply_all(&mut self, events: impl IntoIterator<Item = Value>) -> Vec<Signal> {
        events
            .into_iter()
            .flat_map(|raw| self.reconciler.apply(&raw))
            .collect()
    }

    pub fn messages(&self, session_id: &str) -> Vec<Message> {
        self.reconciler.messages(session_id).to_vec()
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.sink.requests()
    }
}

pub fn text(session_id: &str, content: &str) -> Value {
    json!({ "type": "assistant_message", "sessionId": session_id, "content": content })
}

pub fn thinking_start(session_id: &str) -> Value {
    json!({ "type": "thinking_start", "sessionId": session_id })
}

pub fn thinking(session_id: &str, content: &str) -> Value {
    json!({ "type": "thinking_delta", "sessionId": session_id, "content": content })
}

pub fn tool(session_id: &str, tool_id: &str, tool_name: &str) -> Value {
    json!({
        "type": "tool_use",
        "sessionId": session_id,
        "toolId": tool_id,
        "toolName": tool_name,
        "toolInput": { "description": format!("{tool_name} {tool_id}") }
    })
}

pub fn result(session_id: &str) -> Value {
    json!({ "type": "result", "sessionId": session_id })
}

pub fn error(session_id: &str, error_type: Option<&str>, message: &str) -> Value {
    match error_type {
        Some(error_type) => json!({
            "type": "error",
            "sessionId": session_id,
            "errorType": error_type,
            "message": message
        }),
        None => json!({ "type": "error", "sessionId": session_id, "message": message }),
    }
}

pub fn context_usage(session_id: &str, input_tokens: u64, context_window: u64) -> Value {
    json!({
        "type": "context_usage",
        "sessionId": session_id,
        "inputTokens": input_tokens,
        "outputTokens": 0,
        "contextWindow": context_window
    })
}

pub fn process_started(session_id: &str, bash_id: &str, command: &str) -> Value {
    json!({
        "type": "background_process_started",
        "sessionId": session_id,
        "bashId": bash_id,
        "command": command,
        "startTime": "2024-01-01T00:00:00Z"
    })
}

pub fn command_started(session_id: &str, bash_id: &str, command: &str) -> Value {
    json!({
        "type": "long_running_command_started",
        "sessionId": session_id,
        "bashId": bash_id,
        "command": command,
        "commandType": "build"
    })
}

pub fn command_chunk(session_id: &str, bash_id: &str, output: &str) -> Value {
    json!({
        "type": "command_output_chunk",
        "sessionId": session_id,
        "bashId": bash_id,
        "output": output
    })
}

/// Top-level units of the last message, for shape assertions.
pub fn last_units(messages: &[Message]) -> Vec<ContentUnit> {
    messages
        .last()
        .map(|message| message.units.clone())
        .unwrap_or_default()
}

/// `(id, nested ids)` for each top-level tool invocation of a message.
pub fn invocation_tree(message: &Message) -> Vec<(String, Vec<String>)> {
    message
        .units
        .iter()
        .filter_map(ContentUnit::as_tool_invocation)
        .map(|invocation| {
            (
                invocation.id.clone(),
                invocation
                    .nested
                    .iter()
                    .map(|child| child.id.clone())
                    .collect(),
            )
        })
        .collect()
}
