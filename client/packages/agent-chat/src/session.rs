use agent_chat_stream_schema::{ContextUsageData, PermissionMode, SessionMode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub mode: SessionMode,
    pub permission_mode: PermissionMode,
    pub is_loading: bool,
    pub live_token_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_usage: Option<ContextUsageSnapshot>,
}

impl Session {
    pub fn new(id: impl Into<String>, mode: SessionMode) -> Self {
        Self {
            id: id.into(),
            mode,
            permission_mode: PermissionMode::default(),
            is_loading: false,
            live_token_count: 0,
            context_usage: None,
        }
    }

    /// Loading and live token state end together on any terminal event.
    pub fn finish_turn(&mut self) {
        self.is_loading = false;
        self.live_token_count = 0;
    }
}

/// Latest context window usage. Replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextUsageSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub context_window: u64,
    pub percentage: f64,
}

impl From<&ContextUsageData> for ContextUsageSnapshot {
    fn from(data: &ContextUsageData) -> Self {
        Self {
            input_tokens: data.input_tokens,
            output_tokens: data.output_tokens,
            context_window: data.context_window,
            percentage: data.percentage(),
        }
    }
}
