use std::path::Path;

use agent_chat_error::ClientError;
use agent_chat_stream_schema::SessionMode;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_PARENT_TOOL: &str = "Task";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Model requested on every chat message.
    pub model: String,
    /// IANA zone name sent with chat messages.
    pub timezone: String,
    /// Mode for sessions created by a first message.
    pub default_mode: SessionMode,
    /// Tool name whose invocations may own nested tool calls.
    pub parent_tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_ref: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            default_mode: SessionMode::default(),
            parent_tool_name: DEFAULT_PARENT_TOOL.to_string(),
            repo_ref: None,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let contents = std::fs::read_to_string(path).map_err(|err| ClientError::InvalidConfig {
            message: format!("{}: {err}", path.display()),
        })?;
        serde_json::from_str(&contents).map_err(|err| ClientError::InvalidConfig {
            message: format!("{}: {err}", path.display()),
        })
    }
}
