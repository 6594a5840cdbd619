use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod classifier;
pub mod requests;

pub use classifier::{classify, Classification};
pub use requests::{
    ApprovePlanRequest, ChatRequest, KillBackgroundProcessRequest, OutboundRequest,
    SetPermissionModeRequest, StopGenerationRequest,
};

/// Agent mode a session was created with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    #[default]
    General,
    Coder,
    IntenseResearch,
    Spark,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Coder => "coder",
            Self::IntenseResearch => "intense-research",
            Self::Spark => "spark",
        }
    }
}

/// Permission posture of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    #[default]
    Plan,
    #[serde(alias = "bypassPermissions", alias = "bypass_permissions")]
    Bypass,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Bypass => "bypass",
        }
    }
}

/// One inbound record from the multiplexed session stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    AssistantMessage(AssistantMessageData),
    ThinkingStart(ThinkingStartData),
    ThinkingDelta(ThinkingDeltaData),
    ToolUse(ToolUseData),
    TokenUpdate(TokenUpdateData),
    Result(ResultData),
    Error(ErrorData),
    TimeoutWarning(TimeoutWarningData),
    RetryAttempt(RetryAttemptData),
    ExitPlanMode(ExitPlanModeData),
    PermissionModeChanged(PermissionModeChangedData),
    BackgroundProcessStarted(BackgroundProcessStartedData),
    BackgroundProcessKilled(BackgroundProcessEndedData),
    BackgroundProcessExited(BackgroundProcessEndedData),
    LongRunningCommandStarted(LongRunningCommandStartedData),
    CommandOutputChunk(CommandOutputChunkData),
    LongRunningCommandCompleted(LongRunningCommandCompletedData),
    LongRunningCommandFailed(LongRunningCommandFailedData),
    CompactStart(CompactStartData),
    CompactLoading(CompactLoadingData),
    CompactComplete(CompactCompleteData),
    ContextUsage(ContextUsageData),
    Keepalive(KeepaliveData),
}

/// Every `type` discriminator this crate understands.
pub const KNOWN_EVENT_KINDS: &[&str] = &[
    "assistant_message",
    "thinking_start",
    "thinking_delta",
    "tool_use",
    "token_update",
    "result",
    "error",
    "timeout_warning",
    "retry_attempt",
    "exit_plan_mode",
    "permission_mode_changed",
    "background_process_started",
    "background_process_killed",
    "background_process_exited",
    "long_running_command_started",
    "command_output_chunk",
    "long_running_command_completed",
    "long_running_command_failed",
    "compact_start",
    "compact_loading",
    "compact_complete",
    "context_usage",
    "keepalive",
];

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AssistantMessage(_) => "assistant_message",
            Self::ThinkingStart(_) => "thinking_start",
            Self::ThinkingDelta(_) => "thinking_delta",
            Self::ToolUse(_) => "tool_use",
            Self::TokenUpdate(_) => "token_update",
            Self::Result(_) => "result",
            Self::Error(_) => "error",
            Self::TimeoutWarning(_) => "timeout_warning",
            Self::RetryAttempt(_) => "retry_attempt",
            Self::ExitPlanMode(_) => "exit_plan_mode",
            Self::PermissionModeChanged(_) => "permission_mode_changed",
            Self::BackgroundProcessStarted(_) => "background_process_started",
            Self::BackgroundProcessKilled(_) => "background_process_killed",
            Self::BackgroundProcessExited(_) => "background_process_exited",
            Self::LongRunningCommandStarted(_) => "long_running_command_started",
            Self::CommandOutputChunk(_) => "command_output_chunk",
            Self::LongRunningCommandCompleted(_) => "long_running_command_completed",
            Self::LongRunningCommandFailed(_) => "long_running_command_failed",
            Self::CompactStart(_) => "compact_start",
            Self::CompactLoading(_) => "compact_loading",
            Self::CompactComplete(_) => "compact_complete",
            Self::ContextUsage(_) => "context_usage",
            Self::Keepalive(_) => "keepalive",
        }
    }

    /// Session the event is explicitly tagged with. `None` means the event
    /// implicitly targets whichever session is visible.
    pub fn session_id(&self) -> Option<&str> {
        let session_id = match self {
            Self::AssistantMessage(data) => data.session_id.as_deref(),
            Self::ThinkingStart(data) => data.session_id.as_deref(),
            Self::ThinkingDelta(data) => data.session_id.as_deref(),
            Self::ToolUse(data) => data.session_id.as_deref(),
            Self::TokenUpdate(data) => data.session_id.as_deref(),
            Self::Result(data) => Some(data.session_id.as_str()),
            Self::Error(data) => Some(data.session_id.as_str()),
            Self::TimeoutWarning(data) => data.session_id.as_deref(),
            Self::RetryAttempt(data) => data.session_id.as_deref(),
            Self::ExitPlanMode(data) => data.session_id.as_deref(),
            Self::PermissionModeChanged(data) => data.session_id.as_deref(),
            Self::BackgroundProcessStarted(data) => data.session_id.as_deref(),
            Self::BackgroundProcessKilled(data) | Self::BackgroundProcessExited(data) => {
                data.session_id.as_deref()
            }
            Self::LongRunningCommandStarted(data) => data.session_id.as_deref(),
            Self::CommandOutputChunk(data) => data.session_id.as_deref(),
            Self::LongRunningCommandCompleted(data) => data.session_id.as_deref(),
            Self::LongRunningCommandFailed(data) => data.session_id.as_deref(),
            Self::CompactStart(data) => data.session_id.as_deref(),
            Self::CompactLoading(data) => data.session_id.as_deref(),
            Self::CompactComplete(data) => data.session_id.as_deref(),
            Self::ContextUsage(data) => data.session_id.as_deref(),
            Self::Keepalive(_) => None,
        };
        session_id.filter(|id| !id.is_empty())
    }

    /// Checks the fields the reconciler relies on beyond what deserialization
    /// already enforces.
    pub fn validate(&self) -> Result<(), String> {
        fn require(field: &str, value: &str) -> Result<(), String> {
            if value.trim().is_empty() {
                Err(format!("missing field `{field}`"))
            } else {
                Ok(())
            }
        }

        match self {
            Self::ToolUse(data) => {
                require("toolId", &data.tool_id)?;
                require("toolName", &data.tool_name)
            }
            Self::Result(data) => require("sessionId", &data.session_id),
            Self::Error(data) => require("sessionId", &data.session_id),
            Self::BackgroundProcessStarted(data) => require("bashId", &data.bash_id),
            Self::BackgroundProcessKilled(data) | Self::BackgroundProcessExited(data) => {
                require("bashId", &data.bash_id)
            }
            Self::LongRunningCommandStarted(data) => require("bashId", &data.bash_id),
            Self::CommandOutputChunk(data) => require("bashId", &data.bash_id),
            Self::LongRunningCommandCompleted(data) => require("bashId", &data.bash_id),
            Self::LongRunningCommandFailed(data) => require("bashId", &data.bash_id),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingStartData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingDeltaData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub tool_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResultData {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutWarningData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub elapsed_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttemptData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExitPlanModeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub plan: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionModeChangedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub mode: PermissionMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundProcessStartedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub bash_id: String,
    #[serde(default)]
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// RFC 3339 start time reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

/// Payload shared by `background_process_killed` and `background_process_exited`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundProcessEndedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub bash_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LongRunningCommandStartedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub bash_id: String,
    #[serde(default)]
    pub command: String,
    #[serde(default, alias = "commandType", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutputChunkData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub bash_id: String,
    #[serde(alias = "chunk")]
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LongRunningCommandCompletedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub bash_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LongRunningCommandFailedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub bash_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompactStartData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub trigger: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompactLoadingData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompactCompleteData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextUsageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    pub context_window: u64,
    /// Percentage of the context window in use. Derived from the token
    /// counts when the backend omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_percentage: Option<f64>,
}

impl ContextUsageData {
    pub fn percentage(&self) -> f64 {
        match self.context_percentage {
            Some(percentage) => percentage,
            None if self.context_window == 0 => 0.0,
            None => self.input_tokens as f64 / self.context_window as f64 * 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeepaliveData {
    #[serde(default)]
    pub elapsed_seconds: u64,
}
