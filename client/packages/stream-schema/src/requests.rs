use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::PermissionMode;

/// Requests the client sends to the backend. The reducer never waits on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundRequest {
    Chat(ChatRequest),
    StopGeneration(StopGenerationRequest),
    KillBackgroundProcess(KillBackgroundProcessRequest),
    ApprovePlan(ApprovePlanRequest),
    SetPermissionMode(SetPermissionModeRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    pub content: String,
    pub model: String,
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StopGenerationRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KillBackgroundProcessRequest {
    pub bash_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovePlanRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetPermissionModeRequest {
    pub session_id: String,
    pub mode: PermissionMode,
}
