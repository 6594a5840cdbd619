use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Presentation taxonomy for errors reported by the agent backend.
///
/// The kind only decides how an error is shown to the user. Reducer logic is
/// identical for every kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    Timeout,
    RateLimit,
    Overloaded,
    Authentication,
    Permission,
    InvalidRequest,
    RequestTooLarge,
    Network,
    Unknown,
}

impl BackendErrorKind {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Overloaded => "overloaded",
            Self::Authentication => "authentication",
            Self::Permission => "permission",
            Self::InvalidRequest => "invalid_request",
            Self::RequestTooLarge => "request_too_large",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Timeout => "Request Timed Out",
            Self::RateLimit => "Rate Limited",
            Self::Overloaded => "Service Overloaded",
            Self::Authentication => "Authentication Failed",
            Self::Permission => "Permission Denied",
            Self::InvalidRequest => "Invalid Request",
            Self::RequestTooLarge => "Request Too Large",
            Self::Network => "Network Error",
            Self::Unknown => "Unexpected Error",
        }
    }

    /// Maps a backend `errorType` (when present) or the raw message onto the
    /// taxonomy. An explicit type that is not recognized falls back to the
    /// message heuristics.
    pub fn classify(error_type: Option<&str>, message: &str) -> Self {
        if let Some(kind) = error_type.and_then(Self::from_error_type) {
            return kind;
        }
        Self::from_message(message)
    }

    fn from_error_type(error_type: &str) -> Option<Self> {
        let normalized = error_type.trim().to_ascii_lowercase().replace('-', "_");
        let kind = match normalized.as_str() {
            "timeout" | "timeout_error" | "request_timeout" => Self::Timeout,
            "rate_limit" | "rate_limit_error" | "rate_limited" => Self::RateLimit,
            "overloaded" | "overloaded_error" => Self::Overloaded,
            "authentication" | "authentication_error" | "auth" | "auth_error" => {
                Self::Authentication
            }
            "permission" | "permission_error" | "permission_denied" => Self::Permission,
            "invalid_request" | "invalid_request_error" => Self::InvalidRequest,
            "request_too_large" | "too_large" | "context_length_exceeded" => {
                Self::RequestTooLarge
            }
            "network" | "network_error" | "connection_error" => Self::Network,
            _ => return None,
        };
        Some(kind)
    }

    fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));
        if has(&["timed out", "timeout", "etimedout"]) {
            Self::Timeout
        } else if has(&["429", "rate limit", "rate_limit"]) {
            Self::RateLimit
        } else if has(&["529", "overloaded"]) {
            Self::Overloaded
        } else if has(&["401", "unauthorized", "authentication", "api key"]) {
            Self::Authentication
        } else if has(&["403", "forbidden", "permission"]) {
            Self::Permission
        } else if has(&["413", "too large", "too long", "context length"]) {
            Self::RequestTooLarge
        } else if has(&["400", "invalid request", "invalid_request"]) {
            Self::InvalidRequest
        } else if has(&["econnreset", "econnrefused", "network", "socket hang up", "fetch failed"]) {
            Self::Network
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    SessionNotFound,
    NoActiveSession,
    StoreFailure,
    InvalidConfig,
    InvalidTimestamp,
}

impl ErrorType {
    pub fn as_urn(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "urn:agent-chat:error:session_not_found",
            Self::NoActiveSession => "urn:agent-chat:error:no_active_session",
            Self::StoreFailure => "urn:agent-chat:error:store_failure",
            Self::InvalidConfig => "urn:agent-chat:error:invalid_config",
            Self::InvalidTimestamp => "urn:agent-chat:error:invalid_timestamp",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "Session Not Found",
            Self::NoActiveSession => "No Active Session",
            Self::StoreFailure => "Session Store Failure",
            Self::InvalidConfig => "Invalid Config",
            Self::InvalidTimestamp => "Invalid Timestamp",
        }
    }
}

/// Serializable form of a [`ClientError`], suitable for handing to a UI.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientErrorReport {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },
    #[error("no active session")]
    NoActiveSession,
    #[error("session store failure: {message}")]
    StoreFailure { message: String },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("invalid timestamp: {value}")]
    InvalidTimestamp { value: String },
}

impl ClientError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::SessionNotFound { .. } => ErrorType::SessionNotFound,
            Self::NoActiveSession => ErrorType::NoActiveSession,
            Self::StoreFailure { .. } => ErrorType::StoreFailure,
            Self::InvalidConfig { .. } => ErrorType::InvalidConfig,
            Self::InvalidTimestamp { .. } => ErrorType::InvalidTimestamp,
        }
    }

    pub fn to_report(&self) -> ClientErrorReport {
        let error_type = self.error_type();
        let (session_id, details) = match self {
            Self::SessionNotFound { session_id } => (Some(session_id.clone()), Map::new()),
            Self::NoActiveSession => (None, Map::new()),
            Self::StoreFailure { message } | Self::InvalidConfig { message } => {
                let mut map = Map::new();
                map.insert("message".to_string(), Value::String(message.clone()));
                (None, map)
            }
            Self::InvalidTimestamp { value } => {
                let mut map = Map::new();
                map.insert("value".to_string(), Value::String(value.clone()));
                (None, map)
            }
        };

        ClientErrorReport {
            type_: error_type.as_urn().to_string(),
            title: error_type.title().to_string(),
            message: self.to_string(),
            session_id,
            details,
        }
    }
}

impl From<&ClientError> for ClientErrorReport {
    fn from(value: &ClientError) -> Self {
        value.to_report()
    }
}

impl From<ClientError> for ClientErrorReport {
    fn from(value: ClientError) -> Self {
        value.to_report()
    }
}
