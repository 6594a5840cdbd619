use serde_json::Value;

use crate::{StreamEvent, KNOWN_EVENT_KINDS};

/// Outcome of classifying one raw stream record.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// A recognized kind with all required fields present.
    Event(StreamEvent),
    /// A `type` this client does not know. Accepted and ignored.
    Unknown { kind: String },
    /// A recognized kind (or no kind at all) missing required data.
    Malformed { kind: String, reason: String },
}

impl Classification {
    pub fn into_event(self) -> Option<StreamEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Unknown { .. } | Self::Malformed { .. } => None,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Event(event) => event.kind(),
            Self::Unknown { kind } | Self::Malformed { kind, .. } => kind,
        }
    }
}

/// Parses a raw record into a typed [`StreamEvent`].
///
/// Never fails: unknown kinds and malformed records are reported through
/// [`Classification`] and logged at debug level so the caller can treat them
/// as no-ops.
pub fn classify(raw: &Value) -> Classification {
    let Some(kind) = raw.get("type").and_then(Value::as_str) else {
        tracing::debug!("stream record without a type discriminator");
        return Classification::Malformed {
            kind: String::new(),
            reason: "missing field `type`".to_string(),
        };
    };

    if !KNOWN_EVENT_KINDS.contains(&kind) {
        tracing::debug!(kind, "ignoring unrecognized stream event kind");
        return Classification::Unknown {
            kind: kind.to_string(),
        };
    }

    let event = match serde_json::from_value::<StreamEvent>(raw.clone()) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(kind, error = %err, "dropping malformed stream event");
            return Classification::Malformed {
                kind: kind.to_string(),
                reason: err.to_string(),
            };
        }
    };

    if let Err(reason) = event.validate() {
        tracing::debug!(kind, reason = %reason, "dropping malformed stream event");
        return Classification::Malformed {
            kind: kind.to_string(),
            reason,
        };
    }

    Classification::Event(event)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::PermissionMode;

    #[test]
    fn classifies_tool_use() {
        let raw = json!({
            "type": "tool_use",
            "sessionId": "s1",
            "toolId": "toolu_1",
            "toolName": "Bash",
            "toolInput": { "command": "ls" }
        });
        let Classification::Event(StreamEvent::ToolUse(data)) = classify(&raw) else {
            panic!("expected tool_use");
        };
        assert_eq!(data.tool_id, "toolu_1");
        assert_eq!(data.tool_input["command"], "ls");
    }

    #[test]
    fn unknown_kind_is_pass_through() {
        let raw = json!({ "type": "session_title_updated", "title": "x" });
        assert_eq!(
            classify(&raw),
            Classification::Unknown {
                kind: "session_title_updated".to_string()
            }
        );
    }

    #[test]
    fn missing_type_is_malformed() {
        let result = classify(&json!({ "content": "hi" }));
        assert!(matches!(result, Classification::Malformed { ref kind, .. } if kind.is_empty()));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let result = classify(&json!({ "type": "assistant_message", "sessionId": "s1" }));
        assert!(matches!(result, Classification::Malformed { ref kind, .. } if kind == "assistant_message"));
    }

    #[test]
    fn empty_tool_id_is_malformed() {
        let raw = json!({ "type": "tool_use", "toolId": "", "toolName": "Bash" });
        assert!(matches!(classify(&raw), Classification::Malformed { .. }));
    }

    #[test]
    fn empty_session_id_is_treated_as_implicit() {
        let raw = json!({ "type": "assistant_message", "sessionId": "", "content": "a" });
        let event = classify(&raw).into_event().expect("event");
        assert_eq!(event.session_id(), None);
    }

    #[test]
    fn permission_mode_accepts_backend_alias() {
        let raw = json!({ "type": "permission_mode_changed", "mode": "bypassPermissions" });
        let Some(StreamEvent::PermissionModeChanged(data)) = classify(&raw).into_event() else {
            panic!("expected permission_mode_changed");
        };
        assert_eq!(data.mode, PermissionMode::Bypass);
    }

    #[test]
    fn unrecognized_permission_mode_is_malformed() {
        let raw = json!({ "type": "permission_mode_changed", "mode": "yolo" });
        assert!(matches!(classify(&raw), Classification::Malformed { .. }));
    }

    #[test]
    fn context_percentage_is_derived_when_absent() {
        let raw = json!({
            "type": "context_usage",
            "inputTokens": 50_000,
            "contextWindow": 200_000
        });
        let Some(StreamEvent::ContextUsage(data)) = classify(&raw).into_event() else {
            panic!("expected context_usage");
        };
        assert_eq!(data.percentage(), 25.0);
    }
}
