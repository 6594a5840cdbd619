//! Markers for context auto-compaction.

use crate::timeline::{ContentUnit, Message, Role};

/// Fixed id of the placeholder shown while compaction runs.
pub const COMPACTION_SENTINEL_ID: &str = "compaction-in-progress";

const SENTINEL_TEXT: &str = "Compacting conversation...";

pub fn sentinel_message(timestamp: i64) -> Message {
    Message {
        id: COMPACTION_SENTINEL_ID.to_string(),
        role: Role::Assistant,
        timestamp,
        units: vec![ContentUnit::text(SENTINEL_TEXT)],
        open: false,
    }
}

pub fn divider_text(pre_tokens: Option<u64>) -> String {
    match pre_tokens {
        Some(tokens) => format!("Conversation compacted ({tokens} tokens before compaction)"),
        None => "Conversation compacted".to_string(),
    }
}
