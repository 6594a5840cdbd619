//! Durable session storage, consumed as a collaborator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use agent_chat_error::ClientError;
use agent_chat_stream_schema::{PermissionMode, SessionMode};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::timeline::{ContentUnit, Message, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub id: String,
    pub mode: SessionMode,
    pub permission_mode: PermissionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_ref: Option<String>,
    /// RFC 3339.
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMessage {
    pub role: Role,
    pub content: String,
    /// RFC 3339.
    pub timestamp: String,
}

impl PersistedMessage {
    /// Converts into a closed timeline message with a single text unit.
    pub fn into_message(self, id: String) -> Result<Message, ClientError> {
        let timestamp = parse_timestamp_ms(&self.timestamp)?;
        Ok(Message {
            id,
            role: self.role,
            timestamp,
            units: vec![ContentUnit::text(self.content)],
            open: false,
        })
    }
}

pub fn parse_timestamp_ms(value: &str) -> Result<i64, ClientError> {
    let parsed = OffsetDateTime::parse(value, &Rfc3339).map_err(|_| {
        ClientError::InvalidTimestamp {
            value: value.to_string(),
        }
    })?;
    Ok((parsed.unix_timestamp_nanos() / 1_000_000) as i64)
}

/// Usually backed by a remote service, so every call may suspend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<StoredSession>, ClientError>;

    async fn get_session_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<PersistedMessage>, ClientError>;

    async fn create_session(
        &self,
        mode: SessionMode,
        repo_ref: Option<&str>,
    ) -> Result<StoredSession, ClientError>;

    async fn update_permission_mode(
        &self,
        session_id: &str,
        mode: PermissionMode,
    ) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
struct StoreState {
    sessions: Vec<StoredSession>,
    messages: HashMap<String, Vec<PersistedMessage>>,
}

/// Process-local [`SessionStore`].
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    state: Mutex<StoreState>,
    next_id: AtomicU64,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreState>, ClientError> {
        self.state.lock().map_err(|_| ClientError::StoreFailure {
            message: "session store lock poisoned".to_string(),
        })
    }

    /// Seeds history for a session, registering it if unknown.
    pub fn insert_messages(
        &self,
        session: StoredSession,
        messages: Vec<PersistedMessage>,
    ) -> Result<(), ClientError> {
        let mut state = self.lock()?;
        if !state.sessions.iter().any(|existing| existing.id == session.id) {
            state.sessions.push(session.clone());
        }
        state.messages.insert(session.id, messages);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn list_sessions(&self) -> Result<Vec<StoredSession>, ClientError> {
        Ok(self.lock()?.sessions.clone())
    }

    async fn get_session_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<PersistedMessage>, ClientError> {
        let state = self.lock()?;
        if !state.sessions.iter().any(|session| session.id == session_id) {
            return Err(ClientError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        Ok(state.messages.get(session_id).cloned().unwrap_or_default())
    }

    async fn create_session(
        &self,
        mode: SessionMode,
        repo_ref: Option<&str>,
    ) -> Result<StoredSession, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| ClientError::StoreFailure {
                message: err.to_string(),
            })?;
        let session = StoredSession {
            id: format!("session_{id}"),
            mode,
            permission_mode: PermissionMode::default(),
            repo_ref: repo_ref.map(str::to_string),
            created_at,
        };
        self.lock()?.sessions.push(session.clone());
        Ok(session)
    }

    async fn update_permission_mode(
        &self,
        session_id: &str,
        mode: PermissionMode,
    ) -> Result<(), ClientError> {
        let mut state = self.lock()?;
        let session = state
            .sessions
            .iter_mut()
            .find(|session| session.id == session_id)
            .ok_or_else(|| ClientError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        session.permission_mode = mode;
        Ok(())
    }
}
