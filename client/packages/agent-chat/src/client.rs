use std::sync::Arc;

use agent_chat_error::ClientError;
use agent_chat_stream_schema::PermissionMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::ClientConfig;
use crate::reconciler::{Activation, Reconciler, Signal, ToastLevel, VisibleSnapshot};
use crate::sink::RequestSink;
use crate::store::{PersistedMessage, SessionStore, StoredSession};

const SIGNAL_CAPACITY: usize = 256;

/// User actions accepted by [`ChatClient::execute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    ActivateSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Deactivate,
    SendMessage {
        content: String,
    },
    StopGeneration,
    KillBackgroundProcess {
        #[serde(rename = "bashId")]
        bash_id: String,
    },
    ApprovePlan,
    RejectPlan,
    SetPermissionMode {
        mode: PermissionMode,
    },
}

#[derive(Debug)]
pub enum ClientInput {
    Event(Value),
    Command(ClientCommand),
    /// Reply to a history fetch started by an activation.
    History {
        session_id: String,
        messages: Result<Vec<PersistedMessage>, ClientError>,
    },
}

/// Owns the reconciler and the session store, and publishes UI state.
///
/// Signals go out on a broadcast channel. The visible session's snapshot is
/// republished on a watch channel after every event and command. History
/// fetches run as background tasks and re-enter [`ChatClient::run`] as
/// [`ClientInput::History`].
pub struct ChatClient {
    reconciler: Reconciler,
    store: Arc<dyn SessionStore>,
    signals: broadcast::Sender<Signal>,
    snapshots: watch::Sender<VisibleSnapshot>,
    fetches: JoinSet<ClientInput>,
}

impl ChatClient {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn RequestSink>,
    ) -> Self {
        Self::with_reconciler(Reconciler::new(config, sink), store)
    }

    pub fn with_reconciler(reconciler: Reconciler, store: Arc<dyn SessionStore>) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (snapshots, _) = watch::channel(reconciler.snapshot());
        Self {
            reconciler,
            store,
            signals,
            snapshots,
            fetches: JoinSet::new(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn subscribe_signals(&self) -> BroadcastStream<Signal> {
        BroadcastStream::new(self.signals.subscribe())
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<VisibleSnapshot> {
        self.snapshots.subscribe()
    }

    fn publish(&self, signals: &[Signal]) {
        for signal in signals {
            // No subscribers is fine.
            let _ = self.signals.send(signal.clone());
        }
        self.snapshots.send_replace(self.reconciler.snapshot());
    }

    /// Registers every stored session with the reconciler.
    pub async fn load_sessions(&mut self) -> Result<Vec<StoredSession>, ClientError> {
        let sessions = self.store.list_sessions().await?;
        for session in &sessions {
            self.reconciler.register_session(session);
        }
        tracing::debug!(count = sessions.len(), "loaded sessions");
        Ok(sessions)
    }

    pub async fn handle_event(&mut self, raw: &Value) -> Vec<Signal> {
        let signals = self.reconciler.apply(raw);
        for signal in &signals {
            if let Signal::PermissionModeChanged { session_id, mode } = signal {
                if let Err(err) = self.store.update_permission_mode(session_id, *mode).await {
                    tracing::warn!(session_id = %session_id, error = %err, "failed to persist permission mode");
                }
            }
        }
        self.publish(&signals);
        signals
    }

    /// Switches the visible session. On a cache miss the history fetch is
    /// spawned and its reply handled by [`ChatClient::run`]; the reconciler
    /// drops it if the user has moved on by then. Must be called from
    /// within a Tokio runtime.
    pub fn activate_session(&mut self, session_id: &str) -> Activation {
        let activation = self.reconciler.activate_session(session_id);
        if activation == Activation::NeedsHistory {
            let store = self.store.clone();
            let session_id = session_id.to_string();
            self.fetches.spawn(async move {
                let messages = store.get_session_messages(&session_id).await;
                ClientInput::History {
                    session_id,
                    messages,
                }
            });
        }
        self.publish(&[]);
        activation
    }

    /// Applies a history reply. Returns whether it was installed.
    pub fn apply_history(
        &mut self,
        session_id: &str,
        messages: Result<Vec<PersistedMessage>, ClientError>,
    ) -> Result<bool, ClientError> {
        let hydrated = self.reconciler.hydrate_history(session_id, messages?)?;
        if hydrated {
            tracing::debug!(session_id, "hydrated session history");
            self.publish(&[]);
        }
        Ok(hydrated)
    }

    pub fn deactivate(&mut self) {
        self.reconciler.deactivate();
        self.publish(&[]);
    }

    /// Sends a chat message, creating and activating a session first when
    /// none is visible.
    pub async fn send_message(&mut self, content: &str) -> Result<String, ClientError> {
        if self.reconciler.visible_session_id().is_none() {
            let config = self.reconciler.config();
            let stored = self
                .store
                .create_session(config.default_mode, config.repo_ref.as_deref())
                .await?;
            tracing::info!(session_id = %stored.id, mode = stored.mode.as_str(), "created session");
            self.reconciler.register_session(&stored);
            self.reconciler.activate_session(&stored.id);
        }
        let session_id = self.reconciler.send_message(content)?;
        self.publish(&[]);
        Ok(session_id)
    }

    pub async fn execute(&mut self, command: ClientCommand) -> Result<(), ClientError> {
        match command {
            ClientCommand::ActivateSession { session_id } => {
                self.activate_session(&session_id);
            }
            ClientCommand::Deactivate => self.deactivate(),
            ClientCommand::SendMessage { content } => {
                self.send_message(&content).await?;
            }
            ClientCommand::StopGeneration => {
                self.reconciler.stop_generation()?;
                self.publish(&[]);
            }
            ClientCommand::KillBackgroundProcess { bash_id } => {
                self.reconciler.kill_background_process(&bash_id);
                self.publish(&[]);
            }
            ClientCommand::ApprovePlan => {
                self.reconciler.approve_plan();
                self.publish(&[]);
            }
            ClientCommand::RejectPlan => {
                self.reconciler.reject_plan();
                self.publish(&[]);
            }
            ClientCommand::SetPermissionMode { mode } => {
                self.reconciler.request_permission_mode(mode)?;
            }
        }
        Ok(())
    }

    pub async fn dispatch(&mut self, input: ClientInput) {
        let result = match input {
            ClientInput::Event(raw) => {
                self.handle_event(&raw).await;
                Ok(())
            }
            ClientInput::Command(command) => self.execute(command).await,
            ClientInput::History {
                session_id,
                messages,
            } => self.apply_history(&session_id, messages).map(|_| ()),
        };
        if let Err(err) = result {
            let report = err.to_report();
            tracing::warn!(error = %err, error_type = %report.type_, "input failed");
            self.publish(&[Signal::toast(
                ToastLevel::Error,
                format!("{}: {}", report.title, report.message),
            )]);
        }
    }

    /// Drives the client until the input channel closes and every
    /// outstanding history fetch has been handled, then hands it back.
    pub async fn run(mut self, mut inputs: mpsc::Receiver<ClientInput>) -> Self {
        let mut inputs_open = true;
        loop {
            let input = tokio::select! {
                input = inputs.recv(), if inputs_open => match input {
                    Some(input) => input,
                    None => {
                        tracing::debug!("input channel closed");
                        inputs_open = false;
                        continue;
                    }
                },
                Some(joined) = self.fetches.join_next() => match joined {
                    Ok(input) => input,
                    Err(err) => {
                        tracing::warn!(error = %err, "history fetch task failed");
                        continue;
                    }
                },
                else => break,
            };
            self.dispatch(input).await;
        }
        self
    }
}
