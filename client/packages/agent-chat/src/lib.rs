//! Client-side core for chatting with long-running agent sessions.
//!
//! A single multiplexed stream of backend events is reconciled into
//! per-session timelines: assistant deltas fold into the open message, tool
//! calls are attributed to the subagent that issued them, and sessions keep
//! streaming while the user looks elsewhere.

pub mod attribution;
pub mod background;
pub mod cache;
pub mod cli;
pub mod client;
pub mod compaction;
pub mod config;
pub mod plan;
pub mod reconciler;
pub mod session;
pub mod sink;
pub mod store;
pub mod timeline;

pub use agent_chat_error::{BackendErrorKind, ClientError};
pub use agent_chat_stream_schema::{OutboundRequest, PermissionMode, SessionMode, StreamEvent};
pub use client::{ChatClient, ClientCommand, ClientInput};
pub use config::ClientConfig;
pub use reconciler::{Activation, Reconciler, Signal, ToastLevel, VisibleSnapshot};
pub use sink::{ChannelSink, RequestSink};
pub use store::{InMemorySessionStore, PersistedMessage, SessionStore, StoredSession};
pub use timeline::{ContentUnit, Message, Role, ToolInvocation};
