//! Core types shared across the crate: result aliases, the queue payload
//! wire format, and the conversation-memory data model.

use serde::{Deserialize, Serialize};

/// The common error type for the crate.
pub type Err = anyhow::Error;

/// The common result type for the crate.
pub type Res<T> = Result<T, Err>;

/// The common "no value" result type for the crate.
pub type Void = Res<()>;

/// Payload carried by one event-log entry.
///
/// Produced by the ingress on an app mention and consumed by the worker.
/// `added == 0` marks a tombstone entry that is acknowledged without
/// further processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuePayload {
    /// The platform-event half of the payload.
    pub event: EventInfo,
    /// The request-body half of the payload.
    pub body: BodyInfo,
    /// Producer-assigned identifier, `{user}-{millis}`.
    #[serde(rename = "uniqueId")]
    pub unique_id: String,
    /// `1` for a live entry, `0` for a tombstone.
    pub added: u8,
}

/// The platform-event half of a queue payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventInfo {
    /// The channel the mention arrived in.
    pub channel: String,
    /// The mention's own message timestamp.
    pub ts: String,
    /// The mention text, bot handle already stripped.
    pub text: String,
}

/// The request-body half of a queue payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BodyInfo {
    /// The mentioning user's ID.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// A copy of the mention text.
    pub message: String,
    /// The tenant (workspace) the mention belongs to.
    pub team: String,
    /// A copy of the channel ID.
    pub channel: String,
    /// The enclosing thread timestamp, if the mention was inside a thread.
    pub thread_ts: Option<String>,
}

impl QueuePayload {
    /// The thread timestamp replies should land under: the explicit thread
    /// if there is one, otherwise the mention's own timestamp.
    pub fn reply_thread_ts(&self) -> &str {
        self.body.thread_ts.as_deref().unwrap_or(&self.event.ts)
    }

    /// The user message text, preferring the event text over the body copy.
    pub fn message_text(&self) -> &str {
        if self.event.text.is_empty() { &self.body.message } else { &self.event.text }
    }
}

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human-authored message.
    User,
    /// A model-authored reply.
    Assistant,
    /// The fixed instruction preamble.
    System,
}

/// One stored message within a conversation's bounded memory window.
///
/// `id` is the creation time in epoch milliseconds; `thread_id` is the
/// platform thread timestamp the turn belongs to, kept for selective
/// deletion rather than storage partitioning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    /// Who produced the turn.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// Creation time in epoch milliseconds.
    pub id: i64,
    /// The thread timestamp the turn belongs to, if any.
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
}

impl Turn {
    /// Creates a turn stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>, thread_id: Option<String>) -> Self {
        Self {
            role,
            content: content.into(),
            id: chrono::Utc::now().timestamp_millis(),
            thread_id,
        }
    }
}

/// A role/content pair as sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    /// Who the message is attributed to.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl ThreadMessage {
    /// Creates a message from a role and text.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

impl From<&Turn> for ThreadMessage {
    fn from(turn: &Turn) -> Self {
        Self::new(turn.role, turn.content.clone())
    }
}

/// Composite conversation key: tenant (team) plus channel.
///
/// Thread timestamps do not participate in the key; all threads in a channel
/// share one memory window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationKey {
    /// The tenant (workspace) ID.
    pub team: String,
    /// The channel ID.
    pub channel: String,
}

impl ConversationKey {
    /// Creates a key from a team and channel pair.
    pub fn new(team: impl Into<String>, channel: impl Into<String>) -> Self {
        Self { team: team.into(), channel: channel.into() }
    }

    /// The backing list key for this conversation's memory.
    pub fn storage_key(&self) -> String {
        format!("thread:MEMORY:team-{}:channel-{}:threads", self.team, self.channel)
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.team, self.channel)
    }
}
