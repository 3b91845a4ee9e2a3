//! The durable event log: the queue between ingress and the worker.

pub mod redis;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{QueuePayload, Res, Void};

// Constants.

/// Dead-letter reason recorded when the completion call exhausts its retries.
pub const REASON_COMPLETION_FAILED: &str = "completion failed";

/// Dead-letter reason recorded when the reply cannot be posted.
pub const REASON_DELIVERY_FAILED: &str = "delivery failed";

/// Dead-letter reason recorded when a payload fails to decode.
pub const REASON_MALFORMED: &str = "malformed payload";

// Types.

/// One entry read from the event log, still pending acknowledgment.
///
/// `id` is the log-assigned stream ID; `payload` is the raw JSON string as
/// appended, decoded later by the worker so that malformed producers can be
/// dead-lettered instead of dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedEntry {
    /// The log-assigned entry ID.
    pub id: String,
    /// The raw payload string, not yet decoded.
    pub payload: String,
}

// Traits.

/// Generic event-log trait that durable queue backends must implement.
///
/// The log is append-only and ID-ordered, with competing-consumer semantics:
/// each entry is delivered to exactly one member of the consumer group until
/// it is acknowledged or reclaimed.
#[async_trait]
pub trait GenericEventLog: Send + Sync + 'static {
    /// Create the consumer group if it does not exist yet.
    ///
    /// Idempotent: an "already exists" condition is swallowed, any other
    /// failure propagates and should abort startup.
    async fn ensure_group(&self) -> Void;

    /// Append a work item to the log, returning the log-assigned entry ID.
    async fn append(&self, payload: &QueuePayload) -> Res<String>;

    /// Block up to `block_ms` for new, not-yet-delivered entries and return
    /// at most `count` of them, claimed for this log handle's consumer.
    async fn fetch(&self, count: usize, block_ms: u64) -> Res<Vec<FetchedEntry>>;

    /// Reclaim entries left pending by other consumers for longer than
    /// `min_idle_ms`, redelivering them to this consumer.
    async fn claim_stale(&self, min_idle_ms: u64, count: usize) -> Res<Vec<FetchedEntry>>;

    /// Permanently retire an entry: acknowledge it for the group and delete
    /// it from the log. Both are required for terminal handling.
    async fn ack_delete(&self, id: &str) -> Void;

    /// Append a self-contained record to the dead-letter log.
    async fn dead_letter(&self, original_id: &str, payload: &str, reason: Option<String>) -> Void;
}

// Structs.

/// Event-log handle for the application.
///
/// This is trivially cloneable and can be passed around without the need for
/// `Arc` or `Mutex`.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<dyn GenericEventLog>,
}

impl Deref for EventLog {
    type Target = dyn GenericEventLog;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl EventLog {
    /// Creates a handle over any event-log implementation.
    pub fn new(inner: Arc<dyn GenericEventLog>) -> Self {
        Self { inner }
    }
}
