//! Redis Streams event-log implementation.
//!
//! Entries live in a single stream under one field, `payload`, holding the
//! JSON-encoded [`QueuePayload`](crate::base::types::QueuePayload). Consumer
//! groups (XREADGROUP) provide competing-consumer fan-out; XACK followed by
//! XDEL retires an entry; XPENDING + XCLAIM recovers entries left behind by
//! crashed consumers. Unrecoverable entries go to a second stream that no
//! automated consumer reads — it is an audit/replay log.

use std::sync::Arc;

use async_trait::async_trait;
use redis::{
    AsyncCommands,
    aio::ConnectionManager,
    streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply},
};
use tracing::{info, instrument, warn};

use crate::base::{
    config::Config,
    types::{QueuePayload, Res, Void},
};

use super::{EventLog, FetchedEntry, GenericEventLog};

// Extra methods on `EventLog` applied by the redis implementation.

impl EventLog {
    /// Creates a new Redis Streams event log over two explicitly owned
    /// connection handles: one for short commands, one reserved for the
    /// blocking fetch.
    pub fn redis(config: &Config, conn: ConnectionManager, fetch_conn: ConnectionManager) -> Self {
        Self::new(Arc::new(RedisEventLog::new(config, conn, fetch_conn)))
    }
}

// Helpers.

/// Whether a Redis error is the benign "consumer group already exists" reply.
pub(crate) fn is_busygroup(err: &redis::RedisError) -> bool {
    err.code() == Some("BUSYGROUP") || err.to_string().contains("BUSYGROUP")
}

// Structs.

/// Redis Streams event-log implementation.
#[derive(Clone)]
pub struct RedisEventLog {
    conn: ConnectionManager,
    // XREADGROUP with BLOCK holds its connection for the full wait, so the
    // fetch gets a dedicated handle and never stalls the other commands.
    fetch_conn: ConnectionManager,
    stream: String,
    dlq_stream: String,
    group: String,
    consumer: String,
}

impl RedisEventLog {
    /// Creates the implementation from the stream, group, and consumer names
    /// in `config`.
    pub fn new(config: &Config, conn: ConnectionManager, fetch_conn: ConnectionManager) -> Self {
        Self {
            conn,
            fetch_conn,
            stream: config.stream.clone(),
            dlq_stream: config.dlq_stream.clone(),
            group: config.consumer_group.clone(),
            consumer: config.worker_name.clone(),
        }
    }

    fn entries_from_ids(&self, ids: Vec<StreamId>) -> Vec<FetchedEntry> {
        ids.into_iter()
            .filter_map(|entry| {
                let payload: Option<String> = entry.get("payload");
                match payload {
                    Some(payload) => Some(FetchedEntry { id: entry.id, payload }),
                    None => {
                        warn!("Stream entry {} has no payload field; skipping.", entry.id);
                        None
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl GenericEventLog for RedisEventLog {
    #[instrument(skip(self))]
    async fn ensure_group(&self) -> Void {
        let mut conn = self.conn.clone();

        // XGROUP CREATE with MKSTREAM creates the stream if it doesn't exist;
        // "0" starts the group at the beginning of the log.
        let created: redis::RedisResult<String> = conn.xgroup_create_mkstream(&self.stream, &self.group, "0").await;

        match created {
            Ok(_) => {
                info!("Consumer group '{}' created on stream '{}'.", self.group, self.stream);
                Ok(())
            }
            Err(e) if is_busygroup(&e) => {
                info!("Consumer group '{}' already exists.", self.group);
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!("Failed to create consumer group: {}", e)),
        }
    }

    #[instrument(skip_all)]
    async fn append(&self, payload: &QueuePayload) -> Res<String> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(payload)?;

        let id: String = conn.xadd(&self.stream, "*", &[("payload", json.as_str())]).await?;

        info!("Event pushed to stream: {}", payload.unique_id);

        Ok(id)
    }

    #[instrument(skip(self))]
    async fn fetch(&self, count: usize, block_ms: u64) -> Res<Vec<FetchedEntry>> {
        let mut conn = self.fetch_conn.clone();

        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(count)
            .block(block_ms as usize);

        let reply: StreamReadReply = conn.xread_options(&[&self.stream], &[">"], &options).await?;

        let entries = reply
            .keys
            .into_iter()
            .find(|key| key.key == self.stream)
            .map(|key| self.entries_from_ids(key.ids))
            .unwrap_or_default();

        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn claim_stale(&self, min_idle_ms: u64, count: usize) -> Res<Vec<FetchedEntry>> {
        let mut conn = self.conn.clone();

        // XPENDING lists outstanding entries across all consumers in the
        // group; XCLAIM then transfers the ones idle past the threshold to
        // this consumer (the idle filter is applied server-side).
        let pending: StreamPendingCountReply = conn.xpending_count(&self.stream, &self.group, "-", "+", count).await?;

        let stale_ids: Vec<String> = pending
            .ids
            .into_iter()
            .filter(|p| p.last_delivered_ms as u64 >= min_idle_ms)
            .map(|p| p.id)
            .collect();

        if stale_ids.is_empty() {
            return Ok(vec![]);
        }

        let claimed: StreamClaimReply = conn.xclaim(&self.stream, &self.group, &self.consumer, min_idle_ms as usize, &stale_ids).await?;

        let entries = self.entries_from_ids(claimed.ids);

        if !entries.is_empty() {
            warn!("Reclaimed {} stale pending entries.", entries.len());
        }

        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn ack_delete(&self, id: &str) -> Void {
        let mut conn = self.conn.clone();

        let _: u64 = conn.xack(&self.stream, &self.group, &[id]).await?;
        let _: u64 = conn.xdel(&self.stream, &[id]).await?;

        Ok(())
    }

    #[instrument(skip(self, payload))]
    async fn dead_letter(&self, original_id: &str, payload: &str, reason: Option<String>) -> Void {
        let mut conn = self.conn.clone();

        let mut fields: Vec<(&str, &str)> = vec![("original_id", original_id), ("payload", payload)];
        if let Some(reason) = reason.as_deref() {
            fields.push(("reason", reason));
        }

        let _: String = conn.xadd(&self.dlq_stream, "*", &fields).await?;

        warn!("Entry {} moved to dead-letter stream ({}).", original_id, reason.as_deref().unwrap_or("no reason"));

        Ok(())
    }
}
