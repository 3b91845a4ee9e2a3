//! Redis-list conversation memory.
//!
//! One list per conversation key, JSON-encoded [`Turn`] per element. RPUSH
//! followed by LTRIM keeps the window bounded; selective deletion rewrites
//! the list atomically after filtering by the per-turn thread ID.

use std::sync::Arc;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::{instrument, warn};

use crate::base::{
    config::Config,
    types::{ConversationKey, Res, Turn, Void},
};

use super::{GenericMemoryStore, MemoryStore, drop_thread_turns, window_bounds};

// Extra methods on `MemoryStore` applied by the redis implementation.

impl MemoryStore {
    /// Creates a new Redis-backed conversation memory store.
    pub fn redis(config: &Config, conn: ConnectionManager) -> Self {
        Self::new(Arc::new(RedisMemoryStore::new(config, conn)))
    }
}

// Structs.

/// Redis-list memory-store implementation.
#[derive(Clone)]
pub struct RedisMemoryStore {
    conn: ConnectionManager,
    max_turns: usize,
}

impl RedisMemoryStore {
    /// Creates the implementation with the window size from `config`.
    pub fn new(config: &Config, conn: ConnectionManager) -> Self {
        Self {
            conn,
            max_turns: config.max_turns,
        }
    }
}

#[async_trait]
impl GenericMemoryStore for RedisMemoryStore {
    #[instrument(skip(self, turn), fields(key = %key))]
    async fn append(&self, key: &ConversationKey, turn: &Turn) -> Void {
        let mut conn = self.conn.clone();
        let storage_key = key.storage_key();
        let json = serde_json::to_string(turn)?;

        // Push at the tail, then keep only the most recent window.
        let (start, stop) = window_bounds(self.max_turns);
        let _: u64 = conn.rpush(&storage_key, json).await?;
        let _: () = conn.ltrim(&storage_key, start, stop).await?;

        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn read(&self, key: &ConversationKey) -> Res<Vec<Turn>> {
        let mut conn = self.conn.clone();

        let raw: Vec<String> = conn.lrange(key.storage_key(), 0, -1).await?;

        let turns = raw
            .into_iter()
            .filter_map(|s| match serde_json::from_str::<Turn>(&s) {
                Ok(turn) => Some(turn),
                Err(e) => {
                    warn!("Skipping unparseable memory element: {}", e);
                    None
                }
            })
            .collect();

        Ok(turns)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn remove_thread(&self, key: &ConversationKey, thread_ts: &str) -> Res<usize> {
        let mut conn = self.conn.clone();
        let storage_key = key.storage_key();

        let turns = self.read(key).await?;
        let before = turns.len();
        let kept = drop_thread_turns(turns, thread_ts);
        let removed = before - kept.len();

        if removed == 0 {
            return Ok(0);
        }

        // Rewrite the list in one transaction so a concurrent reader never
        // observes a half-filtered state.
        let mut pipe = redis::pipe();
        pipe.atomic().del(&storage_key).ignore();
        for turn in &kept {
            pipe.rpush(&storage_key, serde_json::to_string(turn)?).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(removed)
    }
}
