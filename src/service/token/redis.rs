//! Redis-hash tenant credential store.

use std::sync::Arc;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::instrument;

use crate::base::types::{Res, Void};

use super::{GenericTokenStore, TokenStore};

/// Hash holding team ID → bot token, written by the install endpoint.
const TOKENS_KEY: &str = "slack_tokens";

// Extra methods on `TokenStore` applied by the redis implementation.

impl TokenStore {
    /// Creates a new Redis-backed credential store.
    pub fn redis(conn: ConnectionManager) -> Self {
        Self::new(Arc::new(RedisTokenStore { conn }))
    }
}

// Structs.

/// Redis-hash token-store implementation.
#[derive(Clone)]
pub struct RedisTokenStore {
    conn: ConnectionManager,
}

#[async_trait]
impl GenericTokenStore for RedisTokenStore {
    #[instrument(skip(self, token))]
    async fn put(&self, team: &str, token: &str) -> Void {
        let mut conn = self.conn.clone();
        let _: u64 = conn.hset(TOKENS_KEY, team, token).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, team: &str) -> Res<Option<String>> {
        let mut conn = self.conn.clone();
        let token: Option<String> = conn.hget(TOKENS_KEY, team).await?;
        Ok(token)
    }
}
