//! Bounded per-conversation memory.

pub mod redis;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{ConversationKey, Res, Turn, Void};

// Traits.

/// Generic conversation-memory trait that storage backends must implement.
///
/// Memory is a bounded, ordered list of turns per conversation key. The
/// bound applies to individual messages, not exchanges: every append trims
/// independently, so a user/assistant pair counts as two slots.
#[async_trait]
pub trait GenericMemoryStore: Send + Sync + 'static {
    /// Append a turn to the tail of the conversation, then trim the list to
    /// the configured window.
    async fn append(&self, key: &ConversationKey, turn: &Turn) -> Void;

    /// Read the full bounded list, oldest first.
    async fn read(&self, key: &ConversationKey) -> Res<Vec<Turn>>;

    /// Remove every turn whose `thread_id` equals the given thread
    /// timestamp, preserving the relative order of the survivors. Returns
    /// the number of removed turns.
    async fn remove_thread(&self, key: &ConversationKey, thread_ts: &str) -> Res<usize>;
}

// Structs.

/// Conversation-memory handle for the application.
///
/// This is trivially cloneable and can be passed around without the need for
/// `Arc` or `Mutex`.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<dyn GenericMemoryStore>,
}

impl Deref for MemoryStore {
    type Target = dyn GenericMemoryStore;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl MemoryStore {
    /// Creates a handle over any memory-store implementation.
    pub fn new(inner: Arc<dyn GenericMemoryStore>) -> Self {
        Self { inner }
    }
}

// Helpers.

/// LTRIM-style range that keeps only the most recent `max_turns` elements:
/// start counts back from the tail, stop pins the tail itself.
pub fn window_bounds(max_turns: usize) -> (isize, isize) {
    (-(max_turns as isize), -1)
}

/// Drop every turn belonging to `thread_ts`, keyed by the stored per-turn
/// `thread_id` field rather than serialized-value equality, so two turns
/// with identical content are still distinguishable.
pub fn drop_thread_turns(turns: Vec<Turn>, thread_ts: &str) -> Vec<Turn> {
    turns.into_iter().filter(|turn| turn.thread_id.as_deref() != Some(thread_ts)).collect()
}
