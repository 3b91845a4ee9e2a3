//! The event-log worker: the orchestrator of the processing pipeline.
//!
//! Each fetched entry runs a small state machine that is terminal on every
//! path: decode, tombstone skip, memory read, gated completion with bounded
//! retries, per-tenant delivery, non-fatal memory persist, acknowledgment.
//! Failures route to the dead-letter log instead of leaving entries in
//! limbo; only startup failures (log or group unreachable) propagate.
//!
//! Entries from one fetch are dispatched as independent tasks gated by a
//! semaphore, so the configured concurrency knob bounds in-flight entries
//! within the process. A periodic sweep reclaims entries left pending by
//! crashed consumers and feeds them through the same path, which upgrades
//! delivery to at-least-once at the cost of a possible duplicate reply.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        prompts,
        types::{ConversationKey, QueuePayload, Role, ThreadMessage, Turn, Void},
    },
    queue::{EventLog, FetchedEntry, REASON_COMPLETION_FAILED, REASON_DELIVERY_FAILED, REASON_MALFORMED},
    service::{chat::ChatClient, llm::LlmClient, memory::MemoryStore, token::TokenStore},
};

// Constants.

/// Total completion attempts per entry (not externally configurable).
pub const RETRY_ATTEMPTS: u32 = 3;

/// Linear backoff base between completion attempts (not externally configurable).
pub const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Entries requested per blocking fetch.
const FETCH_COUNT: usize = 5;

/// Blocking-fetch wait bound.
const FETCH_BLOCK_MS: u64 = 2000;

/// How often the stale-pending sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Pending entries idle past this threshold are reclaimed.
const SWEEP_MIN_IDLE_MS: u64 = 60_000;

/// Entries reclaimed per sweep.
const SWEEP_COUNT: usize = 16;

// Helpers.

/// Backoff before the next completion attempt: `attempt × base`.
pub fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_BASE * attempt
}

/// Assemble the completion input: fixed system preamble, then the stored
/// history oldest-first, then the new user message.
pub fn build_messages(history: &[Turn], user_message: &str) -> Vec<ThreadMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ThreadMessage::new(Role::System, prompts::SYSTEM_PREAMBLE));
    messages.extend(history.iter().map(ThreadMessage::from));
    messages.push(ThreadMessage::new(Role::User, user_message));
    messages
}

// Structs.

/// The queue-draining worker.
///
/// Trivially cloneable; one clone per in-flight entry task. All clones share
/// the same concurrency gate.
#[derive(Clone)]
pub struct Worker {
    config: Config,
    log: EventLog,
    memory: MemoryStore,
    tokens: TokenStore,
    llm: LlmClient,
    chat: ChatClient,
    gate: Arc<Semaphore>,
}

impl Worker {
    /// Creates a worker over the given services, with a concurrency gate
    /// sized from the configuration.
    pub fn new(config: Config, log: EventLog, memory: MemoryStore, tokens: TokenStore, llm: LlmClient, chat: ChatClient) -> Self {
        let gate = Arc::new(Semaphore::new(config.max_concurrency));

        Self {
            config,
            log,
            memory,
            tokens,
            llm,
            chat,
            gate,
        }
    }

    /// Run the polling loop until the surrounding task is cancelled.
    ///
    /// Group setup failures propagate and terminate the process; transient
    /// fetch failures are logged and retried.
    #[instrument(skip_all)]
    pub async fn run(&self) -> Void {
        self.log.ensure_group().await?;

        info!("Worker {} started.", self.config.worker_name);

        let mut last_sweep = Instant::now();

        loop {
            if last_sweep.elapsed() >= SWEEP_INTERVAL {
                last_sweep = Instant::now();
                match self.log.claim_stale(SWEEP_MIN_IDLE_MS, SWEEP_COUNT).await {
                    Ok(reclaimed) => self.process_batch(reclaimed).await,
                    Err(e) => error!("Stale-pending sweep failed: {}", e),
                }
            }

            let entries = match self.log.fetch(FETCH_COUNT, FETCH_BLOCK_MS).await {
                Ok(entries) => entries,
                Err(e) => {
                    error!("Error reading from event log: {}", e);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }
            };

            self.process_batch(entries).await;
        }
    }

    /// Process one fetched batch.
    ///
    /// Concurrent mode spawns one gated task per entry; the sequential
    /// fallback awaits each entry in delivery order for parity testing.
    #[instrument(skip_all)]
    pub async fn process_batch(&self, entries: Vec<FetchedEntry>) {
        if entries.is_empty() {
            return;
        }

        if self.config.sequential_batch {
            for entry in entries {
                self.process_gated(entry).await;
            }
        } else {
            let tasks = entries.into_iter().map(|entry| {
                let worker = self.clone();
                tokio::spawn(async move { worker.process_gated(entry).await })
            });

            futures::future::join_all(tasks).await;
        }
    }

    /// Process one entry under the concurrency gate, dead-lettering on any
    /// unexpected error so the entry still terminates.
    async fn process_gated(&self, entry: FetchedEntry) {
        // The semaphore is never closed, so acquisition cannot fail.
        let Ok(_permit) = self.gate.clone().acquire_owned().await else {
            return;
        };

        info!("Processing entry {}", entry.id);

        if let Err(err) = self.process_entry(&entry).await {
            error!("Error processing entry {}: {}", entry.id, err);
            self.quarantine(&entry.id, &entry.payload, Some(&err.to_string())).await;
        }
    }

    /// The per-entry state machine. Every return is a terminal outcome for
    /// the entry; `Err` is reserved for unexpected faults handled by the
    /// caller's quarantine path.
    #[instrument(skip_all, fields(entry_id = %entry.id))]
    pub async fn process_entry(&self, entry: &FetchedEntry) -> Void {
        // Decode.
        let payload: QueuePayload = match serde_json::from_str(&entry.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Invalid payload for entry {}: {}", entry.id, e);
                self.quarantine(&entry.id, &entry.payload, Some(REASON_MALFORMED)).await;
                return Ok(());
            }
        };

        // Tombstone: acknowledge without processing.
        if payload.added == 0 {
            self.retire(&entry.id).await;
            return Ok(());
        }

        // Context assembly. A memory read failure degrades to an empty
        // history rather than failing the entry.
        let key = ConversationKey::new(&payload.body.team, &payload.body.channel);

        let history = match self.memory.read(&key).await {
            Ok(history) => history,
            Err(e) => {
                error!("Error fetching memory for {}: {}", key, e);
                vec![]
            }
        };

        let messages = build_messages(&history, payload.message_text());

        // Completion, with bounded retries.
        let Some(answer) = self.complete_with_retry(&messages).await else {
            error!("Completion failed for entry {}", entry.id);
            self.quarantine(&entry.id, &entry.payload, Some(REASON_COMPLETION_FAILED)).await;
            return Ok(());
        };

        // Delivery. Not retried; the generated answer is discarded on failure.
        if let Err(e) = self.deliver(&payload, &answer).await {
            error!("Error posting reply for entry {}: {}", entry.id, e);
            self.quarantine(&entry.id, &entry.payload, Some(REASON_DELIVERY_FAILED)).await;
            return Ok(());
        }

        // Memory persist: user turn then assistant turn, each trimmed
        // independently. Failure here is non-fatal.
        let thread_ts = payload.reply_thread_ts().to_string();

        let user_turn = Turn::new(Role::User, payload.message_text(), Some(thread_ts.clone()));
        if let Err(e) = self.memory.append(&key, &user_turn).await {
            error!("Error saving user turn for {}: {}", key, e);
        }

        let assistant_turn = Turn::new(Role::Assistant, answer, Some(thread_ts));
        if let Err(e) = self.memory.append(&key, &assistant_turn).await {
            error!("Error saving assistant turn for {}: {}", key, e);
        }

        self.retire(&entry.id).await;

        Ok(())
    }

    /// Call the completion client up to [`RETRY_ATTEMPTS`] times with linear
    /// backoff. `None` means every attempt failed.
    async fn complete_with_retry(&self, messages: &[ThreadMessage]) -> Option<String> {
        for attempt in 1..=RETRY_ATTEMPTS {
            match self.llm.complete(messages).await {
                Ok(answer) => return Some(answer),
                Err(e) => {
                    warn!("Completion attempt {} failed: {}", attempt, e);
                    if attempt < RETRY_ATTEMPTS {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        None
    }

    /// Resolve the tenant credential and post the threaded reply.
    async fn deliver(&self, payload: &QueuePayload, answer: &str) -> Void {
        let token = self
            .tokens
            .get(&payload.body.team)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No credential stored for team {}", payload.body.team))?;

        self.chat.post_reply(&token, &payload.event.channel, payload.reply_thread_ts(), answer).await
    }

    /// Acknowledge and delete an entry; failures are logged, not propagated,
    /// since there is no better terminal state to move to.
    async fn retire(&self, id: &str) {
        if let Err(e) = self.log.ack_delete(id).await {
            error!("Error acknowledging entry {}: {}", id, e);
        }
    }

    /// Dead-letter an entry and retire it from the main log.
    async fn quarantine(&self, id: &str, payload: &str, reason: Option<&str>) {
        if let Err(e) = self.log.dead_letter(id, payload, reason.map(String::from)).await {
            error!("Error moving entry {} to the dead-letter log: {}", id, e);
        }

        self.retire(id).await;
    }
}
