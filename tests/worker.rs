#![cfg(test)]

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use warpi::{
    base::{
        config::{Config, ConfigInner},
        prompts,
        types::{ConversationKey, QueuePayload, Res, Role, ThreadMessage, Turn, Void},
    },
    queue::{EventLog, FetchedEntry, GenericEventLog},
    service::{
        chat::{ChatClient, GenericChatClient, TenantInstall},
        llm::{GenericLlmClient, LlmClient},
        memory::{GenericMemoryStore, MemoryStore},
        token::{GenericTokenStore, TokenStore},
    },
    worker::Worker,
};

// Mocks.

mock! {
    pub Log {}

    #[async_trait]
    impl GenericEventLog for Log {
        async fn ensure_group(&self) -> Void;
        async fn append(&self, payload: &QueuePayload) -> Res<String>;
        async fn fetch(&self, count: usize, block_ms: u64) -> Res<Vec<FetchedEntry>>;
        async fn claim_stale(&self, min_idle_ms: u64, count: usize) -> Res<Vec<FetchedEntry>>;
        async fn ack_delete(&self, id: &str) -> Void;
        async fn dead_letter(&self, original_id: &str, payload: &str, reason: Option<String>) -> Void;
    }
}

mock! {
    pub Memory {}

    #[async_trait]
    impl GenericMemoryStore for Memory {
        async fn append(&self, key: &ConversationKey, turn: &Turn) -> Void;
        async fn read(&self, key: &ConversationKey) -> Res<Vec<Turn>>;
        async fn remove_thread(&self, key: &ConversationKey, thread_ts: &str) -> Res<usize>;
    }
}

mock! {
    pub Tokens {}

    #[async_trait]
    impl GenericTokenStore for Tokens {
        async fn put(&self, team: &str, token: &str) -> Void;
        async fn get(&self, team: &str) -> Res<Option<String>>;
    }
}

mock! {
    pub Llm {}

    #[async_trait]
    impl GenericLlmClient for Llm {
        async fn complete(&self, messages: &[ThreadMessage]) -> Res<String>;
    }
}

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        async fn post_reply(&self, token: &str, channel_id: &str, thread_ts: &str, text: &str) -> Void;
        async fn exchange_oauth_code(&self, code: &str) -> Res<TenantInstall>;
    }
}

// Helpers.

fn test_config() -> Config {
    Config {
        inner: Arc::new(ConfigInner {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            stream: "events:incoming".to_string(),
            dlq_stream: "events:dlq".to_string(),
            consumer_group: "warpi-group".to_string(),
            worker_name: "worker-test".to_string(),
            max_concurrency: 4,
            max_turns: 5,
            openai_api_key: "test_key".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            slack_client_id: "id".to_string(),
            slack_client_secret: "secret".to_string(),
            ..Default::default()
        }),
    }
}

fn worker(log: MockLog, memory: MockMemory, tokens: MockTokens, llm: MockLlm, chat: MockChat) -> Worker {
    Worker::new(
        test_config(),
        EventLog::new(Arc::new(log)),
        MemoryStore::new(Arc::new(memory)),
        TokenStore::new(Arc::new(tokens)),
        LlmClient::new(Arc::new(llm)),
        ChatClient::new(Arc::new(chat)),
    )
}

/// A well-formed payload: a mention of "hello" in channel C1 of team T1.
fn hello_payload_json() -> String {
    serde_json::json!({
        "event": { "channel": "C1", "ts": "100", "text": "hello" },
        "body": { "userId": "U1", "message": "hello", "team": "T1", "channel": "C1", "thread_ts": null },
        "uniqueId": "U1-100",
        "added": 1,
    })
    .to_string()
}

fn entry(id: &str, payload: String) -> FetchedEntry {
    FetchedEntry { id: id.to_string(), payload }
}

// Tests.

#[tokio::test]
async fn valid_entry_completes_delivers_persists_and_retires() {
    let mut log = MockLog::new();
    let mut memory = MockMemory::new();
    let mut tokens = MockTokens::new();
    let mut llm = MockLlm::new();
    let mut chat = MockChat::new();

    // Empty conversation for T1:C1.
    memory.expect_read().times(1).withf(|key| key.team == "T1" && key.channel == "C1").returning(|_| Ok(vec![]));

    // Exactly one completion call: system preamble plus the new user message.
    llm.expect_complete()
        .times(1)
        .withf(|messages| {
            messages.len() == 2
                && messages[0] == ThreadMessage::new(Role::System, prompts::SYSTEM_PREAMBLE)
                && messages[1] == ThreadMessage::new(Role::User, "hello")
        })
        .returning(|_| Ok("the answer".to_string()));

    // Delivery resolves the tenant credential and posts threaded under the
    // mention's own timestamp.
    tokens.expect_get().times(1).withf(|team| team == "T1").returning(|_| Ok(Some("xoxb-t1".to_string())));
    chat.expect_post_reply()
        .times(1)
        .withf(|token, channel, thread_ts, text| token == "xoxb-t1" && channel == "C1" && thread_ts == "100" && text == "the answer")
        .returning(|_, _, _, _| Ok(()));

    // User turn first, then assistant turn.
    memory
        .expect_append()
        .times(1)
        .withf(|_, turn| turn.role == Role::User && turn.content == "hello" && turn.thread_id.as_deref() == Some("100"))
        .returning(|_, _| Ok(()));
    memory
        .expect_append()
        .times(1)
        .withf(|_, turn| turn.role == Role::Assistant && turn.content == "the answer")
        .returning(|_, _| Ok(()));

    // Acknowledged and deleted exactly once, never dead-lettered.
    log.expect_ack_delete().times(1).withf(|id| id == "1-1").returning(|_| Ok(()));
    log.expect_dead_letter().never();

    let worker = worker(log, memory, tokens, llm, chat);
    worker.process_entry(&entry("1-1", hello_payload_json())).await.unwrap();
}

#[tokio::test]
async fn tombstone_entry_is_retired_without_processing() {
    let mut log = MockLog::new();
    let mut memory = MockMemory::new();
    let tokens = MockTokens::new();
    let mut llm = MockLlm::new();
    let chat = MockChat::new();

    let mut payload: serde_json::Value = serde_json::from_str(&hello_payload_json()).unwrap();
    payload["added"] = serde_json::json!(0);

    memory.expect_read().never();
    llm.expect_complete().never();
    log.expect_ack_delete().times(1).withf(|id| id == "2-0").returning(|_| Ok(()));
    log.expect_dead_letter().never();

    let worker = worker(log, memory, tokens, llm, chat);
    worker.process_entry(&entry("2-0", payload.to_string())).await.unwrap();
}

#[tokio::test]
async fn malformed_payload_is_dead_lettered_verbatim() {
    let mut log = MockLog::new();
    let memory = MockMemory::new();
    let tokens = MockTokens::new();
    let mut llm = MockLlm::new();
    let chat = MockChat::new();

    llm.expect_complete().never();
    log.expect_dead_letter()
        .times(1)
        .withf(|original_id, payload, reason| original_id == "3-0" && payload == "this is not json" && reason.as_deref() == Some("malformed payload"))
        .returning(|_, _, _| Ok(()));
    log.expect_ack_delete().times(1).withf(|id| id == "3-0").returning(|_| Ok(()));

    let worker = worker(log, memory, tokens, llm, chat);
    worker.process_entry(&entry("3-0", "this is not json".to_string())).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn completion_exhaustion_dead_letters_with_original_id() {
    let mut log = MockLog::new();
    let mut memory = MockMemory::new();
    let tokens = MockTokens::new();
    let mut llm = MockLlm::new();
    let mut chat = MockChat::new();

    memory.expect_read().returning(|_| Ok(vec![]));

    // Three consecutive failures: the retry budget is exactly three attempts.
    llm.expect_complete().times(3).returning(|_| Err(anyhow::anyhow!("upstream unavailable")));

    chat.expect_post_reply().never();
    memory.expect_append().never();

    log.expect_dead_letter()
        .times(1)
        .withf(|original_id, _, reason| original_id == "4-0" && reason.as_deref() == Some("completion failed"))
        .returning(|_, _, _| Ok(()));
    log.expect_ack_delete().times(1).withf(|id| id == "4-0").returning(|_| Ok(()));

    let worker = worker(log, memory, tokens, llm, chat);
    worker.process_entry(&entry("4-0", hello_payload_json())).await.unwrap();
}

#[tokio::test]
async fn delivery_failure_discards_answer_and_dead_letters() {
    let mut log = MockLog::new();
    let mut memory = MockMemory::new();
    let mut tokens = MockTokens::new();
    let mut llm = MockLlm::new();
    let mut chat = MockChat::new();

    memory.expect_read().returning(|_| Ok(vec![]));
    llm.expect_complete().times(1).returning(|_| Ok("discarded".to_string()));
    tokens.expect_get().returning(|_| Ok(Some("xoxb-t1".to_string())));

    chat.expect_post_reply().times(1).returning(|_, _, _, _| Err(anyhow::anyhow!("channel_not_found")));

    // The generated answer is not persisted and not retried.
    memory.expect_append().never();
    log.expect_dead_letter()
        .times(1)
        .withf(|original_id, _, reason| original_id == "5-0" && reason.as_deref() == Some("delivery failed"))
        .returning(|_, _, _| Ok(()));
    log.expect_ack_delete().times(1).returning(|_| Ok(()));

    let worker = worker(log, memory, tokens, llm, chat);
    worker.process_entry(&entry("5-0", hello_payload_json())).await.unwrap();
}

#[tokio::test]
async fn missing_tenant_credential_is_a_delivery_failure() {
    let mut log = MockLog::new();
    let mut memory = MockMemory::new();
    let mut tokens = MockTokens::new();
    let mut llm = MockLlm::new();
    let mut chat = MockChat::new();

    memory.expect_read().returning(|_| Ok(vec![]));
    llm.expect_complete().returning(|_| Ok("the answer".to_string()));
    tokens.expect_get().times(1).returning(|_| Ok(None));

    chat.expect_post_reply().never();
    log.expect_dead_letter()
        .times(1)
        .withf(|_, _, reason| reason.as_deref() == Some("delivery failed"))
        .returning(|_, _, _| Ok(()));
    log.expect_ack_delete().times(1).returning(|_| Ok(()));

    let worker = worker(log, memory, tokens, llm, chat);
    worker.process_entry(&entry("6-0", hello_payload_json())).await.unwrap();
}

#[tokio::test]
async fn memory_persist_failure_is_non_fatal() {
    let mut log = MockLog::new();
    let mut memory = MockMemory::new();
    let mut tokens = MockTokens::new();
    let mut llm = MockLlm::new();
    let mut chat = MockChat::new();

    memory.expect_read().returning(|_| Ok(vec![]));
    llm.expect_complete().returning(|_| Ok("the answer".to_string()));
    tokens.expect_get().returning(|_| Ok(Some("xoxb-t1".to_string())));
    chat.expect_post_reply().returning(|_, _, _, _| Ok(()));

    // Both appends fail; the entry is still acknowledged and never
    // dead-lettered.
    memory.expect_append().times(2).returning(|_, _| Err(anyhow::anyhow!("store unavailable")));
    log.expect_dead_letter().never();
    log.expect_ack_delete().times(1).withf(|id| id == "7-0").returning(|_| Ok(()));

    let worker = worker(log, memory, tokens, llm, chat);
    worker.process_entry(&entry("7-0", hello_payload_json())).await.unwrap();
}

#[tokio::test]
async fn memory_read_failure_degrades_to_empty_history() {
    let mut log = MockLog::new();
    let mut memory = MockMemory::new();
    let mut tokens = MockTokens::new();
    let mut llm = MockLlm::new();
    let mut chat = MockChat::new();

    memory.expect_read().times(1).returning(|_| Err(anyhow::anyhow!("store unavailable")));

    // The completion still happens, with no history between preamble and
    // user message.
    llm.expect_complete().times(1).withf(|messages| messages.len() == 2).returning(|_| Ok("the answer".to_string()));

    tokens.expect_get().returning(|_| Ok(Some("xoxb-t1".to_string())));
    chat.expect_post_reply().returning(|_, _, _, _| Ok(()));
    memory.expect_append().times(2).returning(|_, _| Ok(()));
    log.expect_ack_delete().times(1).returning(|_| Ok(()));
    log.expect_dead_letter().never();

    let worker = worker(log, memory, tokens, llm, chat);
    worker.process_entry(&entry("8-0", hello_payload_json())).await.unwrap();
}

#[tokio::test]
async fn explicit_thread_ts_wins_over_event_ts() {
    let mut log = MockLog::new();
    let mut memory = MockMemory::new();
    let mut tokens = MockTokens::new();
    let mut llm = MockLlm::new();
    let mut chat = MockChat::new();

    let mut payload: serde_json::Value = serde_json::from_str(&hello_payload_json()).unwrap();
    payload["body"]["thread_ts"] = serde_json::json!("42");

    memory.expect_read().returning(|_| Ok(vec![]));
    llm.expect_complete().returning(|_| Ok("the answer".to_string()));
    tokens.expect_get().returning(|_| Ok(Some("xoxb-t1".to_string())));

    chat.expect_post_reply().times(1).withf(|_, _, thread_ts, _| thread_ts == "42").returning(|_, _, _, _| Ok(()));

    memory.expect_append().times(2).withf(|_, turn| turn.thread_id.as_deref() == Some("42")).returning(|_, _| Ok(()));
    log.expect_ack_delete().times(1).returning(|_| Ok(()));

    let worker = worker(log, memory, tokens, llm, chat);
    worker.process_entry(&entry("9-0", payload.to_string())).await.unwrap();
}

#[tokio::test]
async fn batch_entries_each_reach_a_terminal_state() {
    let mut log = MockLog::new();
    let mut memory = MockMemory::new();
    let mut tokens = MockTokens::new();
    let mut llm = MockLlm::new();
    let mut chat = MockChat::new();

    memory.expect_read().returning(|_| Ok(vec![]));
    llm.expect_complete().returning(|_| Ok("the answer".to_string()));
    tokens.expect_get().returning(|_| Ok(Some("xoxb-t1".to_string())));
    chat.expect_post_reply().returning(|_, _, _, _| Ok(()));
    memory.expect_append().returning(|_, _| Ok(()));

    // One valid entry, one malformed: both retired, only the malformed one
    // dead-lettered.
    log.expect_dead_letter().times(1).withf(|original_id, _, _| original_id == "11-0").returning(|_, _, _| Ok(()));
    log.expect_ack_delete().times(2).returning(|_| Ok(()));

    let worker = worker(log, memory, tokens, llm, chat);
    worker
        .process_batch(vec![entry("10-0", hello_payload_json()), entry("11-0", "garbage".to_string())])
        .await;
}
