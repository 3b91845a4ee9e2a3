//! Runtime services and shared state for warpi.

use redis::aio::ConnectionManager;
use tokio::signal;
use tracing::{error, info, instrument};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    ingress::{self, IngressState},
    queue::EventLog,
    service::{chat::ChatClient, llm::LlmClient, memory::MemoryStore, token::TokenStore},
    worker::Worker,
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the event log, memory and credential stores, the LLM
/// and chat clients, and the configuration. It is designed to be trivially
/// cloneable, allowing it to be passed around without the need for `Arc` or
/// `Mutex`. The Redis connection is constructed here once and handed to
/// every component that needs it; there is no ambient global.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The durable event log.
    pub log: EventLog,
    /// The conversation memory store.
    pub memory: MemoryStore,
    /// The tenant credential store.
    pub tokens: TokenStore,
    /// The LLM client instance.
    pub llm: LlmClient,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Open the shared Redis connection, plus a second one reserved for
        // the worker's blocking fetch (XREADGROUP BLOCK occupies its
        // connection for the full wait).
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = ConnectionManager::new(client.clone()).await?;
        let fetch_conn = ConnectionManager::new(client).await?;

        info!("Redis connected.");

        // Initialize the stores over the shared connection.
        let log = EventLog::redis(&config, conn.clone(), fetch_conn);
        let memory = MemoryStore::redis(&config, conn.clone());
        let tokens = TokenStore::redis(conn);

        // Initialize the LLM client.
        let llm = LlmClient::openai(&config);

        // Initialize the chat client.
        let chat = ChatClient::slack(&config)?;

        Ok(Self {
            config,
            log,
            memory,
            tokens,
            llm,
            chat,
        })
    }

    /// Run the ingress server and the worker loop until ctrl-c.
    ///
    /// In-flight entries are not drained at shutdown; anything claimed but
    /// unfinished stays pending and is recovered later by the stale-pending
    /// sweep.
    pub async fn start(&self) -> Void {
        let worker = Worker::new(
            self.config.clone(),
            self.log.clone(),
            self.memory.clone(),
            self.tokens.clone(),
            self.llm.clone(),
            self.chat.clone(),
        );

        let state = IngressState {
            config: self.config.clone(),
            log: self.log.clone(),
            memory: self.memory.clone(),
            tokens: self.tokens.clone(),
            llm: self.llm.clone(),
            chat: self.chat.clone(),
        };

        tokio::select! {
            result = worker.run() => {
                error!("Worker loop exited: {:?}", result);
                result
            }
            result = ingress::serve(state) => {
                error!("Ingress exited: {:?}", result);
                result
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received; exiting.");
                Ok(())
            }
        }
    }
}
