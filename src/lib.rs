//! Library root for `warpi`.
//!
//! Warpi is an OpenAI-powered Slack assistant built around a durable queue:
//! - Inbound app-mentions are appended to a Redis Stream event log
//! - A consumer-group worker drains the log with bounded concurrency
//! - Conversation memory keeps a fixed window of prior turns per channel
//! - Completion calls retry with linear backoff; unrecoverable entries are
//!   routed to a dead-letter log for offline inspection and replay
//!
//! The bot integrates with Slack for chat, Redis for the event log and
//! memory, and OpenAI for responses. The architecture is built around
//! extensible traits that allow for different implementations of each
//! service.

#![deny(missing_docs)]

pub mod base;
pub mod ingress;
pub mod queue;
pub mod runtime;
pub mod service;
pub mod worker;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the warpi runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with the event log, stores, LLM, and chat clients
/// - Starts the ingress server and the worker loop
pub async fn start(config: Config) -> Void {
    info!("Starting warpi ...");

    // Start the crypto provider.
    crypto::ring::default_provider().install_default().map_err(|_| anyhow::anyhow!("Failed to install crypto provider."))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
