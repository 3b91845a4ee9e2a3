//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by warpi:
//! - Chat services (e.g., Slack)
//! - LLM services (e.g., OpenAI)
//! - Conversation memory (e.g., Redis lists)
//! - Tenant credential lookup (e.g., Redis hashes)
//!
//! Each service module defines both a generic trait and concrete
//! implementations, allowing for extensibility and easy testing.

pub mod chat;
pub mod llm;
pub mod memory;
pub mod token;
