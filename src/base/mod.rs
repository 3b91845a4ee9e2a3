//! Core components, types, and utilities for warpi.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - The system prompt for LLM interactions.
//! - Common types and result handling.

pub mod config;
pub mod prompts;
pub mod types;
