//! Prompt text for LLM usage.

/// Fixed system preamble prepended to every completion request.
pub const SYSTEM_PREAMBLE: &str = "You are Warpi — a helpful Slack assistant.";

/// Fallback reply for the synchronous debug path when the completion call fails.
pub const APOLOGY_FALLBACK: &str = "Sorry, I ran into an error while trying to respond.";
