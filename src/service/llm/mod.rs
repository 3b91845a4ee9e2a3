//! Text completion against a remote model.

pub mod openai;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Res, ThreadMessage};

// Traits.

/// Generic LLM client trait that clients must implement.
///
/// This is the completion seam of the pipeline: a request/response
/// text-generation call against an untrusted, occasionally-failing remote
/// dependency. Retry policy lives in the caller, not here.
#[async_trait]
pub trait GenericLlmClient: Send + Sync + 'static {
    /// Generate a completion for an ordered message list (system preamble
    /// first, then history, then the new user message).
    async fn complete(&self, messages: &[ThreadMessage]) -> Res<String>;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for
/// `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    /// Creates a handle over any LLM-client implementation.
    pub fn new(inner: Arc<dyn GenericLlmClient>) -> Self {
        Self { inner }
    }
}
