//! Outbound chat delivery and tenant installation.

pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Res, Void};

// Types.

/// Result of a tenant install: the workspace identifier and the bot token
/// to store in the credential map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantInstall {
    /// The installed workspace's team ID.
    pub team: String,
    /// The granted bot access token.
    pub token: String,
}

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This is the delivery seam of the pipeline. Replies are posted with a
/// per-tenant credential resolved at delivery time, so one client instance
/// serves every installed workspace.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Post a reply into a channel, threaded under the originating message.
    async fn post_reply(&self, token: &str, channel_id: &str, thread_ts: &str, text: &str) -> Void;

    /// Exchange an OAuth authorization code for a tenant install record.
    async fn exchange_oauth_code(&self, code: &str) -> Res<TenantInstall>;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    /// Creates a handle over any chat-client implementation.
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
