//! Chat service integration for warpi.
//!
//! Slack implementation of the delivery seam. Unlike a single-workspace bot,
//! no bot token is held at construction: every post opens a session with the
//! tenant token resolved from the credential map, so one hyper client serves
//! all installed workspaces. The same client performs the OAuth v2 code
//! exchange for the install endpoint.

use crate::base::{
    config::Config,
    types::{Res, Void},
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tracing::{info, instrument};

use std::sync::Arc;

use super::{ChatClient, GenericChatClient, TenantInstall};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub fn slack(config: &Config) -> Res<Self> {
        let client = SlackChatClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    client: Arc<FullClient>,
    client_id: SlackClientId,
    client_secret: SlackClientSecret,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        Ok(Self {
            client,
            client_id: config.slack_client_id.clone().into(),
            client_secret: config.slack_client_secret.clone().into(),
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    #[instrument(skip(self, token, text))]
    async fn post_reply(&self, token: &str, channel_id: &str, thread_ts: &str, text: &str) -> Void {
        let token = SlackApiToken::new(SlackApiTokenValue(token.to_string()));
        let message = SlackMessageContent::new().with_text(text.to_string());

        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message)
            .with_thread_ts(SlackTs(thread_ts.to_string()))
            .with_link_names(true);

        let session = self.client.open_session(&token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }

    #[instrument(skip_all)]
    async fn exchange_oauth_code(&self, code: &str) -> Res<TenantInstall> {
        let request = SlackOAuthV2AccessTokenRequest::new(self.client_id.clone(), self.client_secret.clone(), SlackOAuthCode(code.to_string()));

        let response = self.client.oauth2_access(&request).await.map_err(|e| anyhow::anyhow!("OAuth code exchange failed: {}", e))?;

        let team = response.team.id.to_string();

        info!("Installed workspace: {}", team);

        Ok(TenantInstall {
            team,
            token: response.access_token.0,
        })
    }
}
