//! HTTP ingress for warpi.
//!
//! Thin I/O boundary in front of the pipeline: receives Slack event
//! envelopes, appends app-mentions to the event log (fire-and-forget — the
//! acknowledgment to Slack is independent of downstream processing),
//! applies deletion events directly to conversation memory, exchanges OAuth
//! install codes, and exposes two debug conveniences (memory read, direct
//! completion) that are not part of the durability contract.
//!
//! Inbound signature verification is intentionally absent.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        prompts,
        types::{BodyInfo, ConversationKey, EventInfo, QueuePayload, Void},
    },
    queue::EventLog,
    service::{chat::ChatClient, llm::LlmClient, memory::MemoryStore, token::TokenStore},
    worker::build_messages,
};

// Structs.

/// Shared handles for the ingress handlers.
#[derive(Clone)]
pub struct IngressState {
    /// The application configuration.
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

#[derive(Debug, Deserialize)]
struct OAuthQuery {
    code: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    team: String,
    channel: String,
    message: String,
}

// Helpers.

/// Strip a leading `<@...>` bot mention (and following whitespace) from a
/// message text.
pub fn strip_mention(text: &str) -> &str {
    if let Some(rest) = text.strip_prefix("<@")
        && let Some(end) = rest.find('>')
    {
        return rest[end + 1..].trim_start();
    }

    text
}

/// Whether an event envelope describes a message deletion: either an
/// explicit `message_deleted`, or a `message_changed` whose replacement is a
/// tombstone.
pub fn is_deletion_event(event: &Value) -> bool {
    match event["subtype"].as_str() {
        Some("message_deleted") => true,
        Some("message_changed") => event["message"]["subtype"].as_str() == Some("tombstone"),
        _ => false,
    }
}

/// Build the queue payload for an app-mention event.
pub fn mention_payload(event: &Value, envelope_team: Option<&str>) -> Option<QueuePayload> {
    let user = event["user"].as_str()?.to_string();
    let channel = event["channel"].as_str()?.to_string();
    let ts = event["ts"].as_str().unwrap_or_default().to_string();
    let text = strip_mention(event["text"].as_str().unwrap_or_default()).to_string();
    let team = event["team"].as_str().or(envelope_team).unwrap_or("unknown").to_string();
    let thread_ts = event["thread_ts"].as_str().map(ToString::to_string);

    let unique_id = format!("{}-{}", user, chrono::Utc::now().timestamp_millis());

    Some(QueuePayload {
        event: EventInfo {
            channel: channel.clone(),
            ts,
            text: text.clone(),
        },
        body: BodyInfo {
            user_id: user,
            message: text,
            team,
            channel,
            thread_ts,
        },
        unique_id,
        added: 1,
    })
}

// Server.

/// Serve the ingress router on the configured port.
pub async fn serve(state: IngressState) -> Void {
    let port = state.config.port;
    let router = router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;

    info!("Ingress listening on port {}.", port);

    axum::serve(listener, router).await?;

    Ok(())
}

fn router(state: IngressState) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/slack/oauth", get(slack_oauth))
        .route("/memory/{team}/{channel}", get(read_memory))
        .route("/chat", post(debug_chat))
        .with_state(state)
}

// Handlers.

/// Inbound Slack event envelope.
///
/// Always acknowledges with 200 once the envelope is recognized; downstream
/// processing happens after the response (or not at all for ignored event
/// types).
#[instrument(skip_all)]
async fn slack_events(State(state): State<IngressState>, Json(envelope): Json<Value>) -> (StatusCode, Json<Value>) {
    // URL verification handshake.
    if envelope["type"].as_str() == Some("url_verification") {
        let challenge = envelope["challenge"].as_str().unwrap_or_default();
        return (StatusCode::OK, Json(json!({ "challenge": challenge })));
    }

    let event = &envelope["event"];
    let envelope_team = envelope["team_id"].as_str();

    match event["type"].as_str() {
        Some("app_mention") => {
            let Some(payload) = mention_payload(event, envelope_team) else {
                warn!("App mention event missing required fields; ignoring.");
                return (StatusCode::OK, Json(json!({ "ok": true })));
            };

            // Fire and forget: the acknowledgment to Slack must not wait on
            // the append, let alone on processing.
            let log = state.log.clone();
            tokio::spawn(async move {
                if let Err(e) = log.append(&payload).await {
                    error!("Error pushing user event to stream: {}", e);
                }
            });
        }
        Some("message") if is_deletion_event(event) => {
            // Deletion is applied directly, not via the queue.
            handle_deletion(&state, event, envelope_team).await;
        }
        other => {
            info!("Ignoring event type {:?}.", other);
        }
    }

    (StatusCode::OK, Json(json!({ "ok": true })))
}

async fn handle_deletion(state: &IngressState, event: &Value, envelope_team: Option<&str>) {
    let Some(channel) = event["channel"].as_str() else {
        warn!("Deletion event missing channel; ignoring.");
        return;
    };
    let Some(thread_ts) = event["thread_ts"].as_str() else {
        warn!("Deletion event missing thread_ts; ignoring.");
        return;
    };

    let team = event["team_id"].as_str().or(event["team"].as_str()).or(envelope_team).unwrap_or("unknown");
    let key = ConversationKey::new(team, channel);

    match state.memory.remove_thread(&key, thread_ts).await {
        Ok(removed) => info!("Removed {} turns for deleted thread {} in {}.", removed, thread_ts, key),
        Err(e) => error!("Error handling deletion for {}: {}", key, e),
    }
}

/// OAuth install callback: exchange the code and store the tenant credential.
#[instrument(skip_all)]
async fn slack_oauth(State(state): State<IngressState>, Query(query): Query<OAuthQuery>) -> (StatusCode, Json<Value>) {
    let install = match state.chat.exchange_oauth_code(&query.code).await {
        Ok(install) => install,
        Err(e) => {
            error!("OAuth exchange failed: {}", e);
            return (StatusCode::BAD_GATEWAY, Json(json!({ "ok": false })));
        }
    };

    if let Err(e) = state.tokens.put(&install.team, &install.token).await {
        error!("Error storing credential for team {}: {}", install.team, e);
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "ok": false })));
    }

    (StatusCode::OK, Json(json!({ "ok": true, "team": install.team })))
}

/// Debug read of a conversation's memory window.
#[instrument(skip_all)]
async fn read_memory(State(state): State<IngressState>, Path((team, channel)): Path<(String, String)>) -> (StatusCode, Json<Value>) {
    let key = ConversationKey::new(team, channel);

    match state.memory.read(&key).await {
        Ok(turns) => (StatusCode::OK, Json(json!({ "key": key.to_string(), "memory": turns }))),
        Err(e) => {
            error!("Error reading memory for {}: {}", key, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "ok": false })))
        }
    }
}

/// Debug completion bypassing the queue. Degrades to an apologetic fallback
/// instead of surfacing the error to the caller.
#[instrument(skip_all)]
async fn debug_chat(State(state): State<IngressState>, Json(request): Json<ChatRequest>) -> Json<Value> {
    let key = ConversationKey::new(&request.team, &request.channel);

    let history = state.memory.read(&key).await.unwrap_or_default();
    let messages = build_messages(&history, &request.message);

    let reply = match state.llm.complete(&messages).await {
        Ok(answer) => answer,
        Err(e) => {
            error!("Debug completion failed: {}", e);
            prompts::APOLOGY_FALLBACK.to_string()
        }
    };

    Json(json!({ "reply": reply }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_bot_mention() {
        assert_eq!(strip_mention("<@U123> hello there"), "hello there");
        assert_eq!(strip_mention("hello <@U123>"), "hello <@U123>");
        assert_eq!(strip_mention("plain text"), "plain text");
    }

    #[test]
    fn classifies_deletion_events() {
        assert!(is_deletion_event(&json!({ "subtype": "message_deleted" })));
        assert!(is_deletion_event(&json!({ "subtype": "message_changed", "message": { "subtype": "tombstone" } })));
        assert!(!is_deletion_event(&json!({ "subtype": "message_changed", "message": { "subtype": "edited" } })));
        assert!(!is_deletion_event(&json!({ "subtype": "channel_join" })));
        assert!(!is_deletion_event(&json!({})));
    }

    #[test]
    fn mention_payload_fills_queue_entry() {
        let event = json!({
            "type": "app_mention",
            "user": "U1",
            "channel": "C1",
            "ts": "100",
            "text": "<@UBOT> hello",
        });

        let payload = mention_payload(&event, Some("T1")).unwrap();

        assert_eq!(payload.added, 1);
        assert_eq!(payload.event.text, "hello");
        assert_eq!(payload.body.message, "hello");
        assert_eq!(payload.body.team, "T1");
        assert_eq!(payload.body.thread_ts, None);
        assert!(payload.unique_id.starts_with("U1-"));
    }

    #[test]
    fn mention_payload_requires_user_and_channel() {
        assert!(mention_payload(&json!({ "channel": "C1" }), None).is_none());
        assert!(mention_payload(&json!({ "user": "U1" }), None).is_none());
    }
}
