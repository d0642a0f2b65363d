//! Channel bridge
//!
//! The bridge is the glue between bus topics and the session runtime. It
//! subscribes to `inbound:*`, converts each delivery into a session-scoped
//! prompt, and publishes the session's output back on
//! `outbound:<chat_id>`. It also serves `system:spawn` requests by creating
//! sessions on demand.
//!
//! Ordering: deliveries for one client dispatch sequentially, and the
//! bridge enqueues each input on its session before moving on, so inputs
//! for one session stay in arrival order while a slow session never blocks
//! the others (the wait for results happens in detached tasks).

use crate::error::AgentResult;
use crate::runtime::Supervisor;
use bub_core::{
    InboundMessage, MessageEnvelope, OutboundMessage, PayloadBody, SpawnResultContent,
    SYSTEM_SPAWN_TOPIC,
};
use bub_client::BusClient;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-message addressing filter
///
/// Direct chats always pass. Group chats pass only when the message is
/// addressed to the bot: a mention, a reply to the bot, or a leading
/// `/bub` command.
pub struct MessageFilter;

impl MessageFilter {
    /// Decide whether a message reaches the session runtime
    pub fn should_process(message: &InboundMessage) -> bool {
        let chat_type = message
            .metadata
            .get("chat_type")
            .and_then(|v| v.as_str())
            .unwrap_or("private");
        if !matches!(chat_type, "group" | "supergroup" | "channel") {
            return true;
        }

        let mentioned = message
            .metadata
            .get("mentioned")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let reply_to_bot = message
            .metadata
            .get("reply_to_bot")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        mentioned || reply_to_bot || message.content.trim_start().starts_with("/bub")
    }
}

/// Bridge between the bus and the session runtime
pub struct ChannelBridge {
    client: BusClient,
    supervisor: Arc<Supervisor>,
    client_id: String,
}

impl ChannelBridge {
    /// Create a bridge over a connected client
    pub fn new(client: BusClient, supervisor: Arc<Supervisor>, client_id: impl Into<String>) -> Self {
        Self {
            client,
            supervisor,
            client_id: client_id.into(),
        }
    }

    /// The bus client the bridge runs on
    pub fn client(&self) -> &BusClient {
        &self.client
    }

    /// Initialize on the bus and subscribe the inbound and spawn topics
    pub async fn start(&self) -> AgentResult<()> {
        self.client.initialize(&self.client_id, None).await?;

        let supervisor = Arc::clone(&self.supervisor);
        let outbound_client = self.client.clone();
        self.client
            .subscribe("inbound:*", move |topic, payload| {
                let supervisor = Arc::clone(&supervisor);
                let client = outbound_client.clone();
                async move {
                    handle_inbound(supervisor, client, topic, payload).await;
                }
            })
            .await?;

        let supervisor = Arc::clone(&self.supervisor);
        let reply_client = self.client.clone();
        let reply_from = self.client_id.clone();
        self.client
            .subscribe(SYSTEM_SPAWN_TOPIC, move |_topic, payload| {
                let supervisor = Arc::clone(&supervisor);
                let client = reply_client.clone();
                let from = reply_from.clone();
                async move {
                    handle_spawn(supervisor, client, from, payload).await;
                }
            })
            .await?;

        tracing::info!(client_id = %self.client_id, "channel bridge started");
        Ok(())
    }

    /// Disconnect from the bus
    pub async fn stop(&self) {
        self.client.disconnect().await;
    }
}

async fn handle_inbound(
    supervisor: Arc<Supervisor>,
    client: BusClient,
    topic: String,
    payload: serde_json::Value,
) {
    let Some(envelope) = MessageEnvelope::from_value(payload) else {
        tracing::debug!(topic = %topic, "inbound delivery is not an envelope");
        return;
    };
    let Some(inbound) = InboundMessage::from_envelope(&envelope) else {
        tracing::debug!(topic = %topic, kind = %envelope.kind, "inbound envelope is not a message");
        return;
    };

    if !MessageFilter::should_process(&inbound) {
        tracing::debug!(session_id = %inbound.session_id(), "message filtered");
        return;
    }

    let session_id = inbound.session_id();
    let session = match supervisor.session(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "failed to open session");
            return;
        }
    };

    // Enqueue here (preserving arrival order), wait for the result in a
    // detached task so a busy session cannot stall the receive loop.
    let pending = match session.submit(inbound.render()).await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "failed to enqueue input");
            return;
        }
    };

    tokio::spawn(async move {
        let result = match pending.await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(session_id = %session_id, "session dropped the input");
                return;
            }
        };

        if let Some(error) = &result.error {
            tracing::warn!(session_id = %session_id, error = %error, "turn ended with error");
        }

        let text = if result.assistant_output.is_empty() {
            result.immediate_output.clone()
        } else {
            result.assistant_output.clone()
        };
        if text.is_empty() {
            return;
        }

        let outbound = OutboundMessage {
            channel: inbound.channel.clone(),
            chat_id: inbound.chat_id.clone(),
            content: text,
            metadata: BTreeMap::new(),
            reply_to_message_id: None,
        };
        match client.publish_outbound(&outbound).await {
            Ok(delivered) => {
                tracing::debug!(session_id = %session_id, delivered, "outbound published");
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "outbound publish failed");
            }
        }
    });
}

async fn handle_spawn(
    supervisor: Arc<Supervisor>,
    client: BusClient,
    from: String,
    payload: serde_json::Value,
) {
    let Some(envelope) = MessageEnvelope::from_value(payload) else {
        return;
    };
    let PayloadBody::SpawnRequest(request) = envelope.body() else {
        tracing::debug!(kind = %envelope.kind, "spawn delivery is not a spawn_request");
        return;
    };

    let session_id = format!("{}:{}", request.channel, request.chat_id);
    let content = match supervisor.session(&session_id).await {
        Ok(_) => SpawnResultContent {
            success: true,
            client_id: Some(session_id.clone()),
            error: None,
        },
        Err(e) => SpawnResultContent {
            success: false,
            client_id: None,
            error: Some(e.tag()),
        },
    };

    let reply = MessageEnvelope::new(from, PayloadBody::SpawnResult(content));
    if let Err(e) = client.send_message(&envelope.from, reply.to_value()).await {
        tracing::warn!(to = %envelope.from, error = %e, "spawn result publish failed");
    }
}
