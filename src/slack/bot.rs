//! Slack message handling: route, run the handler, reply.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{ChatTransport, InboundMessage};
use crate::cluster::ClusterGateway;
use crate::core::{dispatch, format, Context, LeaseManager, OutgoingPayload, Registry};

pub struct Bot<T: ChatTransport> {
    transport: T,
    bot_id: String,
    registry: Registry,
    gateway: Arc<dyn ClusterGateway>,
    leases: LeaseManager,
    user_names: Mutex<HashMap<String, String>>,
    channel_names: Mutex<HashMap<String, String>>,
}

impl<T: ChatTransport> Bot<T> {
    pub fn new(
        transport: T,
        bot_id: impl Into<String>,
        registry: Registry,
        gateway: Arc<dyn ClusterGateway>,
        leases: LeaseManager,
    ) -> Self {
        Self {
            transport,
            bot_id: bot_id.into(),
            registry,
            gateway,
            leases,
            user_names: Mutex::new(HashMap::new()),
            channel_names: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Text after the `<@BOT_ID>` prefix, if the message is for the bot.
    pub fn addressed_text<'a>(&self, text: &'a str) -> Option<&'a str> {
        let rest = text.strip_prefix(&format!("<@{}>", self.bot_id))?;
        if rest.is_empty() {
            return None;
        }
        Some(rest.trim())
    }

    /// Handle one inbound message. Failures are logged, never returned.
    pub async fn handle(&self, msg: &InboundMessage) {
        let Some(text) = self.addressed_text(&msg.text) else {
            return;
        };

        let outcome = dispatch(&self.registry, text);
        self.log_request(msg, outcome.handler.name(), text).await;

        let ctx = Context {
            text,
            requester: &msg.user,
            registry: &self.registry,
            gateway: self.gateway.as_ref(),
            leases: &self.leases,
        };

        match outcome.handler.handle(&ctx, &outcome.captures).await {
            Ok(reply) => {
                if let Some(payload) = format(reply) {
                    self.deliver(&msg.channel, payload).await;
                }
            }
            Err(e) => {
                tracing::error!(
                    handler = outcome.handler.name(),
                    "command failed for '{}': {}",
                    text,
                    e
                );
                let notice = OutgoingPayload {
                    text: format!("Sorry <@{}>, that failed: {}", msg.user, e),
                    attachment: None,
                };
                self.deliver(&msg.channel, notice).await;
            }
        }
    }

    async fn deliver(&self, channel: &str, payload: OutgoingPayload) {
        let result = match &payload.attachment {
            Some(content) => {
                self.transport
                    .send_file(channel, &payload.text, content)
                    .await
            }
            None => self.transport.send_message(channel, &payload.text).await,
        };
        if let Err(e) = result {
            tracing::warn!("Failed to send reply to {}: {}", channel, e);
        }
    }

    async fn log_request(&self, msg: &InboundMessage, function_name: &str, text: &str) {
        let username = self.user_name(&msg.user).await;
        let channel = self.channel_name(&msg.channel).await;
        tracing::info!(
            target: "slackernetes::request",
            username = %username,
            function_name,
            channel = %channel,
            text,
            "request"
        );
    }

    async fn user_name(&self, user_id: &str) -> String {
        let mut cache = self.user_names.lock().await;
        if let Some(name) = cache.get(user_id) {
            return name.clone();
        }
        match self.transport.user_name(user_id).await {
            Ok(name) => {
                cache.insert(user_id.to_string(), name.clone());
                name
            }
            Err(e) => {
                tracing::debug!("users.info failed for {}: {}", user_id, e);
                user_id.to_string()
            }
        }
    }

    async fn channel_name(&self, channel_id: &str) -> String {
        let mut cache = self.channel_names.lock().await;
        if let Some(name) = cache.get(channel_id) {
            return name.clone();
        }
        match self.transport.channel_name(channel_id).await {
            Ok(name) => {
                cache.insert(channel_id.to_string(), name.clone());
                name
            }
            Err(e) => {
                tracing::debug!("conversations.info failed for {}: {}", channel_id, e);
                channel_id.to_string()
            }
        }
    }
}
