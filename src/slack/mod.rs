//! Slack integration.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::{ClusterGateway, KubeClient};
use crate::config::Settings;
use crate::core::{default_registry, LabelLeaseRepository, LeaseManager};
use crate::error::{Error, Result};

pub mod api;
pub mod bot;
pub mod poller;

pub use api::SlackApi;
pub use bot::Bot;
pub use poller::ChannelPoller;

/// A user message seen in a watched channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub text: String,
    pub user: String,
    pub channel: String,
    pub ts: String,
}

/// Outbound side of the chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, channel: &str, text: &str) -> Result<()>;

    async fn send_file(&self, channel: &str, comment: &str, content: &str) -> Result<()>;

    async fn user_name(&self, user_id: &str) -> Result<String>;

    async fn channel_name(&self, channel_id: &str) -> Result<String>;
}

/// Run the Slack bot until Ctrl-C.
///
/// Messages are handled one at a time in arrival order, channel by channel.
pub async fn run_slack_bot(settings: Settings) -> Result<()> {
    settings.validate_for_bot()?;
    tracing::info!("Starting Slack bot...");

    let token = settings
        .slack
        .bot_token
        .clone()
        .ok_or_else(|| Error::Config("No bot token configured".to_string()))?;
    let api = SlackApi::new(token);
    let bot_id = api.auth_test().await?;
    tracing::debug!("My ID is: {}", bot_id);

    let gateway: Arc<dyn ClusterGateway> =
        Arc::new(KubeClient::new(&settings.cluster.endpoint()?)?);
    let leases = LeaseManager::new(LabelLeaseRepository::new(gateway.clone(), &settings.lease));
    let bot = Bot::new(api, bot_id, default_registry()?, gateway, leases);

    let mut pollers: Vec<ChannelPoller> = settings
        .slack
        .channels
        .iter()
        .map(|channel| ChannelPoller::new(channel.as_str()))
        .collect();
    let interval = Duration::from_millis(settings.slack.poll_interval_ms);

    tracing::info!(
        target: "slackernetes::status",
        state = "start",
        channels = pollers.len(),
        "status"
    );

    loop {
        for poller in pollers.iter_mut() {
            match poller.poll(bot.transport()).await {
                Ok(messages) => {
                    for msg in &messages {
                        bot.handle(msg).await;
                    }
                }
                Err(e) => {
                    tracing::warn!("Polling {} failed: {}", poller.channel(), e);
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!(target: "slackernetes::status", state = "stop", "status");
    Ok(())
}
