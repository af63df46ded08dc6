//! Inbound message polling via `conversations.history`.

use super::api::{HistoryMessage, SlackApi};
use super::InboundMessage;
use crate::error::Result;

/// Parse a Slack `ts` ("1700000000.000100") into (seconds, micros).
fn parse_ts(ts: &str) -> Option<(u64, u64)> {
    let (secs, micros) = ts.split_once('.').unwrap_or((ts, "0"));
    Some((secs.parse().ok()?, micros.parse().ok()?))
}

fn is_after(ts: &str, last: &str) -> bool {
    match (parse_ts(ts), parse_ts(last)) {
        (Some(a), Some(b)) => a > b,
        _ => ts > last,
    }
}

/// Slack timestamp for the current instant.
pub fn now_ts() -> String {
    let now = chrono::Utc::now();
    format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
}

/// Keep user messages newer than `last_ts`, oldest first.
fn select_new(channel: &str, messages: Vec<HistoryMessage>, last_ts: &str) -> Vec<InboundMessage> {
    let mut fresh: Vec<InboundMessage> = messages
        .into_iter()
        .filter(|m| m.bot_id.is_none() && m.subtype.is_none())
        .filter(|m| is_after(&m.ts, last_ts))
        .filter_map(|m| {
            Some(InboundMessage {
                user: m.user?,
                channel: channel.to_string(),
                text: m.text,
                ts: m.ts,
            })
        })
        .collect();
    fresh.sort_by_key(|m| parse_ts(&m.ts));
    fresh
}

/// Tracks the newest message seen in one channel.
pub struct ChannelPoller {
    channel: String,
    last_ts: String,
}

impl ChannelPoller {
    /// Start polling from now; history before startup is ignored.
    pub fn new(channel: impl Into<String>) -> Self {
        Self::starting_at(channel, now_ts())
    }

    pub fn starting_at(channel: impl Into<String>, last_ts: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            last_ts: last_ts.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn poll(&mut self, api: &SlackApi) -> Result<Vec<InboundMessage>> {
        let messages = api.history(&self.channel, &self.last_ts).await?;
        Ok(self.advance(messages))
    }

    fn advance(&mut self, messages: Vec<HistoryMessage>) -> Vec<InboundMessage> {
        // Advance past everything returned, including filtered messages.
        if let Some(newest) = messages
            .iter()
            .map(|m| m.ts.as_str())
            .filter(|ts| is_after(ts, &self.last_ts))
            .max_by_key(|ts| parse_ts(ts))
        {
            let newest = newest.to_string();
            let fresh = select_new(&self.channel, messages, &self.last_ts);
            self.last_ts = newest;
            return fresh;
        }
        Vec::new()
    }
}
