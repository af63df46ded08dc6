//! Minimal Slack Web API wrapper.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::ChatTransport;
use crate::error::{Error, Result};

const API_BASE: &str = "https://slack.com/api";

/// Every Web API response carries `ok` and, on failure, `error`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    error: Option<String>,
    #[serde(flatten)]
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Empty {}

#[derive(Debug, Deserialize)]
struct AuthTest {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    user: NamedObject,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    channel: NamedObject,
}

#[derive(Debug, Deserialize)]
struct NamedObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UploadUrl {
    upload_url: String,
    file_id: String,
}

/// A message from `conversations.history`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub text: String,
    pub ts: String,
    pub user: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct History {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
    #[serde(default)]
    has_more: bool,
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

impl History {
    /// Cursor for the next page, if Slack reports one.
    fn next_cursor(&self) -> Option<&str> {
        self.response_metadata
            .as_ref()
            .map(|m| m.next_cursor.as_str())
            .filter(|cursor| !cursor.is_empty())
    }
}

fn into_result<T>(envelope: Envelope<T>, method: &str) -> Result<T> {
    if envelope.ok {
        envelope
            .body
            .ok_or_else(|| Error::Slack(format!("{} returned an unexpected body", method)))
    } else {
        Err(Error::Slack(format!(
            "{} failed: {}",
            method,
            envelope.error.unwrap_or_else(|| "unknown error".into())
        )))
    }
}

pub struct SlackApi {
    client: Client,
    token: String,
}

impl SlackApi {
    pub fn new(token: String) -> Self {
        Self {
            client: Client::new(),
            token,
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, &str)]) -> Result<T> {
        let envelope: Envelope<T> = self
            .client
            .post(format!("{API_BASE}/{method}"))
            .bearer_auth(&self.token)
            .form(params)
            .send()
            .await?
            .json()
            .await?;
        into_result(envelope, method)
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let envelope: Envelope<T> = self
            .client
            .post(format!("{API_BASE}/{method}"))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        into_result(envelope, method)
    }

    /// The bot's own user ID.
    pub async fn auth_test(&self) -> Result<String> {
        let auth: AuthTest = self.call("auth.test", &[]).await?;
        Ok(auth.user_id)
    }

    /// Every message strictly newer than `oldest`, following page cursors.
    pub async fn history(&self, channel: &str, oldest: &str) -> Result<Vec<HistoryMessage>> {
        let mut messages = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut params = vec![("channel", channel), ("oldest", oldest), ("limit", "200")];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.as_str()));
            }
            let mut page: History = self.call("conversations.history", &params).await?;
            messages.append(&mut page.messages);

            match page.next_cursor() {
                Some(next) if page.has_more => cursor = next.to_string(),
                _ => break,
            }
            tracing::debug!("{} has more history, fetching next page", channel);
        }
        Ok(messages)
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({ "channel": channel, "text": text });
        let _: Empty = self.call_json("chat.postMessage", &body).await?;
        Ok(())
    }

    /// Upload `content` as a text file via the external upload flow.
    pub async fn upload_file(&self, channel: &str, comment: &str, content: &str) -> Result<()> {
        let length = content.len().to_string();
        let upload: UploadUrl = self
            .call(
                "files.getUploadURLExternal",
                &[("filename", "output.txt"), ("length", length.as_str())],
            )
            .await?;

        let response = self
            .client
            .post(&upload.upload_url)
            .body(content.to_string())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Slack(format!(
                "file upload returned {}",
                response.status()
            )));
        }

        let body = serde_json::json!({
            "files": [{ "id": upload.file_id, "title": "output.txt" }],
            "channel_id": channel,
            "initial_comment": comment,
        });
        let _: Empty = self.call_json("files.completeUploadExternal", &body).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for SlackApi {
    async fn send_message(&self, channel: &str, text: &str) -> Result<()> {
        self.post_message(channel, text).await
    }

    async fn send_file(&self, channel: &str, comment: &str, content: &str) -> Result<()> {
        self.upload_file(channel, comment, content).await
    }

    async fn user_name(&self, user_id: &str) -> Result<String> {
        let info: UserInfo = self.call("users.info", &[("user", user_id)]).await?;
        Ok(info.user.name)
    }

    async fn channel_name(&self, channel_id: &str) -> Result<String> {
        let info: ChannelInfo = self
            .call("conversations.info", &[("channel", channel_id)])
            .await?;
        Ok(info.channel.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_ok() {
        let json = r#"{"ok": true, "url": "https://x.slack.com/", "user_id": "UBOT"}"#;
        let envelope: Envelope<AuthTest> = serde_json::from_str(json).unwrap();
        assert_eq!(into_result(envelope, "auth.test").unwrap().user_id, "UBOT");
    }

    #[test]
    fn test_envelope_error() {
        let json = r#"{"ok": false, "error": "channel_not_found"}"#;
        let envelope: Envelope<Empty> = serde_json::from_str(json).unwrap();
        let err = into_result(envelope, "chat.postMessage").unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[test]
    fn test_history_message_fields() {
        let json = r#"{"ok": true, "messages": [
            {"type": "message", "user": "U1", "text": "<@UBOT> help", "ts": "1700000000.000200"},
            {"type": "message", "subtype": "channel_join", "user": "U2", "text": "joined", "ts": "1700000000.000100"}
        ]}"#;
        let envelope: Envelope<History> = serde_json::from_str(json).unwrap();
        let history = into_result(envelope, "conversations.history").unwrap();
        assert_eq!(history.messages.len(), 2);
        assert_eq!(history.messages[0].user.as_deref(), Some("U1"));
        assert_eq!(history.messages[1].subtype.as_deref(), Some("channel_join"));
        assert!(!history.has_more);
        assert_eq!(history.next_cursor(), None);
    }

    #[test]
    fn test_history_next_cursor() {
        let json = r#"{"ok": true, "messages": [], "has_more": true,
            "response_metadata": {"next_cursor": "bmV4dF90czoxNzAw"}}"#;
        let envelope: Envelope<History> = serde_json::from_str(json).unwrap();
        let history = into_result(envelope, "conversations.history").unwrap();
        assert!(history.has_more);
        assert_eq!(history.next_cursor(), Some("bmV4dF90czoxNzAw"));

        let json = r#"{"ok": true, "messages": [], "response_metadata": {"next_cursor": ""}}"#;
        let envelope: Envelope<History> = serde_json::from_str(json).unwrap();
        let history = into_result(envelope, "conversations.history").unwrap();
        assert_eq!(history.next_cursor(), None);
    }
}
