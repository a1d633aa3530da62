//! Telegram channel adapter using the Bot HTTP API.

use crate::channel::traits::{ChannelAdapter, ChannelCommand};
use crate::config::ChannelConfig;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::debug;

/// Long-poll timeout for `getUpdates` (seconds).
const POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    chat: ChatRef,
    from: Option<UserRef>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatRef {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct UserRef {
    id: i64,
}

/// Telegram channel adapter: REST sends plus a `getUpdates` poll loop.
pub struct TelegramAdapter {
    bot_token: String,
    api_base: String,
    allowed_user_ids: Vec<String>,
    client: reqwest::Client,
}

impl TelegramAdapter {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            api_base: config.api_base.clone(),
            allowed_user_ids: config.allowed_user_ids.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// An empty allowlist admits everyone; filtering is opt-in.
    fn is_sender_allowed(&self, user_id: &str) -> bool {
        if self.allowed_user_ids.is_empty() {
            return true;
        }
        self.allowed_user_ids
            .iter()
            .any(|u| u == "*" || u.as_str() == user_id)
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> anyhow::Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("telegram {method} failed ({status}): {body}");
        }

        let parsed: ApiResponse<T> = response.json().await?;
        if !parsed.ok {
            anyhow::bail!(
                "telegram {method} rejected: {}",
                parsed.description.unwrap_or_default()
            );
        }
        parsed
            .result
            .ok_or_else(|| anyhow::anyhow!("telegram {method} returned no result"))
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn id(&self) -> &'static str {
        "telegram"
    }

    async fn send_text(&self, target: &str, text: &str) -> anyhow::Result<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": target,
                    "text": text,
                }),
            )
            .await?;
        Ok(())
    }

    async fn send_image(&self, target: &str, image: &Path) -> anyhow::Result<()> {
        let bytes = tokio::fs::read(image)
            .await
            .with_context(|| format!("cannot read image '{}'", image.display()))?;
        let file_name = image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_owned();

        let form = reqwest::multipart::Form::new()
            .text("chat_id", target.to_owned())
            .part(
                "photo",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("telegram sendPhoto failed ({status}): {body}");
        }
        Ok(())
    }

    async fn run(&self, inbound_tx: mpsc::Sender<ChannelCommand>) -> anyhow::Result<()> {
        if self.bot_token.trim().is_empty() {
            anyhow::bail!("telegram bot token is empty");
        }

        let mut offset: i64 = 0;
        loop {
            let updates: Vec<Update> = self
                .call(
                    "getUpdates",
                    json!({
                        "offset": offset,
                        "timeout": POLL_TIMEOUT_SECS,
                        "allowed_updates": ["message"],
                    }),
                )
                .await?;

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    continue;
                };
                let Some(text) = message.text else { continue };
                let sender = message.from.map(|u| u.id.to_string()).unwrap_or_default();
                if !self.is_sender_allowed(&sender) {
                    debug!("ignoring command from disallowed sender {sender}");
                    continue;
                }

                let command = ChannelCommand {
                    sender,
                    reply_target: message.chat.id.to_string(),
                    text,
                };
                if inbound_tx.send(command).await.is_err() {
                    debug!("inbound command receiver closed, stopping poll loop");
                    return Ok(());
                }
            }
        }
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        let me: serde_json::Value = self.call("getMe", json!({})).await?;
        Ok(me.get("id").is_some())
    }
}
