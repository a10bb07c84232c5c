use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::DiscordConfig;
use crate::plugins::traits::{DeliveryReceipt, Notifier, StockNotification};
use crate::utils::error::{AppError, DeliveryError};

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
}

/// Sends restock alerts as Discord direct messages through the bot REST API.
pub struct DiscordNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig) -> Result<Self, AppError> {
        let bot_token = config
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Validation("Discord bot token is not configured".to_string()))?
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(DiscordNotifier {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token,
        })
    }

    fn render_message(&self, notification: &StockNotification) -> String {
        format!(
            "🎉 **PRODUCT NOW IN STOCK!**\n\n**{}**\nStore: {}\n{}\n\nHurry and grab it before it's gone!",
            notification.display_name, notification.store_number, notification.url
        )
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, DeliveryError> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.bot_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, notification: &StockNotification) -> Result<DeliveryReceipt, DeliveryError> {
        let channel: ChannelResponse = self
            .post("/users/@me/channels", json!({ "recipient_id": notification.user_id }))
            .await?;

        let message: MessageResponse = self
            .post(
                &format!("/channels/{}/messages", channel.id),
                json!({ "content": self.render_message(notification) }),
            )
            .await?;

        tracing::debug!(
            "Delivered restock DM to user {} for item {} (message {})",
            notification.user_id,
            notification.item_id,
            message.id
        );

        Ok(DeliveryReceipt {
            message_id: Some(message.id),
        })
    }
}
