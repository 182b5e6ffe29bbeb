use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::types::{MessageId, Update, User};
use super::{Messenger, TelegramError};

/// Envelope every Bot API method responds with.
#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// Bot API client over HTTPS.
pub struct BotApi {
    client: Client,
    /// `{api_url}/bot{token}`. Never logged.
    base_url: String,
}

impl BotApi {
    pub fn new(client: Client, api_url: &str, token: &str) -> Self {
        Self {
            client,
            base_url: format!("{}/bot{token}", api_url.trim_end_matches('/')),
        }
    }

    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &json!({}), None).await
    }

    /// Long-poll for updates after `offset`, waiting up to `timeout_secs`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let mut params = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "channel_post"],
        });
        if let Some(offset) = offset {
            params["offset"] = offset.into();
        }
        // Leave room for the server to hold the connection open
        let request_timeout = Duration::from_secs(timeout_secs + 10);
        self.call("getUpdates", &params, Some(request_timeout)).await
    }

    pub async fn set_webhook(&self, url: &str) -> Result<(), TelegramError> {
        let params = json!({
            "url": url,
            "allowed_updates": ["message", "channel_post"],
        });
        let _: bool = self.call("setWebhook", &params, None).await?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<(), TelegramError> {
        let _: bool = self
            .call("deleteWebhook", &json!({"drop_pending_updates": false}), None)
            .await?;
        Ok(())
    }

    async fn call<P, R>(
        &self,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<R, TelegramError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // Errors carry the request URL, which embeds the token
        let resp = request.send().await.map_err(|e| e.without_url())?;
        let status = resp.status();
        let body: ApiResponse<R> = resp.json().await.map_err(|e| e.without_url())?;

        match (body.ok, body.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TelegramError::Api {
                code: body.error_code.unwrap_or(i64::from(status.as_u16())),
                description: body
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }
}

#[async_trait]
impl Messenger for BotApi {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let params = json!({
            "chat_id": chat_id,
            "text": text,
        });
        let _: serde_json::Value = self.call("sendMessage", &params, None).await?;
        Ok(())
    }

    async fn copy_message(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
        protect_content: bool,
    ) -> Result<i64, TelegramError> {
        let params = json!({
            "chat_id": chat_id,
            "from_chat_id": from_chat_id,
            "message_id": message_id,
            "protect_content": protect_content,
        });
        let copied: MessageId = self.call("copyMessage", &params, None).await?;
        Ok(copied.message_id)
    }
}
