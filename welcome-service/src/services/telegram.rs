use crate::services::transport::{
    ChatMetadata, Keyboard, KeyboardButton, MessageRef, OutgoingContent, Transport, TransportError,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

/// Telegram Bot API client. Thin wrapper over reqwest; every call goes
/// through the standard `{ok, result, description}` envelope.
#[derive(Clone)]
pub struct TelegramApi {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramApi {
    pub fn new(api_base: &str, bot_token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(65))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
        }
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Value, TransportError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self.client.post(&url).json(&payload).send().await?;
        let envelope: ApiEnvelope = response.json().await?;

        if envelope.ok {
            return Ok(envelope.result.unwrap_or(Value::Null));
        }

        let description = envelope.description.unwrap_or_default();
        let lowered = description.to_lowercase();
        if lowered.contains("can't parse entities") {
            Err(TransportError::UnparseableMarkup)
        } else if lowered.contains("message is not modified") {
            Err(TransportError::NotModified)
        } else {
            Err(TransportError::Rejected(description))
        }
    }

    pub async fn get_me(&self) -> Result<TgUser, TransportError> {
        let result = self.call("getMe", json!({})).await?;
        serde_json::from_value(result)
            .map_err(|e| TransportError::Rejected(format!("malformed getMe result: {}", e)))
    }

    /// Long-poll for updates. `offset` must be one past the last handled
    /// update id.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let result = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": timeout_secs,
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;
        serde_json::from_value(result)
            .map_err(|e| TransportError::Rejected(format!("malformed updates: {}", e)))
    }

    fn keyboard_json(keyboard: &Keyboard) -> Value {
        let rows: Vec<Vec<Value>> = keyboard
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| match button {
                        KeyboardButton::Url { text, url } => {
                            json!({ "text": text, "url": url })
                        }
                        KeyboardButton::Callback { text, data } => {
                            json!({ "text": text, "callback_data": data })
                        }
                    })
                    .collect()
            })
            .collect();
        json!({ "inline_keyboard": rows })
    }

    fn apply_common(payload: &mut Value, content: &OutgoingContent) {
        if content.format_mode.is_structured() {
            payload["parse_mode"] = json!(content.format_mode.as_str());
        }
        if let Some(keyboard) = &content.keyboard {
            payload["reply_markup"] = Self::keyboard_json(keyboard);
        }
        if let Some(thread_id) = content.thread_id {
            payload["message_thread_id"] = json!(thread_id);
        }
    }
}

#[async_trait]
impl Transport for TelegramApi {
    async fn send_content(
        &self,
        chat_id: i64,
        content: &OutgoingContent,
    ) -> Result<MessageRef, TransportError> {
        let (method, mut payload) = match &content.image_url {
            Some(image) => (
                "sendPhoto",
                json!({ "chat_id": chat_id, "photo": image, "caption": content.body }),
            ),
            None => (
                "sendMessage",
                json!({ "chat_id": chat_id, "text": content.body }),
            ),
        };
        Self::apply_common(&mut payload, content);

        let result = self.call(method, payload).await?;
        let message_id = result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| TransportError::Rejected("missing message_id".to_string()))?;
        Ok(MessageRef {
            chat_id,
            message_id,
            has_image: content.image_url.is_some(),
        })
    }

    async fn edit_content(
        &self,
        message: &MessageRef,
        content: &OutgoingContent,
    ) -> Result<(), TransportError> {
        let (method, mut payload) = if message.has_image {
            (
                "editMessageCaption",
                json!({
                    "chat_id": message.chat_id,
                    "message_id": message.message_id,
                    "caption": content.body,
                }),
            )
        } else {
            (
                "editMessageText",
                json!({
                    "chat_id": message.chat_id,
                    "message_id": message.message_id,
                    "text": content.body,
                }),
            )
        };
        Self::apply_common(&mut payload, content);
        self.call(method, payload).await?;
        Ok(())
    }

    async fn answer_interaction(
        &self,
        interaction_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), TransportError> {
        let mut payload = json!({ "callback_query_id": interaction_id, "show_alert": alert });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        self.call("answerCallbackQuery", payload).await?;
        Ok(())
    }

    async fn get_chat_metadata(&self, chat_id: i64) -> Result<ChatMetadata, TransportError> {
        let chat = self.call("getChat", json!({ "chat_id": chat_id })).await?;
        // Member count is best-effort; a failure never blocks metadata.
        let member_count = self
            .call("getChatMemberCount", json!({ "chat_id": chat_id }))
            .await
            .ok()
            .and_then(|v| v.as_i64());

        Ok(ChatMetadata {
            title: chat
                .get("title")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
            member_count,
            has_topics: chat
                .get("is_forum")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

// Inbound wire types, reduced to the fields the dispatcher consumes.

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: TgChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub new_chat_members: Option<Vec<TgUser>>,
    #[serde(default)]
    pub left_chat_member: Option<TgUser>,
    #[serde(default)]
    pub message_thread_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub is_forum: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}
