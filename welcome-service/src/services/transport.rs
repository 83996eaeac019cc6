use crate::models::FormatMode;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not parse the structured markup of the body.
    /// Callers recover by re-rendering in plain mode exactly once.
    #[error("transport rejected the markup as unparseable")]
    UnparseableMarkup,

    /// Editing produced no change; treated as success by callers.
    #[error("content is already up to date")]
    NotModified,

    #[error("transport rejected the request: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// One rendered button as the platform sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyboardButton {
    Url { text: String, url: String },
    Callback { text: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<KeyboardButton>>,
}

/// Viewer-facing content ready for delivery.
#[derive(Debug, Clone)]
pub struct OutgoingContent {
    pub body: String,
    pub image_url: Option<String>,
    pub keyboard: Option<Keyboard>,
    pub format_mode: FormatMode,
    pub thread_id: Option<i64>,
}

impl OutgoingContent {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            image_url: None,
            keyboard: None,
            format_mode: FormatMode::Plain,
            thread_id: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Reference to a delivered message, used for subsequent edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
    /// Whether the referenced message carries an image (edits must target
    /// the caption rather than the text).
    pub has_image: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ChatMetadata {
    pub title: Option<String>,
    pub member_count: Option<i64>,
    pub has_topics: bool,
}

/// Messaging-platform client seam. The production implementation talks to
/// the Telegram Bot API; tests use [`MockTransport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_content(
        &self,
        chat_id: i64,
        content: &OutgoingContent,
    ) -> Result<MessageRef, TransportError>;

    async fn edit_content(
        &self,
        message: &MessageRef,
        content: &OutgoingContent,
    ) -> Result<(), TransportError>;

    async fn answer_interaction(
        &self,
        interaction_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), TransportError>;

    async fn get_chat_metadata(&self, chat_id: i64) -> Result<ChatMetadata, TransportError>;
}

/// Record of a send or edit observed by the mock.
#[derive(Debug, Clone)]
pub struct DeliveredContent {
    pub chat_id: i64,
    pub body: String,
    pub image_url: Option<String>,
    pub keyboard: Option<Keyboard>,
    pub format_mode: FormatMode,
    pub thread_id: Option<i64>,
    pub edited: bool,
}

/// Mock transport for testing: records every delivery and can be scripted
/// to reject upcoming calls.
#[derive(Default)]
pub struct MockTransport {
    deliveries: Mutex<Vec<DeliveredContent>>,
    answers: Mutex<Vec<String>>,
    scripted_failures: Mutex<VecDeque<TransportError>>,
    next_message_id: AtomicU64,
    pub metadata: Mutex<ChatMetadata>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error returned by the next send/edit call.
    pub fn fail_next(&self, error: TransportError) {
        self.scripted_failures.lock().unwrap().push_back(error);
    }

    pub fn deliveries(&self) -> Vec<DeliveredContent> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn answers(&self) -> Vec<String> {
        self.answers.lock().unwrap().clone()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    fn take_scripted_failure(&self) -> Option<TransportError> {
        self.scripted_failures.lock().unwrap().pop_front()
    }

    fn record(&self, chat_id: i64, content: &OutgoingContent, edited: bool) {
        self.deliveries.lock().unwrap().push(DeliveredContent {
            chat_id,
            body: content.body.clone(),
            image_url: content.image_url.clone(),
            keyboard: content.keyboard.clone(),
            format_mode: content.format_mode,
            thread_id: content.thread_id,
            edited,
        });
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_content(
        &self,
        chat_id: i64,
        content: &OutgoingContent,
    ) -> Result<MessageRef, TransportError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        self.record(chat_id, content, false);
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
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
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        self.record(message.chat_id, content, true);
        Ok(())
    }

    async fn answer_interaction(
        &self,
        interaction_id: &str,
        text: Option<&str>,
        _alert: bool,
    ) -> Result<(), TransportError> {
        self.answers
            .lock()
            .unwrap()
            .push(format!("{}:{}", interaction_id, text.unwrap_or("")));
        Ok(())
    }

    async fn get_chat_metadata(&self, _chat_id: i64) -> Result<ChatMetadata, TransportError> {
        Ok(self.metadata.lock().unwrap().clone())
    }
}
