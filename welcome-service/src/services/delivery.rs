use crate::models::{ContentNode, FormatMode};
use crate::services::render::{self, Viewer};
use crate::services::transport::{MessageRef, OutgoingContent, Transport, TransportError};
use service_core::error::AppError;
use std::sync::Arc;

/// Delivery layer over the transport. Applies the format-fallback contract:
/// when structured markup is rejected as unparseable, the node is re-rendered
/// in plain mode and retried exactly once.
#[derive(Clone)]
pub struct Delivery {
    transport: Arc<dyn Transport>,
}

impl Delivery {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn content_for(node: &ContentNode, rendered: render::Rendered, thread_id: Option<i64>) -> OutgoingContent {
        OutgoingContent {
            body: rendered.body,
            image_url: node.image_url.clone(),
            keyboard: rendered.keyboard,
            format_mode: rendered.format_mode,
            thread_id,
        }
    }

    /// Sends a node rendered for `viewer` as a new message.
    pub async fn send_node(
        &self,
        chat_id: i64,
        node: &ContentNode,
        viewer: &Viewer,
        group_name: &str,
        thread_id: Option<i64>,
    ) -> Result<MessageRef, AppError> {
        let rendered = render::render(node, viewer, group_name);
        let content = Self::content_for(node, rendered, thread_id);

        match self.transport.send_content(chat_id, &content).await {
            Ok(message) => Ok(message),
            Err(TransportError::UnparseableMarkup) => {
                tracing::warn!(
                    node_id = node.id,
                    chat_id,
                    "Markup rejected, retrying in plain mode"
                );
                let plain = render::render_as(node, viewer, group_name, FormatMode::Plain);
                let content = Self::content_for(node, plain, thread_id);
                self.transport
                    .send_content(chat_id, &content)
                    .await
                    .map_err(|e| AppError::DeliveryFailed(anyhow::anyhow!(e)))
            }
            Err(e) => Err(AppError::DeliveryFailed(anyhow::anyhow!(e))),
        }
    }

    /// Edits an existing message in place to show `node` (book-mode
    /// navigation). `NotModified` counts as success.
    pub async fn edit_node(
        &self,
        message: &MessageRef,
        node: &ContentNode,
        viewer: &Viewer,
        group_name: &str,
    ) -> Result<(), AppError> {
        let rendered = render::render(node, viewer, group_name);
        let content = Self::content_for(node, rendered, None);

        match self.transport.edit_content(message, &content).await {
            Ok(()) | Err(TransportError::NotModified) => Ok(()),
            Err(TransportError::UnparseableMarkup) => {
                tracing::warn!(
                    node_id = node.id,
                    chat_id = message.chat_id,
                    "Markup rejected on edit, retrying in plain mode"
                );
                let plain = render::render_as(node, viewer, group_name, FormatMode::Plain);
                let content = Self::content_for(node, plain, None);
                match self.transport.edit_content(message, &content).await {
                    Ok(()) | Err(TransportError::NotModified) => Ok(()),
                    Err(e) => Err(AppError::DeliveryFailed(anyhow::anyhow!(e))),
                }
            }
            Err(e) => Err(AppError::DeliveryFailed(anyhow::anyhow!(e))),
        }
    }

    /// Plain confirmation/prompt text, no fallback needed.
    pub async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef, AppError> {
        self.transport
            .send_content(chat_id, &OutgoingContent::text(text))
            .await
            .map_err(|e| AppError::DeliveryFailed(anyhow::anyhow!(e)))
    }
}
