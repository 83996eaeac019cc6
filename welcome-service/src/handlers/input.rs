use crate::handlers::BotContext;
use crate::models::{Command, FormatMode};
use crate::services::telegram::IncomingMessage;
use crate::services::transport::{Keyboard, KeyboardButton, OutgoingContent};
use crate::services::wizard::WizardStage;
use service_core::error::AppError;

/// Handles a plain message. Only admin messages that continue an in-flight
/// wizard are consumed; everything else (plus the `/welcome` command) is
/// routed here too.
pub async fn handle_message(ctx: &BotContext, message: &IncomingMessage) -> Result<(), AppError> {
    let Some(from) = message.from.as_ref() else {
        return Ok(());
    };
    if !ctx.is_admin(from.id) {
        return Ok(());
    }

    if message
        .text
        .as_deref()
        .is_some_and(|t| t.trim() == "/welcome" || t.trim().starts_with("/welcome@"))
    {
        return send_config_entry(ctx, message.chat.id).await;
    }

    let Some(stage) = ctx.sessions.current(from.id) else {
        return Ok(());
    };
    let chat_id = message.chat.id;
    let text = message.text.as_deref().map(str::trim);

    if text.is_some_and(|t| t.eq_ignore_ascii_case("cancel")) {
        ctx.sessions.finish(from.id);
        ctx.delivery.send_text(chat_id, "Cancelled.").await?;
        return Ok(());
    }

    match stage {
        WizardStage::AwaitingButtonLabel { node_id } => {
            let Some(label) = non_empty(text) else {
                return nudge(ctx, chat_id, "Send a text label for the button.").await;
            };
            ctx.sessions.advance(
                from.id,
                WizardStage::AwaitingButtonUrl {
                    node_id,
                    label: label.to_string(),
                },
            );
            ctx.delivery
                .send_text(chat_id, "Now send the URL the button should open.")
                .await?;
        }
        WizardStage::AwaitingButtonUrl { node_id, label } => {
            let Some(url) = non_empty(text) else {
                return nudge(ctx, chat_id, "Send the URL as text.").await;
            };
            ctx.editor.add_link_button(node_id, &label, url).await?;
            ctx.sessions.finish(from.id);
            ctx.delivery
                .send_text(chat_id, &format!("Button \"{}\" added.", label))
                .await?;
        }

        WizardStage::AwaitingSubmenuLabel { node_id } => {
            let Some(label) = non_empty(text) else {
                return nudge(ctx, chat_id, "Send a text label for the submenu.").await;
            };
            ctx.sessions.advance(
                from.id,
                WizardStage::AwaitingSubmenuBody {
                    node_id,
                    label: label.to_string(),
                },
            );
            ctx.delivery
                .send_text(chat_id, "Now send the text shown inside the submenu.")
                .await?;
        }
        WizardStage::AwaitingSubmenuBody { node_id, label } => {
            let Some(body) = non_empty(text) else {
                return nudge(ctx, chat_id, "Send the submenu text.").await;
            };
            // New sections inherit the parent's format mode.
            let mode = ctx
                .store
                .get_node(node_id)
                .await?
                .map(|n| n.format_mode)
                .unwrap_or(FormatMode::Html);
            ctx.editor.add_child(node_id, &label, body, mode).await?;
            ctx.sessions.finish(from.id);
            ctx.delivery
                .send_text(chat_id, &format!("Submenu \"{}\" created.", label))
                .await?;
        }

        WizardStage::AwaitingImage { node_id } => {
            if let Some(photo) = message.photo.as_ref().and_then(|sizes| sizes.last()) {
                ctx.editor.set_image(node_id, Some(&photo.file_id)).await?;
                ctx.sessions.finish(from.id);
                ctx.delivery.send_text(chat_id, "Image updated.").await?;
            } else if text.is_some_and(|t| t.eq_ignore_ascii_case("remove")) {
                ctx.editor.set_image(node_id, None).await?;
                ctx.sessions.finish(from.id);
                ctx.delivery.send_text(chat_id, "Image removed.").await?;
            } else if let Some(url) = non_empty(text) {
                ctx.editor.set_image(node_id, Some(url)).await?;
                ctx.sessions.finish(from.id);
                ctx.delivery.send_text(chat_id, "Image updated.").await?;
            } else {
                return nudge(ctx, chat_id, "Send a photo, an image URL, or `remove`.").await;
            }
        }

        WizardStage::AwaitingRename { node_id } => {
            let Some(body) = non_empty(text) else {
                return nudge(ctx, chat_id, "Send the new text.").await;
            };
            ctx.editor.rename_node(node_id, body).await?;
            ctx.sessions.finish(from.id);
            ctx.delivery.send_text(chat_id, "Text updated.").await?;
        }

        WizardStage::AwaitingWelcomeBody { chat_id: target_chat } => {
            let Some(body) = non_empty(text) else {
                return nudge(ctx, chat_id, "Send the new welcome message as text.").await;
            };
            // Settings and the root node body stay in lockstep.
            ctx.registry.update_welcome_message(target_chat, body).await?;
            let root = ctx.store.get_root(target_chat).await?;
            ctx.store.update_text(root.id, body).await?;
            ctx.sessions.finish(from.id);

            let followup = OutgoingContent::text("Welcome message updated.").with_keyboard(
                Keyboard {
                    rows: vec![vec![KeyboardButton::Callback {
                        text: "🔘 Manage buttons".to_string(),
                        data: Command::ManageButtons { chat_id: target_chat }.encode(),
                    }]],
                },
            );
            ctx.delivery
                .transport()
                .send_content(chat_id, &followup)
                .await
                .map_err(|e| AppError::DeliveryFailed(anyhow::anyhow!(e)))?;
        }
    }

    Ok(())
}

async fn send_config_entry(ctx: &BotContext, chat_id: i64) -> Result<(), AppError> {
    let content = OutgoingContent::text("Welcome configuration:").with_keyboard(Keyboard {
        rows: vec![vec![KeyboardButton::Callback {
            text: "⚙️ Open settings".to_string(),
            data: Command::WelcomeConfig { chat_id }.encode(),
        }]],
    });
    ctx.delivery
        .transport()
        .send_content(chat_id, &content)
        .await
        .map_err(|e| AppError::DeliveryFailed(anyhow::anyhow!(e)))?;
    Ok(())
}

async fn nudge(ctx: &BotContext, chat_id: i64, text: &str) -> Result<(), AppError> {
    ctx.delivery.send_text(chat_id, text).await?;
    Ok(())
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.is_empty())
}
