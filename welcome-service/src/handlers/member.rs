use crate::handlers::{BotContext, viewer_of};
use crate::models::{Command, GroupRecord};
use crate::services::telegram::{IncomingMessage, TgUser};
use crate::services::transport::{Keyboard, KeyboardButton, OutgoingContent};
use chrono::Utc;
use service_core::error::AppError;

/// Handles a `new_chat_members` service message: registers the group when
/// the bot itself was added, welcomes every human member otherwise.
pub async fn handle_new_members(
    ctx: &BotContext,
    message: &IncomingMessage,
) -> Result<(), AppError> {
    let members = message.new_chat_members.as_deref().unwrap_or_default();

    for member in members {
        if member.id == ctx.bot_id {
            register_group(ctx, message).await?;
        } else if !member.is_bot {
            welcome_member(ctx, message, member).await?;
        }
    }
    Ok(())
}

/// Marks the group inactive when the bot itself is removed.
pub async fn handle_member_left(
    ctx: &BotContext,
    message: &IncomingMessage,
) -> Result<(), AppError> {
    if message
        .left_chat_member
        .as_ref()
        .is_some_and(|u| u.id == ctx.bot_id)
    {
        ctx.registry.deactivate_group(message.chat.id).await?;
        tracing::info!(chat_id = message.chat.id, "Bot removed, group deactivated");
    }
    Ok(())
}

async fn register_group(ctx: &BotContext, message: &IncomingMessage) -> Result<(), AppError> {
    let chat_id = message.chat.id;
    let metadata = ctx
        .delivery
        .transport()
        .get_chat_metadata(chat_id)
        .await
        .unwrap_or_default();

    let added_by = message.from.as_ref();
    let group = GroupRecord {
        chat_id,
        title: metadata
            .title
            .or_else(|| message.chat.title.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        kind: Some(message.chat.kind.clone()),
        added_by: added_by.map(|u| u.id),
        added_by_username: added_by.and_then(|u| u.username.clone()),
        added_by_name: added_by.map(|u| u.first_name.clone()),
        member_count: metadata.member_count,
        added_date: Utc::now(),
        active: true,
        is_forum: metadata.has_topics || message.chat.is_forum.unwrap_or(false),
        welcome_thread_id: None,
    };
    ctx.registry.upsert_group(&group).await?;
    tracing::info!(chat_id, title = %group.title, "Registered group");

    let intro = OutgoingContent::text(
        "Hi! I will greet new members here. Admins can configure the welcome below.",
    )
    .with_keyboard(Keyboard {
        rows: vec![vec![KeyboardButton::Callback {
            text: "⚙️ Configure welcome".to_string(),
            data: Command::WelcomeConfig { chat_id }.encode(),
        }]],
    });
    ctx.delivery
        .transport()
        .send_content(chat_id, &intro)
        .await
        .map_err(|e| AppError::DeliveryFailed(anyhow::anyhow!(e)))?;
    Ok(())
}

async fn welcome_member(
    ctx: &BotContext,
    message: &IncomingMessage,
    member: &TgUser,
) -> Result<(), AppError> {
    let chat_id = message.chat.id;

    let enabled = ctx
        .registry
        .welcome_settings(chat_id)
        .await?
        .map(|s| s.enabled)
        .unwrap_or(true);
    if !enabled {
        tracing::debug!(chat_id, "Welcome disabled, skipping");
        return Ok(());
    }

    let group = ctx.registry.get_group(chat_id).await?;
    let group_name = message
        .chat
        .title
        .clone()
        .or_else(|| group.as_ref().map(|g| g.title.clone()))
        .unwrap_or_else(|| "this group".to_string());

    // Keep the registry fresh from the live event: renamed chats and the
    // forum topic join events arrive in.
    if let (Some(group), Some(live_title)) = (group.as_ref(), message.chat.title.as_deref()) {
        if group.title != live_title {
            ctx.registry
                .update_group_info(chat_id, live_title, None, message.chat.is_forum)
                .await?;
        }
    }
    // The configured welcome thread always wins; the live event thread is
    // only adopted (and remembered) while no thread is configured yet.
    let mut thread_id = group.as_ref().and_then(|g| g.welcome_thread_id);
    if thread_id.is_none() && group.as_ref().is_some_and(|g| g.is_forum) {
        if let Some(live_thread) = message.message_thread_id {
            ctx.registry
                .set_welcome_thread(chat_id, Some(live_thread))
                .await?;
            thread_id = Some(live_thread);
        }
    }

    let root = ctx.store.get_root(chat_id).await?;
    let viewer = viewer_of(member);
    ctx.delivery
        .send_node(chat_id, &root, &viewer, &group_name, thread_id)
        .await?;
    ctx.registry.record_welcome_sent(chat_id).await?;
    tracing::info!(chat_id, member_id = member.id, "Welcomed new member");
    Ok(())
}
