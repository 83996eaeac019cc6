use crate::handlers::{BotContext, viewer_of};
use crate::models::{Button, Command, ContentNode, FormatMode};
use crate::services::editor::SubtreeDeletion;
use crate::services::telegram::CallbackQuery;
use crate::services::transport::{Keyboard, KeyboardButton, MessageRef, OutgoingContent};
use crate::services::wizard::WizardStage;
use chrono::Utc;
use service_core::error::AppError;

/// Handles one callback interaction. The payload is decoded exactly once;
/// unknown payloads are logged and acknowledged without any state change.
pub async fn handle_callback(ctx: &BotContext, query: &CallbackQuery) -> Result<(), AppError> {
    let transport = ctx.delivery.transport();

    let Some(data) = query.data.as_deref() else {
        transport.answer_interaction(&query.id, None, false).await.ok();
        return Ok(());
    };
    let Some(command) = Command::decode(data) else {
        tracing::warn!(payload = data, "Ignoring unknown callback payload");
        transport.answer_interaction(&query.id, None, false).await.ok();
        return Ok(());
    };

    if !command.is_public() && !ctx.is_admin(query.from.id) {
        transport
            .answer_interaction(&query.id, Some("Admins only"), true)
            .await
            .ok();
        return Ok(());
    }

    let message = query.message.as_ref().map(|m| MessageRef {
        chat_id: m.chat.id,
        message_id: m.message_id,
        has_image: m.photo.is_some(),
    });
    let origin_chat = message.as_ref().map(|m| m.chat_id);

    let mut answer: Option<String> = None;
    let mut alert = false;

    match command {
        Command::Navigate { node_id } => {
            if let Some(node) = ctx.store.get_node(node_id).await? {
                show_node(ctx, query, message.as_ref(), &node).await?;
            } else {
                answer = Some("This section no longer exists".to_string());
                alert = true;
            }
        }
        Command::NavigateHome { chat_id } => {
            let root = ctx.store.get_root(chat_id).await?;
            show_node(ctx, query, message.as_ref(), &root).await?;
        }

        Command::NodeManager { chat_id, node_id } => {
            let node = match node_id {
                Some(id) => ctx.store.get_node(id).await?,
                None => Some(ctx.store.get_root(chat_id).await?),
            };
            match node {
                Some(node) => show_screen(ctx, message.as_ref(), manager_screen(&node)).await?,
                None => {
                    answer = Some("Node not found".to_string());
                    alert = true;
                }
            }
        }
        Command::ListChildren { chat_id, node_id } => {
            let children = ctx.store.get_children(chat_id, node_id).await?;
            let screen = children_screen(chat_id, node_id, &children);
            show_screen(ctx, message.as_ref(), screen).await?;
        }
        Command::FormatSelector { node_id } => {
            let node = require_node(ctx, node_id).await?;
            show_screen(ctx, message.as_ref(), format_screen(&node)).await?;
        }
        Command::SetFormat { node_id, mode } => {
            ctx.editor.set_format_mode(node_id, mode).await?;
            answer = Some(format!("Format set to {}", mode.as_str()));
            let node = require_node(ctx, node_id).await?;
            show_screen(ctx, message.as_ref(), manager_screen(&node)).await?;
        }
        Command::ClearButtons { node_id } => {
            ctx.editor.clear_buttons(node_id).await?;
            answer = Some("Buttons cleared".to_string());
            let node = require_node(ctx, node_id).await?;
            show_screen(ctx, message.as_ref(), manager_screen(&node)).await?;
        }
        Command::DeleteSubtree { node_id } => {
            let parent_id = ctx
                .store
                .get_node(node_id)
                .await?
                .and_then(|n| n.parent_id);
            match ctx.editor.delete_subtree(node_id).await? {
                SubtreeDeletion::Deleted => {
                    answer = Some("Section deleted".to_string());
                    if let Some(parent_id) = parent_id {
                        let parent = require_node(ctx, parent_id).await?;
                        show_screen(ctx, message.as_ref(), manager_screen(&parent)).await?;
                    }
                }
                SubtreeDeletion::RootRefused => {
                    answer = Some("The root section cannot be deleted".to_string());
                    alert = true;
                }
                SubtreeDeletion::NotFound => {
                    answer = Some("Node not found".to_string());
                    alert = true;
                }
            }
        }

        Command::AddUrlButton { node_id } => {
            ctx.sessions
                .begin(query.from.id, WizardStage::AwaitingButtonLabel { node_id });
            prompt(ctx, origin_chat, "Send the button label (or `cancel`).").await?;
        }
        Command::AddSubmenu { node_id } => {
            ctx.sessions
                .begin(query.from.id, WizardStage::AwaitingSubmenuLabel { node_id });
            prompt(ctx, origin_chat, "Send the submenu label (or `cancel`).").await?;
        }
        Command::SetImage { node_id } => {
            ctx.sessions
                .begin(query.from.id, WizardStage::AwaitingImage { node_id });
            prompt(
                ctx,
                origin_chat,
                "Send a photo or an image URL, `remove` to clear, or `cancel`.",
            )
            .await?;
        }
        Command::Rename { node_id } => {
            ctx.sessions
                .begin(query.from.id, WizardStage::AwaitingRename { node_id });
            prompt(ctx, origin_chat, "Send the new text for this section (or `cancel`).").await?;
        }

        Command::WelcomeConfig { chat_id } => {
            let screen = config_screen(ctx, chat_id).await?;
            show_screen(ctx, message.as_ref(), screen).await?;
        }
        Command::EditWelcomeMessage { chat_id } => {
            ctx.sessions
                .begin(query.from.id, WizardStage::AwaitingWelcomeBody { chat_id });
            prompt(
                ctx,
                origin_chat,
                "Send the new welcome message. Placeholders: {name}, {mention}, {group_name}, {username}. (or `cancel`)",
            )
            .await?;
        }
        Command::EditWelcomeImage { chat_id } => {
            let root = ctx.store.get_root(chat_id).await?;
            ctx.sessions
                .begin(query.from.id, WizardStage::AwaitingImage { node_id: root.id });
            prompt(
                ctx,
                origin_chat,
                "Send a photo or an image URL, `remove` to clear, or `cancel`.",
            )
            .await?;
        }
        Command::ManageButtons { chat_id } => {
            let root = ctx.store.get_root(chat_id).await?;
            show_screen(ctx, message.as_ref(), manager_screen(&root)).await?;
        }
        Command::ToggleWelcome { chat_id } => {
            let enabled = ctx.registry.toggle_welcome(chat_id).await?;
            answer = Some(if enabled {
                "Welcome messages enabled".to_string()
            } else {
                "Welcome messages disabled".to_string()
            });
            let screen = config_screen(ctx, chat_id).await?;
            show_screen(ctx, message.as_ref(), screen).await?;
        }
        Command::TestWelcome { chat_id } => {
            let root = ctx.store.get_root(chat_id).await?;
            let group_name = group_title(ctx, chat_id).await;
            let viewer = viewer_of(&query.from);
            // The preview goes to the admin's private chat, not the group.
            match ctx
                .delivery
                .send_node(query.from.id, &root, &viewer, &group_name, None)
                .await
            {
                Ok(_) => answer = Some("Preview sent to your private chat".to_string()),
                Err(e) => {
                    tracing::debug!(error = %e, "Welcome preview could not be delivered");
                    answer = Some(
                        "Start a private chat with me first, then try again".to_string(),
                    );
                    alert = true;
                }
            }
        }

        Command::GroupStats { chat_id } => {
            let screen = stats_screen(ctx, chat_id).await?;
            show_screen(ctx, message.as_ref(), screen).await?;
        }
        Command::RefreshGroupInfo { chat_id } => {
            match transport.get_chat_metadata(chat_id).await {
                Ok(meta) => {
                    let title = match meta.title {
                        Some(title) => title,
                        None => group_title(ctx, chat_id).await,
                    };
                    ctx.registry
                        .update_group_info(chat_id, &title, meta.member_count, Some(meta.has_topics))
                        .await?;
                    answer = Some("Group info updated".to_string());
                }
                Err(e) => {
                    tracing::warn!(chat_id, error = %e, "Could not refresh chat metadata");
                    answer = Some("Could not fetch group info".to_string());
                    alert = true;
                }
            }
            let screen = stats_screen(ctx, chat_id).await?;
            show_screen(ctx, message.as_ref(), screen).await?;
        }
    }

    transport
        .answer_interaction(&query.id, answer.as_deref(), alert)
        .await
        .ok();
    Ok(())
}

/// Book-mode navigation: edit the existing message in place when one exists,
/// otherwise send the node fresh.
async fn show_node(
    ctx: &BotContext,
    query: &CallbackQuery,
    message: Option<&MessageRef>,
    node: &ContentNode,
) -> Result<(), AppError> {
    let viewer = viewer_of(&query.from);
    let group_name = group_title(ctx, node.chat_id).await;
    match message {
        Some(message) => ctx.delivery.edit_node(message, node, &viewer, &group_name).await,
        None => ctx
            .delivery
            .send_node(node.chat_id, node, &viewer, &group_name, None)
            .await
            .map(|_| ()),
    }
}

async fn show_screen(
    ctx: &BotContext,
    message: Option<&MessageRef>,
    screen: OutgoingContent,
) -> Result<(), AppError> {
    match message {
        // Admin screens never carry images, so an edit over a photo message
        // would target the caption and fail; resend instead.
        Some(message) if !message.has_image => {
            match ctx.delivery.transport().edit_content(message, &screen).await {
                Ok(()) | Err(crate::services::transport::TransportError::NotModified) => Ok(()),
                Err(e) => Err(AppError::DeliveryFailed(anyhow::anyhow!(e))),
            }
        }
        Some(message) => {
            ctx.delivery
                .transport()
                .send_content(message.chat_id, &screen)
                .await
                .map_err(|e| AppError::DeliveryFailed(anyhow::anyhow!(e)))?;
            Ok(())
        }
        None => Ok(()),
    }
}

async fn prompt(ctx: &BotContext, chat_id: Option<i64>, text: &str) -> Result<(), AppError> {
    if let Some(chat_id) = chat_id {
        ctx.delivery.send_text(chat_id, text).await?;
    }
    Ok(())
}

async fn require_node(ctx: &BotContext, node_id: i64) -> Result<ContentNode, AppError> {
    ctx.store
        .get_node(node_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("node {} not found", node_id)))
}

async fn group_title(ctx: &BotContext, chat_id: i64) -> String {
    match ctx.registry.get_group(chat_id).await {
        Ok(Some(group)) => group.title,
        _ => "this group".to_string(),
    }
}

/// First line of the node text, shortened for screen headers.
fn node_label(node: &ContentNode) -> String {
    let line = node.text.lines().next().unwrap_or_default();
    let label: String = line.chars().take(30).collect();
    if label.is_empty() {
        format!("#{}", node.id)
    } else {
        label
    }
}

fn callback(text: &str, command: Command) -> KeyboardButton {
    KeyboardButton::Callback {
        text: text.to_string(),
        data: command.encode(),
    }
}

fn manager_screen(node: &ContentNode) -> OutgoingContent {
    let labels: Vec<&str> = node.buttons.iter().flatten().map(Button::label).collect();
    let buttons_line = if labels.is_empty() {
        node.button_count().to_string()
    } else {
        format!("{} ({})", node.button_count(), labels.join(", "))
    };
    let body = format!(
        "Section: {}\nFormat: {}\nButtons: {}\nImage: {}",
        node_label(node),
        node.format_mode.as_str(),
        buttons_line,
        if node.image_url.is_some() { "yes" } else { "no" },
    );

    let chat_id = node.chat_id;
    let id = node.id;
    let mut rows = vec![
        vec![
            callback("➕ URL button", Command::AddUrlButton { node_id: id }),
            callback("📁 Submenu", Command::AddSubmenu { node_id: id }),
        ],
        vec![
            callback("✏️ Edit text", Command::Rename { node_id: id }),
            callback("🖼 Image", Command::SetImage { node_id: id }),
        ],
        vec![
            callback("🎨 Format", Command::FormatSelector { node_id: id }),
            callback("🧹 Clear buttons", Command::ClearButtons { node_id: id }),
        ],
        vec![
            callback("📂 Children", Command::ListChildren { chat_id, node_id: id }),
            callback("👁 Preview", Command::Navigate { node_id: id }),
        ],
    ];
    if node.is_root() {
        rows.push(vec![callback("⚙️ Welcome settings", Command::WelcomeConfig { chat_id })]);
    } else {
        rows.push(vec![
            callback("🗑 Delete section", Command::DeleteSubtree { node_id: id }),
            callback(
                "⬆️ Parent",
                Command::NodeManager {
                    chat_id,
                    node_id: node.parent_id,
                },
            ),
        ]);
    }

    OutgoingContent::text(body).with_keyboard(Keyboard { rows })
}

fn children_screen(chat_id: i64, node_id: i64, children: &[ContentNode]) -> OutgoingContent {
    let body = if children.is_empty() {
        "This section has no subsections.".to_string()
    } else {
        format!("Subsections ({}):", children.len())
    };

    let mut rows: Vec<Vec<KeyboardButton>> = children
        .iter()
        .map(|child| {
            vec![callback(
                &node_label(child),
                Command::NodeManager {
                    chat_id,
                    node_id: Some(child.id),
                },
            )]
        })
        .collect();
    rows.push(vec![callback(
        "◀️ Back",
        Command::NodeManager {
            chat_id,
            node_id: Some(node_id),
        },
    )]);

    OutgoingContent::text(body).with_keyboard(Keyboard { rows })
}

fn format_screen(node: &ContentNode) -> OutgoingContent {
    let id = node.id;
    let mark = |mode: FormatMode| {
        if node.format_mode == mode { "✅ " } else { "" }
    };
    let rows = vec![
        vec![callback(
            &format!("{}HTML", mark(FormatMode::Html)),
            Command::SetFormat { node_id: id, mode: FormatMode::Html },
        )],
        vec![callback(
            &format!("{}MarkdownV2", mark(FormatMode::MarkdownV2)),
            Command::SetFormat { node_id: id, mode: FormatMode::MarkdownV2 },
        )],
        vec![callback(
            &format!("{}Plain", mark(FormatMode::Plain)),
            Command::SetFormat { node_id: id, mode: FormatMode::Plain },
        )],
        vec![callback(
            "◀️ Back",
            Command::NodeManager {
                chat_id: node.chat_id,
                node_id: Some(id),
            },
        )],
    ];

    OutgoingContent::text("Choose the text format for this section:")
        .with_keyboard(Keyboard { rows })
}

async fn config_screen(ctx: &BotContext, chat_id: i64) -> Result<OutgoingContent, AppError> {
    let settings = ctx.registry.welcome_settings(chat_id).await?;
    let enabled = settings.as_ref().map(|s| s.enabled).unwrap_or(true);
    let root = ctx.store.get_root(chat_id).await?;

    let body = format!(
        "Welcome settings\nStatus: {}\nFormat: {}\nButtons on root: {}\n\nCurrent message:\n{}",
        if enabled { "enabled ✅" } else { "disabled ⛔" },
        root.format_mode.as_str(),
        root.button_count(),
        root.text,
    );

    let rows = vec![
        vec![callback("✏️ Edit message", Command::EditWelcomeMessage { chat_id })],
        vec![
            callback("🖼 Edit image", Command::EditWelcomeImage { chat_id }),
            callback("🔘 Manage buttons", Command::ManageButtons { chat_id }),
        ],
        vec![
            callback(
                if enabled { "⛔ Disable" } else { "✅ Enable" },
                Command::ToggleWelcome { chat_id },
            ),
            callback("🧪 Test", Command::TestWelcome { chat_id }),
        ],
        vec![callback("📊 Stats", Command::GroupStats { chat_id })],
    ];

    Ok(OutgoingContent::text(body).with_keyboard(Keyboard { rows }))
}

async fn stats_screen(ctx: &BotContext, chat_id: i64) -> Result<OutgoingContent, AppError> {
    let group = ctx.registry.get_group(chat_id).await?;
    let stats = ctx.registry.group_stats(chat_id).await?;

    let title = group
        .as_ref()
        .map(|g| g.title.clone())
        .unwrap_or_else(|| "this group".to_string());
    let members = group
        .as_ref()
        .and_then(|g| g.member_count)
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let days_active = group
        .as_ref()
        .map(|g| (Utc::now() - g.added_date).num_days())
        .unwrap_or(0);
    let welcomes_sent = stats.as_ref().map(|s| s.welcomes_sent).unwrap_or(0);
    let last_activity = stats
        .as_ref()
        .map(|s| s.last_activity.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());

    let body = format!(
        "📊 {}\nMembers: {}\nDays active: {}\nWelcomes sent: {}\nLast activity: {}",
        title, members, days_active, welcomes_sent, last_activity,
    );

    let rows = vec![
        vec![callback("🔄 Refresh info", Command::RefreshGroupInfo { chat_id })],
        vec![callback("◀️ Back", Command::WelcomeConfig { chat_id })],
    ];

    Ok(OutgoingContent::text(body).with_keyboard(Keyboard { rows }))
}
