pub mod callback;
pub mod input;
pub mod member;

use crate::services::telegram::Update;
use crate::services::{ChatRegistry, Delivery, NodeStore, TreeEditor, WizardSessions};
use std::sync::Arc;

/// Everything a handler needs to act on one update. Cheap to clone; shared
/// state sits behind `Arc`s.
#[derive(Clone)]
pub struct BotContext {
    pub admin_id: i64,
    /// The bot's own account id, used to tell "bot added to group" apart
    /// from ordinary member joins.
    pub bot_id: i64,
    pub store: Arc<dyn NodeStore>,
    pub registry: Arc<dyn ChatRegistry>,
    pub editor: TreeEditor,
    pub delivery: Delivery,
    pub sessions: Arc<WizardSessions>,
}

impl BotContext {
    pub fn is_admin(&self, user_id: i64) -> bool {
        user_id == self.admin_id
    }
}

pub(crate) fn viewer_of(user: &crate::services::telegram::TgUser) -> crate::services::Viewer {
    crate::services::Viewer {
        id: Some(user.id),
        name: Some(user.first_name.clone()),
        username: user.username.clone(),
    }
}

/// Classifies one update and routes it. Handler errors are logged here and
/// never abort the polling loop.
pub async fn dispatch_update(ctx: &BotContext, update: Update) {
    let update_id = update.update_id;
    let result = if let Some(query) = update.callback_query {
        callback::handle_callback(ctx, &query).await
    } else if let Some(message) = update.message {
        if message
            .new_chat_members
            .as_ref()
            .is_some_and(|m| !m.is_empty())
        {
            member::handle_new_members(ctx, &message).await
        } else if message.left_chat_member.is_some() {
            member::handle_member_left(ctx, &message).await
        } else {
            input::handle_message(ctx, &message).await
        }
    } else {
        Ok(())
    };

    if let Err(e) = result {
        tracing::error!(update_id, error = %e, "Failed to handle update");
    }
}
