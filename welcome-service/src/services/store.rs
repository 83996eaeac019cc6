use crate::config::DEFAULT_WELCOME_MESSAGE;
use crate::models::{
    ButtonRows, ContentNode, FormatMode, GroupRecord, GroupStats, RootSeed, WelcomeSettings,
};
use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

/// Repository of content nodes. Implementations must assign ids through a
/// single atomic sequence so concurrent creations never collide.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn get_node(&self, id: i64) -> Result<Option<ContentNode>, AppError>;

    /// Returns the chat's root node, creating it on first access seeded from
    /// the chat's welcome settings.
    async fn get_root(&self, chat_id: i64) -> Result<ContentNode, AppError>;

    /// Children of `parent_id` within `chat_id`, ordered by id ascending.
    async fn get_children(
        &self,
        chat_id: i64,
        parent_id: i64,
    ) -> Result<Vec<ContentNode>, AppError>;

    async fn create_node(
        &self,
        chat_id: i64,
        parent_id: Option<i64>,
        text: &str,
        format_mode: FormatMode,
        image_url: Option<String>,
    ) -> Result<i64, AppError>;

    /// Hard delete of a single record. Recursion and reference cleanup are
    /// the tree editor's responsibility.
    async fn delete_node(&self, id: i64) -> Result<(), AppError>;

    async fn update_text(&self, id: i64, text: &str) -> Result<(), AppError>;
    async fn update_image(&self, id: i64, image_url: Option<&str>) -> Result<(), AppError>;
    async fn update_format_mode(&self, id: i64, mode: FormatMode) -> Result<(), AppError>;
    async fn update_buttons(&self, id: i64, rows: &ButtonRows) -> Result<(), AppError>;
}

/// Chat-level records that live beside the node tree: group registry,
/// welcome settings, and delivery stats.
#[async_trait]
pub trait ChatRegistry: Send + Sync {
    async fn upsert_group(&self, group: &GroupRecord) -> Result<(), AppError>;
    async fn get_group(&self, chat_id: i64) -> Result<Option<GroupRecord>, AppError>;
    async fn active_groups(&self) -> Result<Vec<GroupRecord>, AppError>;
    async fn deactivate_group(&self, chat_id: i64) -> Result<(), AppError>;
    async fn update_group_info(
        &self,
        chat_id: i64,
        title: &str,
        member_count: Option<i64>,
        is_forum: Option<bool>,
    ) -> Result<(), AppError>;
    async fn set_welcome_thread(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
    ) -> Result<(), AppError>;

    async fn welcome_settings(&self, chat_id: i64) -> Result<Option<WelcomeSettings>, AppError>;
    async fn update_welcome_message(&self, chat_id: i64, message: &str) -> Result<(), AppError>;
    /// Flips the enabled flag and returns the new state.
    async fn toggle_welcome(&self, chat_id: i64) -> Result<bool, AppError>;
    async fn record_welcome_sent(&self, chat_id: i64) -> Result<(), AppError>;
    async fn group_stats(&self, chat_id: i64) -> Result<Option<GroupStats>, AppError>;
}

pub(crate) fn seed_from_settings(settings: Option<&WelcomeSettings>) -> RootSeed {
    match settings {
        Some(s) => RootSeed {
            text: s
                .message
                .clone()
                .unwrap_or_else(|| DEFAULT_WELCOME_MESSAGE.to_string()),
            image_url: s.image_url.clone(),
            format_mode: s.format_mode,
        },
        None => RootSeed {
            text: DEFAULT_WELCOME_MESSAGE.to_string(),
            image_url: None,
            format_mode: FormatMode::Html,
        },
    }
}

/// In-process store used by tests and local development. Same contract as
/// the Mongo-backed store, including the shared monotonic id counter.
#[derive(Default)]
pub struct MemoryStore {
    nodes: Mutex<HashMap<i64, ContentNode>>,
    groups: Mutex<HashMap<i64, GroupRecord>>,
    settings: Mutex<HashMap<i64, WelcomeSettings>>,
    stats: Mutex<HashMap<i64, GroupStats>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn welcomes_sent(&self, chat_id: i64) -> i64 {
        self.stats
            .lock()
            .unwrap()
            .get(&chat_id)
            .map(|s| s.welcomes_sent)
            .unwrap_or(0)
    }

    fn with_node<R>(
        &self,
        id: i64,
        f: impl FnOnce(&mut ContentNode) -> R,
    ) -> Result<R, AppError> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("node {} not found", id)))?;
        Ok(f(node))
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn get_node(&self, id: i64) -> Result<Option<ContentNode>, AppError> {
        Ok(self.nodes.lock().unwrap().get(&id).cloned())
    }

    async fn get_root(&self, chat_id: i64) -> Result<ContentNode, AppError> {
        if let Some(root) = self
            .nodes
            .lock()
            .unwrap()
            .values()
            .find(|n| n.chat_id == chat_id && n.is_root())
        {
            return Ok(root.clone());
        }

        let seed = {
            let settings = self.settings.lock().unwrap();
            seed_from_settings(settings.get(&chat_id))
        };
        let id = self
            .create_node(chat_id, None, &seed.text, seed.format_mode, seed.image_url)
            .await?;
        Ok(self.nodes.lock().unwrap()[&id].clone())
    }

    async fn get_children(
        &self,
        chat_id: i64,
        parent_id: i64,
    ) -> Result<Vec<ContentNode>, AppError> {
        let mut children: Vec<ContentNode> = self
            .nodes
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.chat_id == chat_id && n.parent_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by_key(|n| n.id);
        Ok(children)
    }

    async fn create_node(
        &self,
        chat_id: i64,
        parent_id: Option<i64>,
        text: &str,
        format_mode: FormatMode,
        image_url: Option<String>,
    ) -> Result<i64, AppError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let node = ContentNode {
            id,
            chat_id,
            parent_id,
            text: text.to_string(),
            image_url,
            format_mode,
            buttons: Vec::new(),
        };
        self.nodes.lock().unwrap().insert(id, node);
        Ok(id)
    }

    async fn delete_node(&self, id: i64) -> Result<(), AppError> {
        self.nodes.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn update_text(&self, id: i64, text: &str) -> Result<(), AppError> {
        self.with_node(id, |n| n.text = text.to_string())
    }

    async fn update_image(&self, id: i64, image_url: Option<&str>) -> Result<(), AppError> {
        self.with_node(id, |n| n.image_url = image_url.map(|s| s.to_string()))
    }

    async fn update_format_mode(&self, id: i64, mode: FormatMode) -> Result<(), AppError> {
        self.with_node(id, |n| n.format_mode = mode)
    }

    async fn update_buttons(&self, id: i64, rows: &ButtonRows) -> Result<(), AppError> {
        self.with_node(id, |n| n.buttons = rows.clone())
    }
}

#[async_trait]
impl ChatRegistry for MemoryStore {
    async fn upsert_group(&self, group: &GroupRecord) -> Result<(), AppError> {
        self.groups
            .lock()
            .unwrap()
            .insert(group.chat_id, group.clone());
        let mut settings = self.settings.lock().unwrap();
        settings
            .entry(group.chat_id)
            .or_insert_with(|| WelcomeSettings {
                chat_id: group.chat_id,
                enabled: true,
                message: Some(DEFAULT_WELCOME_MESSAGE.to_string()),
                image_url: None,
                format_mode: FormatMode::Html,
            });
        Ok(())
    }

    async fn get_group(&self, chat_id: i64) -> Result<Option<GroupRecord>, AppError> {
        Ok(self.groups.lock().unwrap().get(&chat_id).cloned())
    }

    async fn active_groups(&self) -> Result<Vec<GroupRecord>, AppError> {
        let mut groups: Vec<GroupRecord> = self
            .groups
            .lock()
            .unwrap()
            .values()
            .filter(|g| g.active)
            .cloned()
            .collect();
        groups.sort_by_key(|g| std::cmp::Reverse(g.added_date));
        Ok(groups)
    }

    async fn deactivate_group(&self, chat_id: i64) -> Result<(), AppError> {
        if let Some(g) = self.groups.lock().unwrap().get_mut(&chat_id) {
            g.active = false;
        }
        Ok(())
    }

    async fn update_group_info(
        &self,
        chat_id: i64,
        title: &str,
        member_count: Option<i64>,
        is_forum: Option<bool>,
    ) -> Result<(), AppError> {
        if let Some(g) = self.groups.lock().unwrap().get_mut(&chat_id) {
            g.title = title.to_string();
            if member_count.is_some() {
                g.member_count = member_count;
            }
            if let Some(forum) = is_forum {
                g.is_forum = forum;
            }
        }
        Ok(())
    }

    async fn set_welcome_thread(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
    ) -> Result<(), AppError> {
        if let Some(g) = self.groups.lock().unwrap().get_mut(&chat_id) {
            g.welcome_thread_id = thread_id;
        }
        Ok(())
    }

    async fn welcome_settings(&self, chat_id: i64) -> Result<Option<WelcomeSettings>, AppError> {
        Ok(self.settings.lock().unwrap().get(&chat_id).cloned())
    }

    async fn update_welcome_message(&self, chat_id: i64, message: &str) -> Result<(), AppError> {
        let mut settings = self.settings.lock().unwrap();
        let entry = settings.entry(chat_id).or_insert_with(|| WelcomeSettings {
            chat_id,
            enabled: true,
            message: None,
            image_url: None,
            format_mode: FormatMode::Html,
        });
        entry.message = Some(message.to_string());
        Ok(())
    }

    async fn toggle_welcome(&self, chat_id: i64) -> Result<bool, AppError> {
        let mut settings = self.settings.lock().unwrap();
        let entry = settings.entry(chat_id).or_insert_with(|| WelcomeSettings {
            chat_id,
            enabled: true,
            message: None,
            image_url: None,
            format_mode: FormatMode::Html,
        });
        entry.enabled = !entry.enabled;
        Ok(entry.enabled)
    }

    async fn record_welcome_sent(&self, chat_id: i64) -> Result<(), AppError> {
        let mut stats = self.stats.lock().unwrap();
        let entry = stats.entry(chat_id).or_insert_with(|| GroupStats {
            chat_id,
            welcomes_sent: 0,
            last_activity: Utc::now(),
        });
        entry.welcomes_sent += 1;
        entry.last_activity = Utc::now();
        Ok(())
    }

    async fn group_stats(&self, chat_id: i64) -> Result<Option<GroupStats>, AppError> {
        Ok(self.stats.lock().unwrap().get(&chat_id).cloned())
    }
}
