use super::node::FormatMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat the bot has been added to. Upserted when the bot joins and kept
/// fresh opportunistically from live chat metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub chat_id: i64,
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub added_by: Option<i64>,
    #[serde(default)]
    pub added_by_username: Option<String>,
    #[serde(default)]
    pub added_by_name: Option<String>,
    #[serde(default)]
    pub member_count: Option<i64>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub added_date: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub is_forum: bool,
    /// Forum topic the welcome is posted into, when configured.
    #[serde(default)]
    pub welcome_thread_id: Option<i64>,
}

fn default_true() -> bool {
    true
}

/// Per-chat welcome configuration. The message/image/format fields seed the
/// chat's root node on lazy creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeSettings {
    pub chat_id: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(rename = "parse_mode", default)]
    pub format_mode: FormatMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStats {
    pub chat_id: i64,
    #[serde(default)]
    pub welcomes_sent: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub last_activity: DateTime<Utc>,
}

/// Seed content for a lazily-created root node.
#[derive(Debug, Clone)]
pub struct RootSeed {
    pub text: String,
    pub image_url: Option<String>,
    pub format_mode: FormatMode,
}
