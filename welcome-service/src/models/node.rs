use serde::{Deserialize, Deserializer, Serialize};

/// Markup dialect used when rendering a node's text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatMode {
    #[serde(rename = "plain")]
    Plain,
    #[default]
    #[serde(rename = "HTML")]
    Html,
    #[serde(rename = "MarkdownV2")]
    MarkdownV2,
}

impl FormatMode {
    /// Lenient parse of stored/user-supplied mode strings. Anything starting
    /// with "markdown" (any case) normalizes to MarkdownV2; unknown values
    /// fall back to HTML, matching the stored-document defaults.
    pub fn parse(value: &str) -> Self {
        let v = value.trim();
        if v.to_lowercase().starts_with("markdown") {
            FormatMode::MarkdownV2
        } else if v.eq_ignore_ascii_case("plain") {
            FormatMode::Plain
        } else {
            FormatMode::Html
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatMode::Plain => "plain",
            FormatMode::Html => "HTML",
            FormatMode::MarkdownV2 => "MarkdownV2",
        }
    }

    /// Whether the transport should receive a parse_mode for this dialect.
    pub fn is_structured(&self) -> bool {
        !matches!(self, FormatMode::Plain)
    }
}

impl std::fmt::Display for FormatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single inline button. `Url` buttons point outside the tree; `Node`
/// buttons are weak references to another node in the same chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Button {
    Url { text: String, url: String },
    Node { text: String, node_id: i64 },
}

impl Button {
    pub fn label(&self) -> &str {
        match self {
            Button::Url { text, .. } | Button::Node { text, .. } => text,
        }
    }
}

pub type ButtonRows = Vec<Vec<Button>>;

/// Normalizes a stored `buttons` field into rows of typed buttons.
///
/// Accepts either a structured array or a JSON string (older documents stored
/// the matrix serialized). Any malformed or unrecognized shape degrades to an
/// empty matrix: buttons are cosmetic and must never block content delivery.
pub fn parse_buttons(raw: &serde_json::Value) -> ButtonRows {
    let value = match raw {
        serde_json::Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        },
        other => other.clone(),
    };
    serde_json::from_value(value).unwrap_or_default()
}

/// Inverse of [`parse_buttons`], used when persisting a node's matrix.
pub fn serialize_buttons(rows: &ButtonRows) -> serde_json::Value {
    serde_json::to_value(rows).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
}

/// Total number of buttons across all rows, for admin summaries.
pub fn count_buttons(rows: &ButtonRows) -> usize {
    rows.iter().map(|row| row.len()).sum()
}

fn lenient_buttons<'de, D>(deserializer: D) -> Result<ButtonRows, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(serde_json::Value::deserialize(deserializer)
        .map(|value| parse_buttons(&value))
        .unwrap_or_default())
}

fn lenient_format_mode<'de, D>(deserializer: D) -> Result<FormatMode, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)
        .ok()
        .flatten()
        .map(|s| FormatMode::parse(&s))
        .unwrap_or_default())
}

/// A unit of displayable content in a chat's tree. `parent_id == None` marks
/// the chat's root node; exactly one root exists per chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentNode {
    #[serde(rename = "node_id")]
    pub id: i64,
    pub chat_id: i64,
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(
        rename = "parse_mode",
        default,
        deserialize_with = "lenient_format_mode"
    )]
    pub format_mode: FormatMode,
    #[serde(default, deserialize_with = "lenient_buttons")]
    pub buttons: ButtonRows,
}

impl ContentNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn button_count(&self) -> usize {
        count_buttons(&self.buttons)
    }
}
