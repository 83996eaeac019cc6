use crate::models::{Button, Command, ContentNode, FormatMode};
use crate::services::transport::{Keyboard, KeyboardButton};
use once_cell::sync::Lazy;

/// Identity of the person a node is rendered for. All fields are optional;
/// rendering degrades to safe placeholders for anonymous viewers.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub username: Option<String>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Output of the render pipeline, ready for the delivery layer.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub body: String,
    pub keyboard: Option<Keyboard>,
    pub format_mode: FormatMode,
}

const FALLBACK_NAME: &str = "user";

/// Inline-icon table: token, rich custom-emoji reference (MarkdownV2 only),
/// plain glyph fallback.
static ICONS: Lazy<Vec<(&str, &str, &str)>> = Lazy::new(|| {
    vec![
        (":crown:", "![👑](tg://emoji?id=5769547529993588669)", "👑"),
        (":plus:", "![➕](tg://emoji?id=5393194986252542669)", "➕"),
        (":globe:", "![🌐](tg://emoji?id=5895665559558689321)", "🌐"),
        (":point_left:", "![👈](tg://emoji?id=6319056439096644016)", "👈"),
        (":check:", "![✔️](tg://emoji?id=5206607081334906820)", "✔️"),
        (":wow:", "![😮](tg://emoji?id=5391090636961099009)", "😮"),
        (":fire:", "![🔥](tg://emoji?id=5469986291380657891)", "🔥"),
        (":star:", "![⭐](tg://emoji?id=5469654991199578830)", "⭐"),
        (":rocket:", "![🚀](tg://emoji?id=5469741319743707297)", "🚀"),
        (":diamond:", "![💎](tg://emoji?id=5469741319743707298)", "💎"),
        (":party:", "![🎉](tg://emoji?id=5469741319743707299)", "🎉"),
        (":heart:", "![❤️](tg://emoji?id=5469741319743707300)", "❤️"),
        (":lightning:", "![⚡](tg://emoji?id=5469741319743707301)", "⚡"),
        (":trophy:", "![🏆](tg://emoji?id=5469741319743707302)", "🏆"),
        (":gem:", "![💠](tg://emoji?id=5469741319743707303)", "💠"),
        (":magic:", "![✨](tg://emoji?id=5469741319743707304)", "✨"),
    ]
});

/// HTML entity escaping for the characters Telegram's HTML dialect treats
/// as markup. Quotes are left alone.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Backslash-escapes every MarkdownV2 special character.
pub fn escape_markdown_v2(text: &str) -> String {
    const SPECIALS: &str = "\\_*[]()~`>#+-=|{}.!";
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if SPECIALS.contains(ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn escape_for(mode: FormatMode, text: &str) -> String {
    match mode {
        FormatMode::Html => escape_html(text),
        FormatMode::MarkdownV2 => escape_markdown_v2(text),
        FormatMode::Plain => text.to_string(),
    }
}

/// Expands `:token:` icon markers. Total and idempotent: unknown tokens are
/// left verbatim, and the substituted values contain no tokens themselves.
pub fn expand_icons(text: &str, mode: FormatMode) -> String {
    let mut out = text.to_string();
    for (token, rich, plain) in ICONS.iter() {
        let replacement = if mode == FormatMode::MarkdownV2 {
            rich
        } else {
            plain
        };
        out = out.replace(token, replacement);
    }
    out
}

/// Substitutes `{mention}`, `{name}`, `{username}` and `{group_name}` into a
/// template. Values are escaped for the active mode before substitution so
/// viewer-controlled names cannot inject markup.
pub fn substitute_placeholders(
    template: &str,
    viewer: &Viewer,
    group_name: &str,
    mode: FormatMode,
) -> String {
    let raw_name = viewer.name.clone().unwrap_or_default();
    let display_name = if raw_name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        raw_name.clone()
    };
    let raw_username = match &viewer.username {
        Some(u) => format!("@{}", u),
        None => display_name.clone(),
    };

    let name = escape_for(mode, &display_name);
    let username = escape_for(mode, &raw_username);
    let group = escape_for(mode, group_name);

    let mention = match (mode, viewer.id) {
        (FormatMode::Html, Some(id)) => {
            format!("<a href='tg://user?id={}'>{}</a>", id, name)
        }
        (FormatMode::MarkdownV2, Some(id)) => format!("[{}](tg://user?id={})", name, id),
        _ => name.clone(),
    };

    template
        .replace("{mention}", &mention)
        .replace("{name}", &name)
        .replace("{username}", &username)
        .replace("{group_name}", &group)
}

/// Builds the inline keyboard for a node. A trailing `[Back, Home]` row is
/// appended when the node has a parent; a lone `[Home]` row when a rootless
/// node already shows buttons. Empty rootless sets get no keyboard at all.
pub fn build_keyboard(node: &ContentNode) -> Option<Keyboard> {
    let mut rows: Vec<Vec<KeyboardButton>> = Vec::new();

    for row in &node.buttons {
        let mut rendered_row = Vec::new();
        for button in row {
            match button {
                Button::Url { text, url } => {
                    if !url.is_empty() {
                        rendered_row.push(KeyboardButton::Url {
                            text: text.clone(),
                            url: url.clone(),
                        });
                    }
                }
                Button::Node { text, node_id } => {
                    rendered_row.push(KeyboardButton::Callback {
                        text: text.clone(),
                        data: Command::Navigate { node_id: *node_id }.encode(),
                    });
                }
            }
        }
        if !rendered_row.is_empty() {
            rows.push(rendered_row);
        }
    }

    if let Some(parent_id) = node.parent_id {
        rows.push(vec![
            KeyboardButton::Callback {
                text: "◀️ Back".to_string(),
                data: Command::Navigate { node_id: parent_id }.encode(),
            },
            KeyboardButton::Callback {
                text: "🏠 Home".to_string(),
                data: Command::NavigateHome {
                    chat_id: node.chat_id,
                }
                .encode(),
            },
        ]);
    } else if !rows.is_empty() {
        rows.push(vec![KeyboardButton::Callback {
            text: "🏠 Home".to_string(),
            data: Command::NavigateHome {
                chat_id: node.chat_id,
            }
            .encode(),
        }]);
    }

    if rows.is_empty() {
        None
    } else {
        Some(Keyboard { rows })
    }
}

/// Renders a node for a viewer. Never fails: every missing optional field
/// degrades to a safe default.
pub fn render(node: &ContentNode, viewer: &Viewer, group_name: &str) -> Rendered {
    render_as(node, viewer, group_name, node.format_mode)
}

/// Renders with an explicit format mode; used by the delivery fallback to
/// force plain mode after an unparseable-markup rejection.
pub fn render_as(
    node: &ContentNode,
    viewer: &Viewer,
    group_name: &str,
    mode: FormatMode,
) -> Rendered {
    let body = substitute_placeholders(&node.text, viewer, group_name, mode);
    let body = expand_icons(&body, mode);
    Rendered {
        body,
        keyboard: build_keyboard(node),
        format_mode: mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ButtonRows;

    fn node(text: &str, mode: FormatMode) -> ContentNode {
        ContentNode {
            id: 1,
            chat_id: -100,
            parent_id: None,
            text: text.to_string(),
            image_url: None,
            format_mode: mode,
            buttons: Vec::new(),
        }
    }

    fn viewer(name: &str) -> Viewer {
        Viewer {
            id: Some(42),
            name: Some(name.to_string()),
            username: None,
        }
    }

    #[test]
    fn plain_render_substitutes_without_markup() {
        let n = node("Hi {name}", FormatMode::Plain);
        let out = render(
            &n,
            &Viewer {
                id: None,
                name: Some("Ana".into()),
                username: None,
            },
            "el grupo",
        );
        assert_eq!(out.body, "Hi Ana");
        assert_eq!(out.format_mode, FormatMode::Plain);
        assert!(out.keyboard.is_none());
    }

    #[test]
    fn render_is_total_for_empty_anonymous_input() {
        let n = node("", FormatMode::Html);
        let out = render(&n, &Viewer::anonymous(), "");
        assert_eq!(out.body, "");
        assert!(out.keyboard.is_none());
    }

    #[test]
    fn html_mention_links_and_escapes() {
        let n = node("Hello {mention}", FormatMode::Html);
        let out = render(&n, &viewer("A<b>"), "g");
        assert_eq!(
            out.body,
            "Hello <a href='tg://user?id=42'>A&lt;b&gt;</a>"
        );
    }

    #[test]
    fn anonymous_mention_falls_back_to_name() {
        let n = node("Hello {mention}", FormatMode::Html);
        let out = render(&n, &Viewer::anonymous(), "g");
        assert_eq!(out.body, "Hello user");
    }

    #[test]
    fn username_falls_back_to_name_then_placeholder() {
        let n = node("{username}", FormatMode::Plain);
        let with_handle = Viewer {
            id: None,
            name: Some("Ana".into()),
            username: Some("ana_h".into()),
        };
        assert_eq!(render(&n, &with_handle, "g").body, "@ana_h");
        assert_eq!(render(&n, &viewer("Ana"), "g").body, "Ana");
        assert_eq!(render(&n, &Viewer::anonymous(), "g").body, "user");
    }

    #[test]
    fn markdown_escapes_special_characters_in_values() {
        let n = node("{group_name}", FormatMode::MarkdownV2);
        let out = render(&n, &Viewer::anonymous(), "a.b_c!");
        assert_eq!(out.body, "a\\.b\\_c\\!");
    }

    #[test]
    fn icons_expand_rich_under_markdown_and_plain_otherwise() {
        assert_eq!(
            expand_icons(":star:", FormatMode::MarkdownV2),
            "![⭐](tg://emoji?id=5469654991199578830)"
        );
        assert_eq!(expand_icons(":star:", FormatMode::Html), "⭐");
        assert_eq!(expand_icons(":star:", FormatMode::Plain), "⭐");
    }

    #[test]
    fn unknown_icon_tokens_are_left_verbatim() {
        assert_eq!(expand_icons(":nope:", FormatMode::Plain), ":nope:");
        let once = expand_icons(":star: :nope:", FormatMode::Plain);
        assert_eq!(expand_icons(&once, FormatMode::Plain), once);
    }

    #[test]
    fn keyboard_appends_back_and_home_for_child_nodes() {
        let buttons: ButtonRows = vec![vec![Button::Url {
            text: "Open".into(),
            url: "https://x".into(),
        }]];
        let mut n = node("t", FormatMode::Html);
        n.parent_id = Some(1);
        n.buttons = buttons;

        let keyboard = build_keyboard(&n).unwrap();
        assert_eq!(keyboard.rows.len(), 2);
        assert_eq!(
            keyboard.rows[0],
            vec![KeyboardButton::Url {
                text: "Open".into(),
                url: "https://x".into()
            }]
        );
        assert_eq!(
            keyboard.rows[1],
            vec![
                KeyboardButton::Callback {
                    text: "◀️ Back".into(),
                    data: "navigate:1".into()
                },
                KeyboardButton::Callback {
                    text: "🏠 Home".into(),
                    data: "navigate-home:-100".into()
                },
            ]
        );
    }

    #[test]
    fn rootless_keyboard_gets_home_row_only_when_buttons_exist() {
        let mut n = node("t", FormatMode::Html);
        assert!(build_keyboard(&n).is_none());

        n.buttons = vec![vec![Button::Node {
            text: "More".into(),
            node_id: 9,
        }]];
        let keyboard = build_keyboard(&n).unwrap();
        assert_eq!(keyboard.rows.len(), 2);
        assert_eq!(
            keyboard.rows[1],
            vec![KeyboardButton::Callback {
                text: "🏠 Home".into(),
                data: "navigate-home:-100".into()
            }]
        );
    }

    #[test]
    fn empty_url_buttons_are_skipped_and_empty_rows_dropped() {
        let mut n = node("t", FormatMode::Html);
        n.buttons = vec![vec![Button::Url {
            text: "broken".into(),
            url: "".into(),
        }]];
        assert!(build_keyboard(&n).is_none());
    }
}
