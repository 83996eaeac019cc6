use super::node::FormatMode;

/// Closed set of interaction commands carried in callback payloads.
///
/// Payloads are decoded once at the dispatch boundary; building and parsing
/// live together here so the wire grammar has a single owner. Navigation
/// commands are public; everything else requires the admin identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Show a node to the viewer (public "book mode" navigation).
    Navigate { node_id: i64 },
    /// Jump back to the chat's root node.
    NavigateHome { chat_id: i64 },

    /// Open the node manager screen; `node_id == None` targets the root.
    NodeManager { chat_id: i64, node_id: Option<i64> },
    AddUrlButton { node_id: i64 },
    AddSubmenu { node_id: i64 },
    ClearButtons { node_id: i64 },
    SetImage { node_id: i64 },
    Rename { node_id: i64 },
    ListChildren { chat_id: i64, node_id: i64 },
    DeleteSubtree { node_id: i64 },
    FormatSelector { node_id: i64 },
    SetFormat { node_id: i64, mode: FormatMode },

    WelcomeConfig { chat_id: i64 },
    EditWelcomeMessage { chat_id: i64 },
    EditWelcomeImage { chat_id: i64 },
    ManageButtons { chat_id: i64 },
    ToggleWelcome { chat_id: i64 },
    TestWelcome { chat_id: i64 },

    /// Per-group statistics screen (welcomes sent, last activity).
    GroupStats { chat_id: i64 },
    /// Re-fetch live chat metadata into the group record.
    RefreshGroupInfo { chat_id: i64 },
}

impl Command {
    /// Whether the command may be issued by any viewer, not just the admin.
    pub fn is_public(&self) -> bool {
        matches!(self, Command::Navigate { .. } | Command::NavigateHome { .. })
    }

    pub fn encode(&self) -> String {
        match self {
            Command::Navigate { node_id } => format!("navigate:{}", node_id),
            Command::NavigateHome { chat_id } => format!("navigate-home:{}", chat_id),
            Command::NodeManager { chat_id, node_id } => match node_id {
                Some(id) => format!("node-manager:{}:{}", chat_id, id),
                None => format!("node-manager:{}:root", chat_id),
            },
            Command::AddUrlButton { node_id } => format!("add-url:{}", node_id),
            Command::AddSubmenu { node_id } => format!("add-submenu:{}", node_id),
            Command::ClearButtons { node_id } => format!("clear-buttons:{}", node_id),
            Command::SetImage { node_id } => format!("set-image:{}", node_id),
            Command::Rename { node_id } => format!("rename:{}", node_id),
            Command::ListChildren { chat_id, node_id } => {
                format!("list-children:{}:{}", chat_id, node_id)
            }
            Command::DeleteSubtree { node_id } => format!("delete-subtree:{}", node_id),
            Command::FormatSelector { node_id } => format!("format:{}", node_id),
            Command::SetFormat { node_id, mode } => {
                format!("set-format:{}:{}", node_id, mode.as_str())
            }
            Command::WelcomeConfig { chat_id } => format!("welcome-config:{}", chat_id),
            Command::EditWelcomeMessage { chat_id } => format!("edit-welcome:{}", chat_id),
            Command::EditWelcomeImage { chat_id } => format!("edit-welcome-image:{}", chat_id),
            Command::ManageButtons { chat_id } => format!("manage-buttons:{}", chat_id),
            Command::ToggleWelcome { chat_id } => format!("toggle-welcome:{}", chat_id),
            Command::TestWelcome { chat_id } => format!("test-welcome:{}", chat_id),
            Command::GroupStats { chat_id } => format!("group-stats:{}", chat_id),
            Command::RefreshGroupInfo { chat_id } => format!("refresh-group:{}", chat_id),
        }
    }

    /// Decodes a callback payload. Unknown payloads yield `None`; the caller
    /// logs and ignores them rather than failing the interaction.
    pub fn decode(data: &str) -> Option<Command> {
        let mut parts = data.splitn(2, ':');
        let verb = parts.next()?;
        let rest = parts.next().unwrap_or("");

        let int = |s: &str| s.parse::<i64>().ok();

        match verb {
            "navigate" => Some(Command::Navigate { node_id: int(rest)? }),
            "navigate-home" => Some(Command::NavigateHome { chat_id: int(rest)? }),
            "node-manager" => {
                let (chat, node) = rest.split_once(':')?;
                let node_id = if node == "root" { None } else { Some(int(node)?) };
                Some(Command::NodeManager {
                    chat_id: int(chat)?,
                    node_id,
                })
            }
            "add-url" => Some(Command::AddUrlButton { node_id: int(rest)? }),
            "add-submenu" => Some(Command::AddSubmenu { node_id: int(rest)? }),
            "clear-buttons" => Some(Command::ClearButtons { node_id: int(rest)? }),
            "set-image" => Some(Command::SetImage { node_id: int(rest)? }),
            "rename" => Some(Command::Rename { node_id: int(rest)? }),
            "list-children" => {
                let (chat, node) = rest.split_once(':')?;
                Some(Command::ListChildren {
                    chat_id: int(chat)?,
                    node_id: int(node)?,
                })
            }
            "delete-subtree" => Some(Command::DeleteSubtree { node_id: int(rest)? }),
            "format" => Some(Command::FormatSelector { node_id: int(rest)? }),
            "set-format" => {
                let (node, mode) = rest.split_once(':')?;
                Some(Command::SetFormat {
                    node_id: int(node)?,
                    mode: FormatMode::parse(mode),
                })
            }
            "welcome-config" => Some(Command::WelcomeConfig { chat_id: int(rest)? }),
            "edit-welcome" => Some(Command::EditWelcomeMessage { chat_id: int(rest)? }),
            "edit-welcome-image" => Some(Command::EditWelcomeImage { chat_id: int(rest)? }),
            "manage-buttons" => Some(Command::ManageButtons { chat_id: int(rest)? }),
            "toggle-welcome" => Some(Command::ToggleWelcome { chat_id: int(rest)? }),
            "test-welcome" => Some(Command::TestWelcome { chat_id: int(rest)? }),
            "group-stats" => Some(Command::GroupStats { chat_id: int(rest)? }),
            "refresh-group" => Some(Command::RefreshGroupInfo { chat_id: int(rest)? }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let commands = vec![
            Command::Navigate { node_id: 7 },
            Command::NavigateHome { chat_id: -100123 },
            Command::NodeManager {
                chat_id: -1,
                node_id: Some(4),
            },
            Command::NodeManager {
                chat_id: -1,
                node_id: None,
            },
            Command::AddUrlButton { node_id: 3 },
            Command::AddSubmenu { node_id: 3 },
            Command::ClearButtons { node_id: 3 },
            Command::SetImage { node_id: 3 },
            Command::Rename { node_id: 3 },
            Command::ListChildren {
                chat_id: -2,
                node_id: 5,
            },
            Command::DeleteSubtree { node_id: 9 },
            Command::FormatSelector { node_id: 2 },
            Command::SetFormat {
                node_id: 2,
                mode: FormatMode::MarkdownV2,
            },
            Command::WelcomeConfig { chat_id: -3 },
            Command::EditWelcomeMessage { chat_id: -3 },
            Command::EditWelcomeImage { chat_id: -3 },
            Command::ManageButtons { chat_id: -3 },
            Command::ToggleWelcome { chat_id: -3 },
            Command::TestWelcome { chat_id: -3 },
            Command::GroupStats { chat_id: -3 },
            Command::RefreshGroupInfo { chat_id: -3 },
        ];
        for cmd in commands {
            assert_eq!(Command::decode(&cmd.encode()), Some(cmd));
        }
    }

    #[test]
    fn rejects_unknown_payloads() {
        assert_eq!(Command::decode(""), None);
        assert_eq!(Command::decode("navigate:abc"), None);
        assert_eq!(Command::decode("wb_12"), None);
        assert_eq!(Command::decode("node-manager:1"), None);
        assert_eq!(Command::decode("teleport:4"), None);
    }

    #[test]
    fn only_navigation_is_public() {
        assert!(Command::Navigate { node_id: 1 }.is_public());
        assert!(Command::NavigateHome { chat_id: 1 }.is_public());
        assert!(!Command::DeleteSubtree { node_id: 1 }.is_public());
        assert!(!Command::WelcomeConfig { chat_id: 1 }.is_public());
        assert!(!Command::GroupStats { chat_id: 1 }.is_public());
    }
}
