use crate::models::{Button, ContentNode, FormatMode};
use crate::services::store::NodeStore;
use service_core::error::AppError;
use std::sync::Arc;

/// Outcome of a subtree deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtreeDeletion {
    Deleted,
    /// Root nodes are never deleted; reported to the admin, not an error.
    RootRefused,
    NotFound,
}

/// Mutating operations over the node tree. Each operation is atomic from the
/// caller's perspective; cross-node sequences are ordered so that an
/// interruption can leak an orphan node but never leave a dangling button.
#[derive(Clone)]
pub struct TreeEditor {
    store: Arc<dyn NodeStore>,
}

impl TreeEditor {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }

    /// Creates a child node, then appends a nav button for it as a new
    /// trailing row on the parent. Always one button per new row.
    pub async fn add_child(
        &self,
        parent_id: i64,
        label: &str,
        text: &str,
        format_mode: FormatMode,
    ) -> Result<i64, AppError> {
        let parent = self.require_node(parent_id).await?;
        let child_id = self
            .store
            .create_node(parent.chat_id, Some(parent_id), text, format_mode, None)
            .await?;

        let mut rows = parent.buttons;
        rows.push(vec![Button::Node {
            text: label.to_string(),
            node_id: child_id,
        }]);
        self.store.update_buttons(parent_id, &rows).await?;

        tracing::info!(parent_id, child_id, "Created child node");
        Ok(child_id)
    }

    /// Appends an external-link button as a new trailing row.
    pub async fn add_link_button(
        &self,
        node_id: i64,
        label: &str,
        url: &str,
    ) -> Result<(), AppError> {
        let node = self.require_node(node_id).await?;
        let mut rows = node.buttons;
        rows.push(vec![Button::Url {
            text: label.to_string(),
            url: url.to_string(),
        }]);
        self.store.update_buttons(node_id, &rows).await
    }

    pub async fn rename_node(&self, node_id: i64, text: &str) -> Result<(), AppError> {
        self.store.update_text(node_id, text).await
    }

    pub async fn set_image(&self, node_id: i64, image_url: Option<&str>) -> Result<(), AppError> {
        self.store.update_image(node_id, image_url).await
    }

    pub async fn set_format_mode(&self, node_id: i64, mode: FormatMode) -> Result<(), AppError> {
        self.store.update_format_mode(node_id, mode).await
    }

    pub async fn clear_buttons(&self, node_id: i64) -> Result<(), AppError> {
        self.store.update_buttons(node_id, &Vec::new()).await
    }

    /// Deletes a node and its whole subtree. Order matters: descendants
    /// first, then removal of every nav button in the parent matrix pointing
    /// at the node, then the node record itself. An interruption can leave
    /// an orphaned record but never a button targeting a missing node.
    pub async fn delete_subtree(&self, node_id: i64) -> Result<SubtreeDeletion, AppError> {
        let Some(node) = self.store.get_node(node_id).await? else {
            return Ok(SubtreeDeletion::NotFound);
        };
        if node.is_root() {
            tracing::warn!(node_id, "Refusing to delete root node");
            return Ok(SubtreeDeletion::RootRefused);
        }

        // Collect the descendant ids up front so deletion never races the
        // traversal against the backing store.
        let mut descendants = Vec::new();
        let mut stack = vec![node_id];
        while let Some(current) = stack.pop() {
            for child in self.store.get_children(node.chat_id, current).await? {
                descendants.push(child.id);
                stack.push(child.id);
            }
        }

        // Reverse collection order deletes children before their parents.
        for id in descendants.into_iter().rev() {
            self.store.delete_node(id).await?;
        }

        if let Some(parent_id) = node.parent_id {
            self.remove_nav_buttons(parent_id, node_id).await?;
        }
        self.store.delete_node(node_id).await?;

        tracing::info!(node_id, "Deleted subtree");
        Ok(SubtreeDeletion::Deleted)
    }

    /// Strips every nav button targeting `target_id` from the node's matrix,
    /// preserving the order of survivors and dropping rows left empty.
    async fn remove_nav_buttons(&self, node_id: i64, target_id: i64) -> Result<(), AppError> {
        let Some(node) = self.store.get_node(node_id).await? else {
            return Ok(());
        };
        let rows: Vec<Vec<Button>> = node
            .buttons
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter(|b| !matches!(b, Button::Node { node_id, .. } if *node_id == target_id))
                    .collect::<Vec<_>>()
            })
            .filter(|row: &Vec<Button>| !row.is_empty())
            .collect();
        self.store.update_buttons(node_id, &rows).await
    }

    async fn require_node(&self, node_id: i64) -> Result<ContentNode, AppError> {
        self.store
            .get_node(node_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("node {} not found", node_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;

    async fn editor_with_root() -> (TreeEditor, i64, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let root = store.get_root(-100).await.unwrap();
        (TreeEditor::new(store.clone()), root.id, store)
    }

    #[tokio::test]
    async fn add_child_appends_trailing_nav_row() {
        let (editor, root_id, store) = editor_with_root().await;
        let child_id = editor
            .add_child(root_id, "More", "Sub text", FormatMode::Html)
            .await
            .unwrap();

        let parent = store.get_node(root_id).await.unwrap().unwrap();
        assert_eq!(parent.buttons.len(), 1);
        assert_eq!(
            parent.buttons[0],
            vec![Button::Node {
                text: "More".into(),
                node_id: child_id
            }]
        );

        let child = store.get_node(child_id).await.unwrap().unwrap();
        assert_eq!(child.parent_id, Some(root_id));
        assert_eq!(child.text, "Sub text");
    }

    #[tokio::test]
    async fn add_link_button_appends_trailing_row() {
        let (editor, root_id, store) = editor_with_root().await;
        editor
            .add_link_button(root_id, "Open", "https://x")
            .await
            .unwrap();
        editor
            .add_link_button(root_id, "Docs", "https://y")
            .await
            .unwrap();

        let node = store.get_node(root_id).await.unwrap().unwrap();
        assert_eq!(node.buttons.len(), 2);
        assert_eq!(node.buttons[1].len(), 1);
    }

    #[tokio::test]
    async fn delete_subtree_restores_parent_buttons() {
        let (editor, root_id, store) = editor_with_root().await;
        editor
            .add_link_button(root_id, "Open", "https://x")
            .await
            .unwrap();
        let before = store.get_node(root_id).await.unwrap().unwrap().buttons;

        let child_id = editor
            .add_child(root_id, "More", "Sub", FormatMode::Html)
            .await
            .unwrap();
        let outcome = editor.delete_subtree(child_id).await.unwrap();
        assert_eq!(outcome, SubtreeDeletion::Deleted);

        let after = store.get_node(root_id).await.unwrap().unwrap().buttons;
        assert_eq!(after, before);
        assert!(store.get_node(child_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_subtree_removes_all_descendants() {
        let (editor, root_id, store) = editor_with_root().await;
        let a = editor
            .add_child(root_id, "A", "a", FormatMode::Html)
            .await
            .unwrap();
        let b = editor.add_child(a, "B", "b", FormatMode::Html).await.unwrap();
        let c = editor.add_child(b, "C", "c", FormatMode::Html).await.unwrap();

        editor.delete_subtree(a).await.unwrap();

        for id in [a, b, c] {
            assert!(store.get_node(id).await.unwrap().is_none());
        }
        // No surviving node may reference any deleted id.
        let root = store.get_node(root_id).await.unwrap().unwrap();
        for row in &root.buttons {
            for button in row {
                if let Button::Node { node_id, .. } = button {
                    assert!(![a, b, c].contains(node_id));
                }
            }
        }
    }

    #[tokio::test]
    async fn root_deletion_is_refused() {
        let (editor, root_id, store) = editor_with_root().await;
        let outcome = editor.delete_subtree(root_id).await.unwrap();
        assert_eq!(outcome, SubtreeDeletion::RootRefused);
        assert!(store.get_node(root_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn deleting_missing_node_reports_not_found() {
        let (editor, _, _) = editor_with_root().await;
        assert_eq!(
            editor.delete_subtree(9999).await.unwrap(),
            SubtreeDeletion::NotFound
        );
    }

    #[tokio::test]
    async fn clear_buttons_empties_matrix() {
        let (editor, root_id, store) = editor_with_root().await;
        editor
            .add_link_button(root_id, "Open", "https://x")
            .await
            .unwrap();
        editor.clear_buttons(root_id).await.unwrap();
        assert!(store.get_node(root_id).await.unwrap().unwrap().buttons.is_empty());
    }
}
