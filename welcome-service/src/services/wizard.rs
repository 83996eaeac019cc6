use dashmap::DashMap;

/// Where a multi-step edit currently stands. Each variant carries the target
/// it was started against plus whatever the earlier steps captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardStage {
    AwaitingButtonLabel { node_id: i64 },
    AwaitingButtonUrl { node_id: i64, label: String },
    AwaitingSubmenuLabel { node_id: i64 },
    AwaitingSubmenuBody { node_id: i64, label: String },
    AwaitingImage { node_id: i64 },
    AwaitingRename { node_id: i64 },
    AwaitingWelcomeBody { chat_id: i64 },
}

/// Ephemeral per-admin wizard sessions. Keyed by admin identity; each admin
/// only ever touches their own entry, so no cross-admin coordination exists.
/// Sessions have no expiry: they live until completed, cancelled, or
/// replaced by starting another wizard (last writer wins).
#[derive(Default)]
pub struct WizardSessions {
    sessions: DashMap<i64, WizardStage>,
}

impl WizardSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or silently replaces) the admin's session.
    pub fn begin(&self, admin_id: i64, stage: WizardStage) {
        self.sessions.insert(admin_id, stage);
    }

    pub fn current(&self, admin_id: i64) -> Option<WizardStage> {
        self.sessions.get(&admin_id).map(|s| s.clone())
    }

    /// Moves an in-flight session to its next stage.
    pub fn advance(&self, admin_id: i64, stage: WizardStage) {
        self.sessions.insert(admin_id, stage);
    }

    /// Ends the session; returns whether one existed.
    pub fn finish(&self, admin_id: i64) -> bool {
        self.sessions.remove(&admin_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_are_isolated_per_admin() {
        let sessions = WizardSessions::new();
        sessions.begin(1, WizardStage::AwaitingRename { node_id: 10 });
        sessions.begin(2, WizardStage::AwaitingImage { node_id: 20 });

        assert_eq!(
            sessions.current(1),
            Some(WizardStage::AwaitingRename { node_id: 10 })
        );
        assert_eq!(
            sessions.current(2),
            Some(WizardStage::AwaitingImage { node_id: 20 })
        );
    }

    #[test]
    fn starting_a_new_wizard_replaces_the_old_session() {
        let sessions = WizardSessions::new();
        sessions.begin(1, WizardStage::AwaitingRename { node_id: 10 });
        sessions.begin(1, WizardStage::AwaitingButtonLabel { node_id: 11 });
        assert_eq!(
            sessions.current(1),
            Some(WizardStage::AwaitingButtonLabel { node_id: 11 })
        );
    }

    #[test]
    fn finish_removes_the_session() {
        let sessions = WizardSessions::new();
        sessions.begin(1, WizardStage::AwaitingImage { node_id: 3 });
        assert!(sessions.finish(1));
        assert_eq!(sessions.current(1), None);
        assert!(!sessions.finish(1));
    }

    #[test]
    fn advance_carries_accumulated_fields() {
        let sessions = WizardSessions::new();
        sessions.begin(1, WizardStage::AwaitingButtonLabel { node_id: 5 });
        sessions.advance(
            1,
            WizardStage::AwaitingButtonUrl {
                node_id: 5,
                label: "Open".into(),
            },
        );
        assert_eq!(
            sessions.current(1),
            Some(WizardStage::AwaitingButtonUrl {
                node_id: 5,
                label: "Open".into()
            })
        );
    }
}
