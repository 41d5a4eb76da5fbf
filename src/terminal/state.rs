use ratatui::widgets::ListState;
use std::sync::{Arc, Mutex};

use crate::domain::inbox::MessageId;
use crate::manager::{MessageRow, MessagesSnapshot, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    ListOnly,
    Split,
}

pub struct AppState {
    pub list_state: ListState,
    pub mode: ViewMode,
    /// Written by the message-select callback, read when rendering.
    pub opened_id: Arc<Mutex<Option<MessageId>>>,
    /// Message waiting for a y/n delete confirmation.
    pub confirm_delete: Option<MessageId>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            list_state: ListState::default(),
            mode: ViewMode::ListOnly,
            opened_id: Arc::new(Mutex::new(None)),
            confirm_delete: None,
        }
    }

    /// Keep the selection inside the current list and drop references to
    /// messages that are gone. Left alone while a fetch is outstanding.
    pub fn sync(&mut self, snap: &Snapshot) {
        if snap.messages == MessagesSnapshot::Loading {
            return;
        }
        let rows = rows(snap);
        if rows.is_empty() {
            self.list_state.select(None);
        } else {
            let idx = self.list_state.selected().unwrap_or(0).min(rows.len() - 1);
            self.list_state.select(Some(idx));
        }

        if let Some(id) = &self.confirm_delete
            && !rows.iter().any(|r| &r.message.id == id)
        {
            self.confirm_delete = None;
        }

        let opened_gone = self
            .opened()
            .is_some_and(|id| !rows.iter().any(|r| r.message.id == id));
        if opened_gone {
            self.close_message();
        }
    }

    pub fn current_selected_id(&self, snap: &Snapshot) -> Option<MessageId> {
        let idx = self.list_state.selected()?;
        rows(snap).get(idx).map(|r| r.message.id.clone())
    }

    pub fn move_selection(&mut self, delta: i32, snap: &Snapshot) {
        let len = rows(snap).len() as i32;
        if len == 0 {
            self.list_state.select(None);
            return;
        }
        let cur = self.list_state.selected().unwrap_or(0) as i32;
        let next = (cur + delta).clamp(0, len - 1) as usize;
        self.list_state.select(Some(next));
    }

    pub fn opened(&self) -> Option<MessageId> {
        self.opened_id.lock().ok().and_then(|g| g.clone())
    }

    pub fn close_message(&mut self) {
        self.mode = ViewMode::ListOnly;
        if let Ok(mut g) = self.opened_id.lock() {
            *g = None;
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn rows(snap: &Snapshot) -> &[MessageRow] {
    match &snap.messages {
        MessagesSnapshot::Populated(rows) => rows,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{FakeBackend, domain, message_json};
    use crate::manager::{Dispatch, InboxManager, Settings};
    use crate::notify::RecordingNotifier;
    use serde_json::json;
    use std::sync::Arc;

    fn manager(ids: &[&str]) -> (InboxManager, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::new(vec![domain("mail.test", true, false)], None));
        backend.set_messages(json!(ids.iter().map(|id| message_json(id, "s")).collect::<Vec<_>>()));
        let mut m = InboxManager::new(
            backend.clone(),
            Box::new(RecordingNotifier::default()),
            Settings::default(),
            Dispatch::Inline,
        );
        m.start();
        m.pump();
        (m, backend)
    }

    #[test]
    fn test_refresh_keeps_open_message_and_selection() {
        let (mut m, _) = manager(&["a", "b"]);
        let mut state = AppState::new();
        state.sync(&m.snapshot());
        state.move_selection(1, &m.snapshot());
        *state.opened_id.lock().unwrap() = Some("b".to_string());
        state.mode = ViewMode::Split;
        state.confirm_delete = Some("b".to_string());

        // fetch queued but not yet answered
        m.refetch_messages();
        let snap = m.snapshot();
        assert_eq!(snap.messages, MessagesSnapshot::Loading);
        state.sync(&snap);
        assert_eq!(state.opened().as_deref(), Some("b"));
        assert_eq!(state.mode, ViewMode::Split);
        assert_eq!(state.list_state.selected(), Some(1));
        assert_eq!(state.confirm_delete.as_deref(), Some("b"));

        m.pump();
        state.sync(&m.snapshot());
        assert_eq!(state.opened().as_deref(), Some("b"));
        assert_eq!(state.list_state.selected(), Some(1));
    }

    #[test]
    fn test_settled_fetch_drops_vanished_message() {
        let (mut m, backend) = manager(&["a", "b"]);
        let mut state = AppState::new();
        state.sync(&m.snapshot());
        state.move_selection(1, &m.snapshot());
        *state.opened_id.lock().unwrap() = Some("b".to_string());
        state.mode = ViewMode::Split;

        backend.set_messages(json!([message_json("a", "s")]));
        m.refetch_messages();
        m.pump();
        state.sync(&m.snapshot());
        assert!(state.opened().is_none());
        assert_eq!(state.mode, ViewMode::ListOnly);
        assert_eq!(state.list_state.selected(), Some(0));
    }
}
