use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};

use crate::manager::{InboxManager, Snapshot};
use crate::session::SessionStatus;
use crate::terminal::state::{AppState, ViewMode};

/// Returns true when the user asked to quit.
pub fn handle_key(
    key: KeyEvent,
    state: &mut AppState,
    manager: &mut InboxManager,
    snap: &Snapshot,
) -> Result<bool> {
    if let Some(id) = state.confirm_delete.take() {
        if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
            manager.delete_message(&id);
        }
        return Ok(false);
    }

    match key.code {
        KeyCode::Char('q') => return Ok(true),

        KeyCode::Esc => {
            if state.mode == ViewMode::Split {
                state.close_message();
                return Ok(false);
            }
            return Ok(true);
        }

        KeyCode::Enter => {
            if let Some(id) = state.current_selected_id(snap) {
                manager.select_message(&id);
                state.mode = ViewMode::Split;
            }
        }

        KeyCode::Char('r') => manager.refetch_messages(),
        KeyCode::Char('R') => manager.retry_domains(),

        KeyCode::Char('d') => state.confirm_delete = state.current_selected_id(snap),
        KeyCode::Char('D') => manager.delete_inbox(),

        KeyCode::Char('n') if snap.status == SessionStatus::Unauthenticated => {
            manager.create_inbox()
        }

        KeyCode::Char('c') => {
            if let Some(address) = &snap.address {
                manager.copy_to_clipboard(address);
            }
        }

        KeyCode::Char('x') => manager.clear_error(),

        KeyCode::Down | KeyCode::Char('j') => state.move_selection(1, snap),
        KeyCode::Up | KeyCode::Char('k') => state.move_selection(-1, snap),
        KeyCode::Home => state.list_state.select(Some(0)),
        KeyCode::End => {
            let len = crate::terminal::state::rows(snap).len();
            if len > 0 {
                state.list_state.select(Some(len - 1));
            }
        }

        _ => {}
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{FakeBackend, domain, message_json};
    use crate::manager::{Dispatch, Settings};
    use crate::notify::RecordingNotifier;
    use crossterm::event::KeyModifiers;
    use serde_json::json;
    use std::sync::Arc;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn manager() -> (InboxManager, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::new(
            vec![domain("mail.test", true, false)],
            None,
        ));
        backend.set_messages(json!([message_json("m1", "Hello"), message_json("m2", "Code")]));
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
    fn test_quit_keys() {
        let (mut m, _) = manager();
        let snap = m.snapshot();
        let mut state = AppState::new();
        assert!(handle_key(key(KeyCode::Char('q')), &mut state, &mut m, &snap).unwrap());
        assert!(handle_key(key(KeyCode::Esc), &mut state, &mut m, &snap).unwrap());
    }

    #[test]
    fn test_delete_needs_confirmation() {
        let (mut m, backend) = manager();
        let snap = m.snapshot();
        let mut state = AppState::new();
        state.sync(&snap);

        handle_key(key(KeyCode::Char('d')), &mut state, &mut m, &snap).unwrap();
        assert_eq!(state.confirm_delete.as_deref(), Some("m1"));
        handle_key(key(KeyCode::Char('n')), &mut state, &mut m, &snap).unwrap();
        assert!(state.confirm_delete.is_none());
        assert!(backend.deleted_messages.lock().unwrap().is_empty());

        handle_key(key(KeyCode::Char('j')), &mut state, &mut m, &snap).unwrap();
        handle_key(key(KeyCode::Char('d')), &mut state, &mut m, &snap).unwrap();
        handle_key(key(KeyCode::Char('y')), &mut state, &mut m, &snap).unwrap();
        m.pump();
        assert_eq!(*backend.deleted_messages.lock().unwrap(), vec!["m2".to_string()]);
        assert_eq!(m.snapshot().message_count, 1);
    }

    #[test]
    fn test_enter_opens_selected_message() {
        let (mut m, _) = manager();
        let snap = m.snapshot();
        let mut state = AppState::new();
        let opened = Arc::clone(&state.opened_id);
        m.on_message_select(Box::new(move |id| {
            *opened.lock().unwrap() = Some(id.to_string());
        }));
        state.sync(&snap);

        handle_key(key(KeyCode::Enter), &mut state, &mut m, &snap).unwrap();
        assert_eq!(state.mode, ViewMode::Split);
        assert_eq!(state.opened().as_deref(), Some("m1"));

        // Esc closes the message before it quits
        assert!(!handle_key(key(KeyCode::Esc), &mut state, &mut m, &snap).unwrap());
        assert_eq!(state.mode, ViewMode::ListOnly);
        assert!(state.opened().is_none());
    }

    #[test]
    fn test_delete_inbox_key() {
        let (mut m, backend) = manager();
        let snap = m.snapshot();
        let mut state = AppState::new();
        handle_key(key(KeyCode::Char('D')), &mut state, &mut m, &snap).unwrap();
        m.pump();
        assert_eq!(backend.inbox_deletes(), 1);
        // torn down inbox is replaced automatically
        assert_eq!(backend.creates(), 2);
    }
}
